//! Input validation for record fields and CLI arguments.
//!
//! Status values resolve in three tiers: exact match → synonym lookup →
//! error with the closest suggestion. Dates are ISO `YYYY-MM-DD` strings,
//! ratings are integers in `1..=5`.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{Duration, Local, NaiveDate};

/// Rating bounds shared by mood, energy and numbness.
pub const RATING_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

// ── Valid value sets ─────────────────────────────────────────

pub static VALID_DOPAMINE_STATUSES: LazyLock<HashSet<&str>> =
    LazyLock::new(|| ["passed", "failed"].into_iter().collect());

pub static DOPAMINE_STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("pass", "passed"),
        ("success", "passed"),
        ("successful", "passed"),
        ("clean", "passed"),
        ("yes", "passed"),
        ("fail", "failed"),
        ("challenging", "failed"),
        ("relapse", "failed"),
        ("relapsed", "failed"),
        ("no", "failed"),
    ]
    .into_iter()
    .collect()
});

/// Normalize a dopamine status via exact match or synonym lookup.
///
/// Returns the canonical status, or an error with the original input
/// and an optional suggestion.
pub fn normalize_dopamine_status(input: &str) -> Result<String, (String, Option<String>)> {
    let lower = input.trim().to_lowercase();

    if VALID_DOPAMINE_STATUSES.contains(lower.as_str()) {
        return Ok(lower);
    }

    if let Some(&canonical) = DOPAMINE_STATUS_SYNONYMS.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }

    let suggestion = find_closest_match(
        &lower,
        &VALID_DOPAMINE_STATUSES,
        &DOPAMINE_STATUS_SYNONYMS,
    );
    Err((input.to_string(), suggestion))
}

/// Check that a string is an ISO calendar date (`YYYY-MM-DD`).
pub fn validate_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("'{value}' is not an ISO date (YYYY-MM-DD)"))
}

/// Check that a rating falls within [`RATING_RANGE`].
pub fn validate_rating(name: &str, value: i64) -> Result<(), String> {
    if RATING_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "{name} must be between {} and {}, got {value}",
            RATING_RANGE.start(),
            RATING_RANGE.end()
        ))
    }
}

/// Resolve a date argument: `today`, `yesterday`, or an ISO date.
///
/// Returns the ISO string stored in record fields.
pub fn resolve_date_arg(input: Option<&str>) -> Result<String, String> {
    let today = Local::now().date_naive();
    match input.map(str::trim) {
        None | Some("today") => Ok(today.format("%Y-%m-%d").to_string()),
        Some("yesterday") => Ok((today - Duration::days(1)).format("%Y-%m-%d").to_string()),
        Some(other) => validate_date(other).map(|d| d.format("%Y-%m-%d").to_string()),
    }
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist <= 3 && best.is_none_or(|(_, best_dist)| dist < best_dist) {
            // For synonyms, show what it maps to
            let shown = synonyms.get(v).copied().unwrap_or(v);
            best = Some((shown, dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
