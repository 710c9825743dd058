//! Remote spreadsheet adapter trait.
//!
//! The adapter is stateless request/response plumbing: it never queues,
//! retries or touches the local store. Failures come back as
//! [`RemoteError`] for the engine to absorb.

use std::future::Future;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::RemoteError;
use crate::model::{RemoteId, RemoteRecord, Sheet};

/// Result of a remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Operations the remote spreadsheet endpoint supports.
///
/// Implemented by [`SheetsClient`](super::SheetsClient) over HTTP and by
/// in-memory fakes in tests.
pub trait SheetsRemote: Send + Sync {
    /// Check whether the endpoint answers.
    fn ping(&self) -> impl Future<Output = bool> + Send;

    /// Fetch every row of a sheet, surfacing failures.
    fn try_get_all(&self, sheet: Sheet) -> impl Future<Output = RemoteResult<Vec<RemoteRecord>>> + Send;

    /// Fetch every row of a sheet.
    ///
    /// Fail-soft: any failure is logged and reads as an empty sheet. Use
    /// [`SheetsRemote::try_get_all`] where an empty sheet and a failed fetch
    /// must be told apart.
    fn get_all(&self, sheet: Sheet) -> impl Future<Output = Vec<RemoteRecord>> + Send {
        async move {
            match self.try_get_all(sheet).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(%sheet, error = %e, "Could not fetch sheet, treating as empty");
                    Vec::new()
                }
            }
        }
    }

    /// Append a row. Returns the id the remote assigned.
    fn add(
        &self,
        sheet: Sheet,
        data: &Map<String, Value>,
    ) -> impl Future<Output = RemoteResult<RemoteId>> + Send;

    /// Overwrite the row with the given id.
    fn update(
        &self,
        sheet: Sheet,
        id: &RemoteId,
        data: &Map<String, Value>,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Delete the row with the given id.
    fn delete(&self, sheet: Sheet, id: &RemoteId) -> impl Future<Output = RemoteResult<()>> + Send;
}
