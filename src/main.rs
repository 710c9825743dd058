//! lifetrack CLI entry point.

use clap::Parser;
use lt::cli::commands;
use lt::cli::commands::app::RemoteOpts;
use lt::cli::{Cli, Commands};
use lt::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.silent {
        lt::SILENT.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let remote = RemoteOpts {
        endpoint: cli.endpoint.clone(),
        offline: cli.offline,
    };

    match &cli.command {
        Commands::Init { force } => commands::init::execute(*force, db, json),
        Commands::Version => commands::version::execute(json),

        // Daily logs
        Commands::Mood { command } => commands::log::execute_mood(command, db, &remote, json),
        Commands::Dopamine { command } => {
            commands::log::execute_dopamine(command, db, &remote, json)
        }

        // Habits
        Commands::Habit { command } => commands::habit::execute(command, db, &remote, json),
        Commands::Records { command } => commands::records::execute(command, db, &remote, json),

        // Sync
        Commands::Sync { command } => commands::sync::execute(command, db, &remote, json),
        Commands::Watch {
            interval,
            direction,
        } => commands::watch::execute(*interval, *direction, db, &remote, json),

        Commands::Config { command } => commands::config::execute(command, db, &remote, json),

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(*shell),
    }
}
