pub mod calendar;
pub mod cli;
pub mod prescription;
pub mod schedule;
pub mod settings;

use tracing_subscriber::EnvFilter;

/// Default log directive when `RUST_LOG` is not set.
const LOG_DIRECTIVE: &str = "med_reminder_lib=info,med_reminder=info";

/// Initialize the tracing subscriber. Logs go to stderr so command output stays clean.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LOG_DIRECTIVE));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
