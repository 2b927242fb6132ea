use clap::Parser;
use tracing::error;

use med_reminder_lib::cli::{self, Cli};
use med_reminder_lib::settings::Settings;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    med_reminder_lib::init_logging();

    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load settings: {e}");
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::run(cli, &settings).await {
        error!("Command failed: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
