use std::error::Error;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::calendar::{
    dispatch, DispatchError, GraphBatchClient, ItemResult, MicrosoftAuth, Progress, Tally,
    TokenProvider,
};
use crate::prescription::{Medicine, PrescriptionStore, User};
use crate::schedule::{expand_all, total_doses, DosagePattern};
use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(
    name = "med-reminder",
    version,
    about = "Turn your prescription into Microsoft Calendar reminders"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct Credentials {
    #[arg(short, long)]
    pub username: String,
    #[arg(short, long)]
    pub password: String,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in with a demo account and list its prescriptions
    Login {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Show the reminder events that would be added, without contacting Microsoft
    Preview {
        #[command(flatten)]
        credentials: Credentials,
        /// First day of the schedule (defaults to today)
        #[arg(long)]
        start: Option<NaiveDate>,
    },
    /// Add every reminder of the prescription to Microsoft Calendar
    Sync {
        #[command(flatten)]
        credentials: Credentials,
        /// First day of the schedule (defaults to today)
        #[arg(long)]
        start: Option<NaiveDate>,
    },
    /// Connect a Microsoft account
    Connect,
    /// Forget the connected Microsoft account
    Disconnect,
    /// Show the connected Microsoft account and active settings
    Status,
}

pub async fn run(cli: Cli, settings: &Settings) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Login { credentials } => login(&credentials),
        Commands::Preview { credentials, start } => preview(&credentials, start, settings),
        Commands::Sync { credentials, start } => sync(&credentials, start, settings).await,
        Commands::Connect => connect(settings).await,
        Commands::Disconnect => disconnect(settings),
        Commands::Status => status(settings),
    }
}

/// Authenticate against the bundled demo accounts and return the user's medicines.
fn sign_in_demo(
    store: &PrescriptionStore,
    credentials: &Credentials,
) -> Result<(User, Vec<Medicine>), Box<dyn Error>> {
    let user = store
        .authenticate(&credentials.username, &credentials.password)?
        .clone();
    let medicines = store
        .prescription_for(&user.username)
        .map(|p| p.medicines.clone())
        .unwrap_or_default();
    Ok((user, medicines))
}

fn today(settings: &Settings) -> NaiveDate {
    Utc::now().with_timezone(&settings.time_zone).date_naive()
}

fn login(credentials: &Credentials) -> Result<(), Box<dyn Error>> {
    let store = PrescriptionStore::bundled()?;
    let (user, medicines) = sign_in_demo(&store, credentials)?;

    println!("Welcome back, {}!", user.fullname);
    if medicines.is_empty() {
        println!("You don't have any prescriptions at the moment.");
        return Ok(());
    }

    println!("Your prescriptions:");
    for medicine in &medicines {
        let pattern: DosagePattern = medicine.dosage_pattern.parse()?;
        println!(
            "  {} | {} ({}) | {} days | {} reminders",
            medicine.name,
            pattern,
            pattern.describe(),
            medicine.days,
            total_doses(medicine)?
        );
    }
    Ok(())
}

fn preview(
    credentials: &Credentials,
    start: Option<NaiveDate>,
    settings: &Settings,
) -> Result<(), Box<dyn Error>> {
    let store = PrescriptionStore::bundled()?;
    let (_, medicines) = sign_in_demo(&store, credentials)?;
    let start = start.unwrap_or_else(|| today(settings));

    let events = expand_all(&medicines, start, settings.time_zone)?;
    for event in &events {
        let local = event.start_time().with_timezone(&settings.time_zone);
        println!("{}  {}", local.format("%a %Y-%m-%d %H:%M %Z"), event.subject);
    }
    println!("{} reminder events from {start}", events.len());
    Ok(())
}

async fn sync(
    credentials: &Credentials,
    start: Option<NaiveDate>,
    settings: &Settings,
) -> Result<(), Box<dyn Error>> {
    let store = PrescriptionStore::bundled()?;
    let (user, medicines) = sign_in_demo(&store, credentials)?;
    if medicines.is_empty() {
        println!("You don't have any prescriptions at the moment.");
        return Ok(());
    }

    let start = start.unwrap_or_else(|| today(settings));
    info!(user = %user.username, %start, "syncing prescription");
    sync_medicines(&medicines, start, settings).await
}

/// Expand `medicines` and push them to Microsoft Calendar. Signs in only
/// when there is at least one event to add.
async fn sync_medicines(
    medicines: &[Medicine],
    start: NaiveDate,
    settings: &Settings,
) -> Result<(), Box<dyn Error>> {
    let events = expand_all(medicines, start, settings.time_zone)?;
    info!(events = events.len(), "prepared reminder events");
    if events.is_empty() {
        println!("{}", tally_message(&Tally::default()));
        return Ok(());
    }

    let mut auth = MicrosoftAuth::new(settings);
    auth.load_stored_tokens()?;
    if !auth.is_signed_in() {
        auth.sign_in().await?;
    }
    println!("Connected as {}", auth.account_name());

    let token_provider: Arc<Mutex<dyn TokenProvider>> = Arc::new(Mutex::new(auth));
    let client = GraphBatchClient::new(&settings.graph_base_url, token_provider);

    let mut show_progress = |p: Progress| {
        println!("{}", progress_message(p));
    };

    match dispatch(&events, settings.batch_size, &client, Some(&mut show_progress)).await {
        Ok(report) => {
            println!("{}", tally_message(&report.tally));
            Ok(())
        }
        Err(DispatchError::BatchSendFailed {
            completed,
            results,
            source,
            ..
        }) => {
            error!(error = %source, completed, "calendar sync aborted");
            println!("{}", aborted_message(&results, completed));
            Err(source.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn progress_message(progress: Progress) -> String {
    format!("Adding event {} of {}...", progress.current, progress.total)
}

fn tally_message(tally: &Tally) -> String {
    let summary = if tally.failure_count == 0 {
        format!("Successfully added {} events to your calendar!", tally.success_count)
    } else {
        format!(
            "Added {} events. {} events failed.",
            tally.success_count, tally.failure_count
        )
    };
    format!("{summary}\nCheck your Microsoft Calendar to see the reminders.")
}

/// Message for a run cut short after `completed` events went through.
fn aborted_message(results: &[ItemResult], completed: usize) -> String {
    let partial = Tally::from_results(results, completed);
    format!(
        "Added {} events before the failure. Failed to add the remaining events, please try again.",
        partial.success_count
    )
}

async fn connect(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let mut auth = MicrosoftAuth::new(settings);
    auth.sign_in().await?;
    println!("Connected as {}", auth.account_name());
    Ok(())
}

fn disconnect(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let mut auth = MicrosoftAuth::new(settings);
    auth.sign_out()?;
    println!("Disconnected Microsoft account.");
    Ok(())
}

fn status(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let mut auth = MicrosoftAuth::new(settings);
    auth.load_stored_tokens()?;
    if auth.is_signed_in() {
        println!("Connected as {}", auth.account_name());
    } else {
        println!("No Microsoft account connected.");
    }

    for (key, value) in settings.pairs() {
        println!("  {key} = {value}");
    }
    Ok(())
}
