//! Studyplus SDK - Demo Entry Point
//!
//! Drives a `Studyplus` session from the command line the way a host app
//! would: login, callback forwarding, posting and logout.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use studyplus_sdk::{
    logging, Configuration, RecordAmount, Settings, StudyRecord, Studyplus, SDK_VERSION,
};

#[derive(Parser)]
#[command(name = "studyplus-demo", version, about = "Studyplus SDK demo")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the Studyplus app to log in
    Login,
    /// Forward a callback URI received from the Studyplus app
    Callback {
        uri: String,
    },
    /// Show whether a credential is stored
    Status,
    /// Post a study record
    Post {
        /// Study time in seconds
        #[arg(long)]
        duration: i64,
        #[arg(long)]
        comment: Option<String>,
        /// Amount studied
        #[arg(long, conflicts_with_all = ["from", "to"])]
        amount: Option<u64>,
        /// First position of the studied range
        #[arg(long, requires = "to")]
        from: Option<u64>,
        /// Last position of the studied range
        #[arg(long, requires = "from")]
        to: Option<u64>,
    },
    /// Remove the stored credential
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    info!("Studyplus SDK demo {} starting...", SDK_VERSION);

    let cli = Cli::parse();

    let config = Configuration::from_env()?;
    let settings = Settings::from_env()?;
    // Keychain-backed storage and the desktop URL handler
    let session = Studyplus::with_defaults(config, settings)
        .context("Failed to create Studyplus session")?;

    match cli.command {
        Commands::Login => {
            session.login();
            println!("Complete the login in Studyplus, then run `studyplus-demo callback <uri>`");
        }
        Commands::Callback { uri } => {
            let outcome = session.resolve_callback(&uri);
            if !outcome.is_handled() {
                bail!("Not a Studyplus callback: {} ({:?})", uri, outcome);
            }
            println!("{:?}", outcome);
        }
        Commands::Status => {
            let connected = session.is_connected();
            println!("connected: {}", connected);
            if let Some(username) = session.username() {
                println!("username: {}", username);
            }
        }
        Commands::Post {
            duration,
            comment,
            amount,
            from,
            to,
        } => {
            let mut record = StudyRecord::new(duration);
            if let Some(comment) = comment {
                record = record.comment(comment);
            }
            if let Some(amount) = amount {
                record = record.amount(RecordAmount::total(amount));
            }
            if let (Some(from), Some(to)) = (from, to) {
                record = record.amount(RecordAmount::range(from, to)?);
            }

            session.post(&record).await?;
            println!("Study record posted");
        }
        Commands::Logout => {
            session.logout();
            println!("Logged out");
        }
    }

    Ok(())
}
