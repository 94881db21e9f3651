use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use steam_ledger::config::Config;
use steam_ledger::pipeline::{self, LicenseSource, SyncOptions};
use steam_ledger::prices::PriceStore;
use steam_ledger::publish::DATE_CELL_FORMAT;
use steam_ledger::tracing::init_tracing;
use steam_ledger::util::env;

#[derive(Parser, Debug)]
#[command(name = "steam-ledger", version, about = "Steam library ledger")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Fetch, resolve prices, extract licenses, reconcile and publish
    Sync {
        /// Write the rows to a CSV file instead of Google Sheets
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Skip the per-game achievement requests
        #[arg(long, default_value_t = false)]
        no_achievements: bool,
        /// Parse a saved licenses_print dump instead of running steamcmd
        #[arg(long, conflicts_with = "skip_licenses")]
        licenses_file: Option<PathBuf>,
        /// Publish without license columns
        #[arg(long, default_value_t = false)]
        skip_licenses: bool,
    },
    /// Print the account's licenses
    Licenses {
        /// Parse a saved licenses_print dump instead of running steamcmd
        #[arg(long)]
        licenses_file: Option<PathBuf>,
    },
    /// Print the price store
    Prices,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(if cli.verbose { "debug" } else { "info" }) {
        eprintln!("warning: {err}");
    }
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    env::load_env_beside(&cli.config);
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    match cli.command {
        Commands::Sync {
            csv,
            no_achievements,
            licenses_file,
            skip_licenses,
        } => {
            let options = SyncOptions {
                csv,
                skip_achievements: no_achievements,
                licenses: LicenseSource::from_flags(licenses_file, skip_licenses),
            };
            let summary = pipeline::sync(&config, &options).await.context("sync failed")?;
            println!(
                "published {} rows ({} skipped) from {} owned games",
                summary.rows, summary.skipped, summary.games
            );
        }
        Commands::Licenses { licenses_file } => {
            let source = LicenseSource::from_flags(licenses_file, false);
            let licenses = pipeline::load_licenses(&config, &source)
                .await
                .context("extracting licenses")?;
            for l in &licenses {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    l.package,
                    l.date.format(DATE_CELL_FORMAT),
                    l.location,
                    l.license_type,
                    l.apps.join(",")
                );
            }
        }
        Commands::Prices => {
            let store = PriceStore::load(&config.prices_file)
                .with_context(|| format!("reading {}", config.prices_file.display()))?;
            for r in store.iter() {
                println!("{}\t{:.2}\t{:.2}\t{}", r.appid, r.orig, r.paid, r.name);
            }
        }
    }
    Ok(())
}
