//! End-to-end sync: fetch, resolve prices, extract licenses, reconcile, publish.
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::licenses::{read_license_dump, LicenseRecord, SteamCmd};
use crate::prices::{resolve_missing, LinePrompt, PricePrompt, PriceStore, StoreLookup};
use crate::publish::{CsvPublisher, GoogleSheetsPublisher, Publisher};
use crate::reconcile::{reconcile, ReconcileOutcome, Reconciliation, ResolvedPrices};
use crate::steam::{AchievementRatio, OwnedGame, SteamProvider};

/// Where license records come from for a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LicenseSource {
    /// Run the configured steamcmd executable.
    #[default]
    SteamCmd,
    /// Parse a dump saved earlier.
    File(PathBuf),
    Skip,
}

impl LicenseSource {
    pub fn from_flags(licenses_file: Option<PathBuf>, skip: bool) -> Self {
        match (skip, licenses_file) {
            (true, _) => LicenseSource::Skip,
            (false, Some(path)) => LicenseSource::File(path),
            (false, None) => LicenseSource::SteamCmd,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Publish to this CSV file instead of Google Sheets.
    pub csv: Option<PathBuf>,
    pub skip_achievements: bool,
    pub licenses: LicenseSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub games: usize,
    pub rows: usize,
    pub skipped: usize,
    pub licenses: usize,
    pub achievements: usize,
    pub achievements_failed: usize,
    pub prices_resolved: usize,
}

pub async fn load_licenses(config: &Config, source: &LicenseSource) -> Result<Vec<LicenseRecord>> {
    match source {
        LicenseSource::SteamCmd => SteamCmd::from_config(config)?.extract_licenses().await,
        LicenseSource::File(path) => read_license_dump(path),
        LicenseSource::Skip => {
            info!("license extraction skipped");
            Ok(Vec::new())
        }
    }
}

/// Reconcile until complete, resolving and persisting missing prices between passes.
///
/// Each pass resolves every sentinel the previous one reported, so the second
/// pass always completes. Prices entered before a failure stay on disk.
pub async fn settle<L, P>(
    games: &[OwnedGame],
    store: &mut PriceStore,
    prices_file: &Path,
    licenses: &[LicenseRecord],
    achievements: &[AchievementRatio],
    lookup: &L,
    prompt: &mut P,
) -> Result<(ReconcileOutcome, usize)>
where
    L: StoreLookup + Sync + ?Sized,
    P: PricePrompt + ?Sized,
{
    let mut resolved = ResolvedPrices::new();
    loop {
        let needs = match reconcile(games, store, &resolved, licenses, achievements) {
            Reconciliation::Complete(outcome) => return Ok((outcome, resolved.len())),
            Reconciliation::NeedsPrices(needs) => needs,
        };
        info!(count = needs.len(), "resolving missing prices");
        resolve_missing(&needs, store, &mut resolved, prices_file, lookup, prompt).await?;
    }
}

pub async fn sync(config: &Config, options: &SyncOptions) -> Result<SyncSummary> {
    // Fail on missing publish settings before any prompting happens.
    let publisher: Box<dyn Publisher + Send + Sync> = match &options.csv {
        Some(path) => Box::new(CsvPublisher::new(path.clone())),
        None => Box::new(GoogleSheetsPublisher::from_config(config)?),
    };

    let steam = SteamProvider::from_config(config)?;
    let games = steam.fetch_owned_games().await?;
    let mut store = PriceStore::load(&config.prices_file)?;

    let mut summary = SyncSummary {
        games: games.len(),
        ..SyncSummary::default()
    };

    let achievements = if options.skip_achievements {
        Vec::new()
    } else {
        let appids: Vec<u64> = games.iter().map(|g| g.appid).collect();
        let report = steam.fetch_achievement_ratios(&appids).await;
        summary.achievements_failed = report.failed_count();
        report.ok
    };
    summary.achievements = achievements.len();

    let licenses = load_licenses(config, &options.licenses).await?;
    summary.licenses = licenses.len();

    let mut prompt = LinePrompt::stdio();
    let (outcome, resolved) = settle(
        &games,
        &mut store,
        &config.prices_file,
        &licenses,
        &achievements,
        &steam,
        &mut prompt,
    )
    .await?;
    summary.prices_resolved = resolved;
    summary.rows = outcome.rows.len();
    summary.skipped = outcome.skipped.len();
    if !outcome.skipped.is_empty() {
        warn!(skipped = outcome.skipped.len(), "some records were not published");
    }

    publisher.publish(&outcome.rows).await?;
    info!(
        games = summary.games,
        rows = summary.rows,
        skipped = summary.skipped,
        licenses = summary.licenses,
        achievements = summary.achievements,
        achievements_failed = summary.achievements_failed,
        prices_resolved = summary.prices_resolved,
        "sync complete"
    );
    Ok(summary)
}
