use crate::config::Config;
use crate::error::{LedgerError, Result};
use futures::{stream::FuturesUnordered, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const STEAM_API_BASE: &str = "https://api.steampowered.com";
const STEAM_STORE_BASE: &str = "https://store.steampowered.com";

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// One entry of `IPlayerService/GetOwnedGames`. Playtime stays in minutes as
/// Steam reports it; callers convert with [`OwnedGame::playtime_hours`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedGame {
    pub appid: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub playtime_forever: u64,
    #[serde(default)]
    pub img_icon_url: String,
}

impl OwnedGame {
    pub fn playtime_hours(&self) -> f64 {
        self.playtime_forever as f64 / 60.0
    }
}

#[derive(Debug, Deserialize)]
struct OwnedGamesEnvelope {
    response: OwnedGamesResponse,
}

#[derive(Debug, Deserialize)]
struct OwnedGamesResponse {
    #[serde(default)]
    game_count: Option<u64>,
    #[serde(default)]
    games: Option<Vec<OwnedGame>>,
}

#[derive(Debug, Deserialize)]
struct AppDetailsWrapper {
    success: bool,
    data: Option<AppData>,
}

#[derive(Debug, Deserialize)]
struct AppData {
    #[serde(default)]
    is_free: Option<bool>,
    price_overview: Option<PriceOverview>,
}

#[derive(Debug, Deserialize)]
struct PriceOverview {
    #[serde(rename = "initial")]
    initial_price: Option<i64>,
}

/// The store-page facts price resolution needs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AppDetails {
    pub success: bool,
    pub is_free: bool,
    /// `price_overview.initial` in minor units (cents).
    pub initial_price_minor: Option<i64>,
}

impl AppDetails {
    /// Original list price in major units, `0.0` when the store shows none.
    pub fn list_price(&self) -> f64 {
        self.initial_price_minor
            .map(|minor| minor as f64 / 100.0)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Deserialize)]
struct PlayerStatsEnvelope {
    playerstats: PlayerStats,
}

#[derive(Debug, Deserialize)]
struct PlayerStats {
    #[serde(default)]
    success: bool,
    #[serde(rename = "gameName", default)]
    game_name: Option<String>,
    #[serde(default)]
    achievements: Option<Vec<PlayerAchievement>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayerAchievement {
    #[serde(default)]
    achieved: u8,
}

/// Fraction of achievements unlocked for one game, keyed by the name the
/// stats API reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AchievementRatio {
    pub appid: u64,
    pub name: String,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// The game reports no stats or no achievements.
    NoAchievements(String),
    /// Transport failure or an unreadable body.
    Failed(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NoAchievements(why) => write!(f, "no achievements ({why})"),
            DropReason::Failed(why) => write!(f, "request failed ({why})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dropped {
    pub appid: u64,
    pub reason: DropReason,
}

/// Partial-success result of a fan-out fetch: every request lands in exactly
/// one of the two lists.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport<T> {
    pub ok: Vec<T>,
    pub dropped: Vec<Dropped>,
}

impl<T> Default for FetchReport<T> {
    fn default() -> Self {
        Self {
            ok: Vec::new(),
            dropped: Vec::new(),
        }
    }
}

impl<T> FetchReport<T> {
    pub fn failed_count(&self) -> usize {
        self.dropped
            .iter()
            .filter(|d| matches!(d.reason, DropReason::Failed(_)))
            .count()
    }
}

/// Read-only client for the Steam web API and store endpoints.
#[derive(Debug, Clone)]
pub struct SteamProvider {
    http: Client,
    api_key: String,
    steam_id: String,
    country_code: Option<String>,
    max_concurrency: usize,
    api_base: String,
    store_base: String,
}

impl SteamProvider {
    pub fn new(api_key: &str, steam_id: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("steam-ledger/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            steam_id: steam_id.to_string(),
            country_code: None,
            max_concurrency: crate::config::DEFAULT_MAX_CONCURRENCY,
            api_base: STEAM_API_BASE.to_string(),
            store_base: STEAM_STORE_BASE.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(
            Self::new(config.api_key()?, config.steam_id()?, config.http_timeout)?
                .with_country_code(config.country_code.clone())
                .with_max_concurrency(config.max_concurrency),
        )
    }

    pub fn with_country_code(mut self, country_code: Option<String>) -> Self {
        self.country_code = country_code.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Point the provider at different hosts (a local mirror or proxy).
    pub fn with_base_urls(mut self, api_base: &str, store_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.store_base = store_base.trim_end_matches('/').to_string();
        self
    }

    async fn get_json(&self, api: &'static str, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 500);
            return Err(LedgerError::Api {
                api,
                message: format!("status {status}: {body}"),
            });
        }
        Ok(resp.json::<Value>().await?)
    }

    /// All games owned by the configured account, including played free games.
    pub async fn fetch_owned_games(&self) -> Result<Vec<OwnedGame>> {
        let url = format!("{}/IPlayerService/GetOwnedGames/v1/", self.api_base);
        let body = self
            .get_json(
                "GetOwnedGames",
                &url,
                &[
                    ("key", self.api_key.as_str()),
                    ("steamid", self.steam_id.as_str()),
                    ("include_played_free_games", "1"),
                    ("include_appinfo", "1"),
                ],
            )
            .await?;
        let games = parse_owned_games(body)?;
        info!(count = games.len(), "steam: owned games fetched");
        Ok(games)
    }

    /// Store page details for one app, `None` when the response has no entry for it.
    pub async fn fetch_app_details(&self, appid: u64) -> Result<Option<AppDetails>> {
        let url = format!("{}/api/appdetails", self.store_base);
        let app = appid.to_string();
        let mut query = vec![("appids", app.as_str())];
        if let Some(cc) = self.country_code.as_deref() {
            query.push(("cc", cc));
        }
        let body = self.get_json("appdetails", &url, &query).await?;
        Ok(parse_app_details(appid, &body))
    }

    async fn fetch_player_achievements(
        &self,
        appid: u64,
    ) -> std::result::Result<AchievementRatio, DropReason> {
        let url = format!(
            "{}/ISteamUserStats/GetPlayerAchievements/v0001/",
            self.api_base
        );
        let app = appid.to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("steamid", self.steam_id.as_str()),
                ("appid", app.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DropReason::Failed(e.to_string()))?;
        // Games without stats answer 400 with a regular playerstats body.
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| DropReason::Failed(format!("status {status}: {e}")))?;
        parse_player_stats(appid, &body)
    }

    /// Fetch achievement ratios for every app id through a worker pool capped at
    /// `max_concurrency` in-flight requests. Never fails as a whole: each request
    /// either yields a ratio or is recorded in `dropped`.
    pub async fn fetch_achievement_ratios(&self, appids: &[u64]) -> FetchReport<AchievementRatio> {
        let sem = Arc::new(Semaphore::new(self.max_concurrency));
        let mut futs: FuturesUnordered<_> = FuturesUnordered::new();
        for &appid in appids {
            let sem = sem.clone();
            futs.push(async move {
                let result = match sem.acquire_owned().await {
                    Ok(_permit) => self.fetch_player_achievements(appid).await,
                    Err(e) => Err(DropReason::Failed(e.to_string())),
                };
                (appid, result)
            });
        }

        let mut report = FetchReport::default();
        while let Some((appid, result)) = futs.next().await {
            match result {
                Ok(ratio) => report.ok.push(ratio),
                Err(reason) => {
                    match &reason {
                        DropReason::NoAchievements(_) => {
                            debug!(appid, %reason, "steam: achievements skipped")
                        }
                        DropReason::Failed(_) => {
                            warn!(appid, %reason, "steam: achievement request failed")
                        }
                    }
                    report.dropped.push(Dropped { appid, reason });
                }
            }
        }
        report.ok.sort_by_key(|r| r.appid);
        report.dropped.sort_by_key(|d| d.appid);
        info!(
            requested = appids.len(),
            with_achievements = report.ok.len(),
            dropped = report.dropped.len(),
            failed = report.failed_count(),
            max_concurrency = self.max_concurrency,
            "steam: achievement ratios fetched"
        );
        report
    }
}

fn parse_owned_games(body: Value) -> Result<Vec<OwnedGame>> {
    let envelope: OwnedGamesEnvelope =
        serde_json::from_value(body).map_err(|e| LedgerError::Api {
            api: "GetOwnedGames",
            message: format!("unexpected body: {e}"),
        })?;
    match envelope.response.games {
        Some(games) => Ok(games),
        None if envelope.response.game_count == Some(0) => Ok(Vec::new()),
        None => Err(LedgerError::Api {
            api: "GetOwnedGames",
            message: "response has no games list; is the profile's game details visibility private?"
                .into(),
        }),
    }
}

fn parse_app_details(appid: u64, body: &Value) -> Option<AppDetails> {
    let entry = body.get(appid.to_string())?;
    let details: AppDetailsWrapper = serde_json::from_value(entry.clone()).ok()?;
    let data = details.data;
    Some(AppDetails {
        success: details.success,
        is_free: data.as_ref().and_then(|d| d.is_free).unwrap_or(false),
        initial_price_minor: data
            .and_then(|d| d.price_overview)
            .and_then(|po| po.initial_price),
    })
}

fn parse_player_stats(
    appid: u64,
    body: &Value,
) -> std::result::Result<AchievementRatio, DropReason> {
    let envelope: PlayerStatsEnvelope = serde_json::from_value(body.clone())
        .map_err(|e| DropReason::Failed(format!("unexpected body: {e}")))?;
    let stats = envelope.playerstats;
    if !stats.success {
        return Err(DropReason::NoAchievements(
            stats.error.unwrap_or_else(|| "success=false".into()),
        ));
    }
    let achievements = match stats.achievements {
        Some(list) if !list.is_empty() => list,
        _ => return Err(DropReason::NoAchievements("no achievements field".into())),
    };
    // The ratio joins on this name; an empty one would match nameless games.
    let name = match stats.game_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => return Err(DropReason::NoAchievements("no game name".into())),
    };
    let achieved = achievements.iter().filter(|a| a.achieved > 0).count();
    Ok(AchievementRatio {
        appid,
        name,
        ratio: achieved as f64 / achievements.len() as f64,
    })
}
