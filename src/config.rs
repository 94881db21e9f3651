//! Run configuration loaded from a JSON file and threaded explicitly through
//! every pipeline step.
//!
//! Recognized keys: `api_key`/`steam_api_key`, `steamid`, `steam_login`,
//! `json_keyfile_path`/`google_api_key`, `spreadsheet_key`, `prices_file`,
//! `country_code`, `steamcmd_path`, `max_concurrency`, `http_timeout_secs`.
//! Secrets and tuning knobs can be overridden from the environment (or a
//! `.env` file) with `STEAM_API_KEY`, `STEAM_ID`, `STEAM_LOGIN`,
//! `STEAM_MAX_CONCURRENCY` and `STEAM_HTTP_TIMEOUT_SECS`.
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::util::env::{env_opt, env_parse_opt};

pub const DEFAULT_PRICES_FILE: &str = "prices.json";
pub const DEFAULT_STEAMCMD: &str = "./steamcmd.sh";
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default, alias = "steam_api_key")]
    api_key: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    steamid: Option<String>,
    #[serde(default)]
    steam_login: Option<String>,
    #[serde(default, alias = "google_api_key")]
    json_keyfile_path: Option<PathBuf>,
    #[serde(default)]
    spreadsheet_key: Option<String>,
    #[serde(default)]
    prices_file: Option<PathBuf>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    steamcmd_path: Option<PathBuf>,
    #[serde(default)]
    max_concurrency: Option<usize>,
    #[serde(default)]
    http_timeout_secs: Option<u64>,
}

// Steam ids are 17-digit numbers and often end up unquoted in hand-written files.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub steam_id: Option<String>,
    pub steam_login: Option<String>,
    pub keyfile_path: Option<PathBuf>,
    pub spreadsheet_key: Option<String>,
    pub prices_file: PathBuf,
    pub country_code: Option<String>,
    pub steamcmd_path: PathBuf,
    pub max_concurrency: usize,
    pub http_timeout: Duration,
}

impl Config {
    /// Read and validate the config file; relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(LedgerError::ConfigNotFound(path.to_path_buf()))
            }
            Err(err) => return Err(err.into()),
        };
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config = Self::parse(&text, base_dir).map_err(|source| {
            LedgerError::ConfigMalformed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info!(
            path = %path.display(),
            prices_file = %config.prices_file.display(),
            max_concurrency = config.max_concurrency,
            "config loaded"
        );
        Ok(config)
    }

    /// Parse config text, then apply environment overrides.
    pub fn parse(text: &str, base_dir: &Path) -> std::result::Result<Self, serde_json::Error> {
        let raw: RawConfig = serde_json::from_str(text)?;
        let resolve = |p: PathBuf| {
            if p.is_absolute() {
                p
            } else {
                base_dir.join(p)
            }
        };
        Ok(Self {
            api_key: env_opt("STEAM_API_KEY").or(raw.api_key),
            steam_id: env_opt("STEAM_ID").or(raw.steamid),
            steam_login: env_opt("STEAM_LOGIN").or(raw.steam_login),
            keyfile_path: raw.json_keyfile_path.map(resolve),
            spreadsheet_key: raw.spreadsheet_key,
            prices_file: resolve(
                raw.prices_file
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PRICES_FILE)),
            ),
            country_code: raw
                .country_code
                .map(|cc| cc.trim().to_ascii_uppercase())
                .filter(|cc| !cc.is_empty()),
            steamcmd_path: resolve(
                raw.steamcmd_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STEAMCMD)),
            ),
            max_concurrency: env_parse_opt("STEAM_MAX_CONCURRENCY")
                .or(raw.max_concurrency)
                .unwrap_or(DEFAULT_MAX_CONCURRENCY)
                .max(1),
            http_timeout: Duration::from_secs(
                env_parse_opt("STEAM_HTTP_TIMEOUT_SECS")
                    .or(raw.http_timeout_secs)
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
        })
    }

    pub fn api_key(&self) -> Result<&str> {
        required(&self.api_key, "api_key")
    }

    pub fn steam_id(&self) -> Result<&str> {
        required(&self.steam_id, "steamid")
    }

    pub fn steam_login(&self) -> Result<&str> {
        required(&self.steam_login, "steam_login")
    }

    pub fn spreadsheet_key(&self) -> Result<&str> {
        required(&self.spreadsheet_key, "spreadsheet_key")
    }

    pub fn keyfile_path(&self) -> Result<&Path> {
        self.keyfile_path
            .as_deref()
            .ok_or(LedgerError::MissingConfigKey("json_keyfile_path"))
    }
}

fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(LedgerError::MissingConfigKey(key))
}
