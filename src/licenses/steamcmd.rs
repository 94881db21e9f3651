//! License metadata scraped from `steamcmd +licenses_print`.
//!
//! Each license is a three-line block:
//!
//! ```text
//! License packageID 469:
//!  - State   : Active( flags 0 ) - Purchased : Mon Jun 17 13:45:07 2013 in "BR", Retail
//!  - Apps    : 410, 400, (2 in total)
//! ```
//!
//! The first line containing `License` is a header and is skipped.
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{LedgerError, Result};

pub const LICENSE_MARKER: &str = "License";
pub const DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LicenseRecord {
    pub package: u64,
    pub date: NaiveDateTime,
    pub location: String,
    pub license_type: String,
    /// App ids covered by the package, as printed.
    pub apps: Vec<String>,
}

struct LicenseParser {
    digits: Regex,
    date: Regex,
    location: Regex,
    license_type: Regex,
}

impl LicenseParser {
    fn new() -> Result<Self> {
        Ok(Self {
            digits: Regex::new(r"[0-9]+")?,
            date: Regex::new(r".* : (.+?) in .*")?,
            location: Regex::new(r#""(.*?)""#)?,
            license_type: Regex::new(r".*, (.*)")?,
        })
    }

    fn parse(&self, text: &str) -> Result<Vec<LicenseRecord>> {
        let lines: Vec<&str> = text.lines().collect();
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.contains(LICENSE_MARKER))
            .map(|(idx, _)| idx)
            .skip(1)
            .map(|idx| self.parse_block(&lines, idx))
            .collect()
    }

    fn parse_block(&self, lines: &[&str], idx: usize) -> Result<LicenseRecord> {
        // Line numbers in errors are 1-based to match an editor view of the dump.
        let fail = |offset: usize, message: &str| LedgerError::LicenseParse {
            line: idx + offset + 1,
            message: message.to_string(),
        };
        let head = lines[idx];
        let state = *lines
            .get(idx + 1)
            .ok_or_else(|| fail(1, "missing state line after license header"))?;
        let apps_line = *lines
            .get(idx + 2)
            .ok_or_else(|| fail(2, "missing apps line after state line"))?;

        let package = self
            .digits
            .find(head)
            .ok_or_else(|| fail(0, "no package id"))?
            .as_str()
            .parse::<u64>()
            .map_err(|_| fail(0, "package id out of range"))?;
        let raw_date = capture(&self.date, state).ok_or_else(|| fail(1, "no acquisition date"))?;
        let date = parse_license_date(raw_date)
            .ok_or_else(|| fail(1, &format!("unparsable date `{raw_date}`")))?;
        let location = capture(&self.location, state)
            .ok_or_else(|| fail(1, "no quoted location"))?
            .to_string();
        let license_type = capture(&self.license_type, state)
            .ok_or_else(|| fail(1, "no license type"))?
            .trim()
            .to_string();

        let mut apps: Vec<String> = self
            .digits
            .find_iter(apps_line)
            .map(|m| m.as_str().to_string())
            .collect();
        // The last number is the "(N in total)" summary.
        apps.pop();

        Ok(LicenseRecord {
            package,
            date,
            location,
            license_type,
            apps,
        })
    }
}

fn capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Parse `Mon Jun 17 13:45:07 2013`; steamcmd space-pads single-digit days.
pub fn parse_license_date(raw: &str) -> Option<NaiveDateTime> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&collapsed, DATE_FORMAT).ok()
}

/// Parse a full `licenses_print` dump.
pub fn parse_license_dump(text: &str) -> Result<Vec<LicenseRecord>> {
    LicenseParser::new()?.parse(text)
}

/// Parse a dump previously saved to disk.
pub fn read_license_dump(path: &Path) -> Result<Vec<LicenseRecord>> {
    let text = std::fs::read_to_string(path)?;
    let licenses = parse_license_dump(&text)?;
    info!(path = %path.display(), count = licenses.len(), "licenses parsed from file");
    Ok(licenses)
}

/// Runs the local steamcmd executable to print the account's licenses.
#[derive(Debug, Clone)]
pub struct SteamCmd {
    program: PathBuf,
    login: String,
}

impl SteamCmd {
    pub fn new(program: impl Into<PathBuf>, login: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            login: login.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.steamcmd_path.clone(), config.steam_login()?))
    }

    pub fn args(&self) -> [&str; 4] {
        ["+login", self.login.as_str(), "+licenses_print", "+quit"]
    }

    /// Run steamcmd to completion and return its stdout.
    pub async fn dump(&self) -> Result<String> {
        let program = self.program.display().to_string();
        debug!(program = %program, "running steamcmd");
        let output = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LedgerError::Process {
                program: program.clone(),
                message: e.to_string(),
            })?;
        if !output.status.success() && output.stdout.is_empty() {
            return Err(LedgerError::Process {
                program,
                message: format!("exited with {} and printed nothing", output.status),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn extract_licenses(&self) -> Result<Vec<LicenseRecord>> {
        let text = self.dump().await?;
        let licenses = parse_license_dump(&text)?;
        info!(count = licenses.len(), "licenses extracted from steamcmd");
        Ok(licenses)
    }
}
