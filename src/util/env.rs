//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! `init_env()` runs lazily from every getter, so callers never need to order it.
use std::path::Path;
use std::str::FromStr;
use std::sync::Once;
use tracing::debug;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if let Ok(path) = dotenv::dotenv() {
            debug!(target = "env", path = %path.display(), "loaded .env");
        }
    });
}

/// Load a .env file sitting next to the config file, without overriding
/// variables that are already set.
pub fn load_env_beside(config_path: &Path) {
    init_env();
    let Some(dir) = config_path.parent() else {
        return;
    };
    let candidate = dir.join(".env");
    if candidate.is_file() && dotenv::from_path(&candidate).is_ok() {
        debug!(target = "env", path = %candidate.display(), "loaded .env beside config");
    }
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Optional parsed value; unparsable input is treated as unset.
pub fn env_parse_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    env_opt(key).and_then(|s| s.parse().ok())
}
