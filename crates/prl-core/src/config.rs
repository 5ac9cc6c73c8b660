use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, Result};

/// How often a poller samples the target's presence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Offline samples buffered between a poller and its record worker.
pub const DEFAULT_RECORD_QUEUE_CAPACITY: usize = 16;

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Account API
    pub account_gateway_url: String,
    pub api_id: i32,
    pub api_hash: String,
    pub session_file: PathBuf,

    // Bot
    pub bot_token: String,

    // Monitoring
    pub target_user_id: UserId,
    pub poll_interval: Duration,
    pub record_queue_capacity: usize,

    // Status stores
    pub history_file: PathBuf,
    pub last_status_file: PathBuf,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build a config from an arbitrary variable source (the process env in `load`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_id = required(&lookup, "TELEGRAM_API_ID")?;
        let api_id = api_id.trim().parse::<i32>().map_err(|e| {
            Error::Config(format!("TELEGRAM_API_ID must be an integer: {e}"))
        })?;

        let api_hash = required(&lookup, "TELEGRAM_API_HASH")?;
        let bot_token = required(&lookup, "TELEGRAM_BOT_TOKEN")?;

        let target_user_id = required(&lookup, "DEFAULT_SPY_USER_ID")?;
        let target_user_id = target_user_id.trim().parse::<i64>().map_err(|e| {
            Error::Config(format!("DEFAULT_SPY_USER_ID must be an integer: {e}"))
        })?;

        let account_gateway_url = lookup("ACCOUNT_GATEWAY_URL")
            .and_then(non_empty)
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://127.0.0.1:8081".to_string());

        let session_file = PathBuf::from(
            lookup("SESSION_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "session.data".to_string()),
        );

        let history_file = PathBuf::from(
            lookup("HISTORY_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "user_status.json".to_string()),
        );
        let last_status_file = PathBuf::from(
            lookup("LAST_STATUS_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "last_status.json".to_string()),
        );

        let log_level = lookup("LOG_LEVEL")
            .and_then(non_empty)
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            account_gateway_url,
            api_id,
            api_hash,
            session_file,
            bot_token,
            target_user_id: UserId(target_user_id),
            poll_interval: DEFAULT_POLL_INTERVAL,
            record_queue_capacity: DEFAULT_RECORD_QUEUE_CAPACITY,
            history_file,
            last_status_file,
            log_level,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let Some((key, val)) = parse_dotenv_line(raw) else {
            continue;
        };
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv_line(raw: &str) -> Option<(String, String)> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (k, v) = line.split_once('=')?;
    let key = k.trim();
    if key.is_empty() {
        return None;
    }

    let mut val = v.trim().to_string();
    // Strip optional surrounding quotes.
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        val = val[1..val.len() - 1].to_string();
    }

    Some((key.to_string(), val))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
