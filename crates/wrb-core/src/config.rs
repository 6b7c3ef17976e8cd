use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::{errors::Error, Result};

/// Hard cap on batch size; the gateway chokes on larger bursts.
pub const MAX_BATCH_SIZE: usize = 5;

/// Typed configuration for the bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Gateway
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    pub request_timeout: Duration,

    // Session supervision
    pub startup_grace: Duration,
    pub status_debounce: Duration,
    pub status_recheck_delay: Duration,

    // Dispatch
    pub batch_limit: usize,
    pub sender_label: String,

    // Operator data
    pub recipients_file: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let gateway_url = env_str("WRB_GATEWAY_URL").and_then(non_empty).ok_or_else(|| {
            Error::Config("WRB_GATEWAY_URL environment variable is required".to_string())
        })?;
        let gateway_url = gateway_url.trim_end_matches('/').to_string();

        let gateway_token = env_str("WRB_GATEWAY_TOKEN").and_then(non_empty);

        // Timeouts and constants
        let request_timeout = Duration::from_millis(env_u64("REQUEST_TIMEOUT_MS").unwrap_or(30_000));
        let startup_grace = Duration::from_millis(env_u64("STARTUP_GRACE_MS").unwrap_or(10_000));
        let status_debounce = Duration::from_millis(env_u64("STATUS_DEBOUNCE_MS").unwrap_or(1_000));
        let status_recheck_delay =
            Duration::from_millis(env_u64("STATUS_RECHECK_MS").unwrap_or(5_000));

        // Dispatch
        let batch_limit = env_usize("BATCH_LIMIT").unwrap_or(MAX_BATCH_SIZE).clamp(1, MAX_BATCH_SIZE);
        let sender_label = env_str("WRB_SENDER_LABEL")
            .and_then(non_empty)
            .unwrap_or_else(|| "yo".to_string());

        let recipients_file = env_path("WRB_RECIPIENTS_FILE")
            .unwrap_or_else(|| PathBuf::from("recipients.json"));

        Ok(Self {
            gateway_url,
            gateway_token,
            request_timeout,
            startup_grace,
            status_debounce,
            status_recheck_delay,
            batch_limit,
            sender_label,
            recipients_file,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
