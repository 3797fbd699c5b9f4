use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, store::profile::PlanLimits, Result};

/// Typed configuration for the bot.
///
/// Everything comes from the environment, with an optional `.env` file loaded
/// first (never overriding variables already set by the deployment).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,

    // Storage
    pub db_path: PathBuf,
    pub db_pool_size: usize,

    // Plan limits
    pub free_request_limit: i64,
    pub premium_request_limit: i64,

    // NIM API
    pub nim_api_keys: Vec<String>,
    pub nim_base_url: String,
    pub request_timeout: Duration,
    pub max_completion_tokens: u32,
    pub system_prompt: String,

    // Defaults
    pub default_model: String,
}

/// Highest `NVAPI_KEY<n>` index scanned at startup.
const MAX_NIM_KEY_SLOTS: usize = 16;

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let nim_api_keys = collect_nim_keys();
        if nim_api_keys.is_empty() {
            return Err(Error::Config(format!(
                "no NIM API keys found in env (NVAPI_KEY1..NVAPI_KEY{MAX_NIM_KEY_SLOTS})"
            )));
        }

        let db_path = env_path("DB_PATH").unwrap_or_else(|| PathBuf::from("users.db"));
        let db_pool_size = env_usize("DB_POOL_SIZE").unwrap_or(4).max(1);

        let free_request_limit = env_i64("FREE_REQUEST_LIMIT").unwrap_or(5);
        let premium_request_limit = env_i64("PREMIUM_REQUEST_LIMIT").unwrap_or(100);

        let nim_base_url = env_str("NIM_BASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://integrate.api.nvidia.com/v1".to_string());
        let request_timeout =
            Duration::from_millis(env_u64("REQUEST_TIMEOUT_MS").unwrap_or(30_000));
        let max_completion_tokens = env_u32("MAX_COMPLETION_TOKENS").unwrap_or(300);
        let system_prompt = env_str("SYSTEM_PROMPT")
            .and_then(non_empty)
            .unwrap_or_else(|| "Ты полезный ассистент. Отвечай по-русски.".to_string());

        let default_model = env_str("DEFAULT_MODEL")
            .and_then(non_empty)
            .unwrap_or_else(|| "LLaMA-8b".to_string());

        Ok(Self {
            telegram_bot_token,
            db_path,
            db_pool_size,
            free_request_limit,
            premium_request_limit,
            nim_api_keys,
            nim_base_url,
            request_timeout,
            max_completion_tokens,
            system_prompt,
            default_model,
        })
    }

    pub fn plan_limits(&self) -> PlanLimits {
        PlanLimits {
            free: self.free_request_limit,
            premium: self.premium_request_limit,
        }
    }
}

fn collect_nim_keys() -> Vec<String> {
    (1..=MAX_NIM_KEY_SLOTS)
        .filter_map(|i| env_str(&format!("NVAPI_KEY{i}")))
        .filter_map(non_empty)
        .collect()
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

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
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
