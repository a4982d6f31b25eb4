//! Engine configuration from the environment.
//!
//! Every knob has a default and a clamp; a missing or malformed value
//! never fails startup. The only secret is the Gemini API key, looked
//! up under the project-prefixed name first and the conventional
//! `GEMINI_API_KEY` second. The literal placeholder `not_set` that the
//! sample env file ships with counts as missing.

use std::time::Duration;

use crate::model::DEFAULT_MODEL_CANDIDATES;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.youtube.com";

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env(key).and_then(|s| s.parse::<u64>().ok()).unwrap_or(default)
}

fn api_key_from_env() -> (Option<String>, Option<&'static str>) {
    for var in ["NESTCHAT_GEMINI_API_KEY", "GEMINI_API_KEY"] {
        if let Some(key) = env(var) {
            if key != "not_set" {
                return (Some(key), Some(var));
            }
        }
    }
    (None, None)
}

fn model_candidates_from_env() -> Vec<String> {
    let defaults = || {
        DEFAULT_MODEL_CANDIDATES
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
    };
    match env("NESTCHAT_MODELS") {
        Some(s) => {
            let list: Vec<String> = s
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if list.is_empty() {
                defaults()
            } else {
                list
            }
        }
        None => defaults(),
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    /// Which variable supplied the key, for diagnostics. Never the key
    /// itself.
    pub api_key_source: Option<&'static str>,
    pub gemini_base_url: String,
    pub youtube_base_url: String,
    pub model_candidates: Vec<String>,
    pub probe_budget: Duration,
    pub chat_budget: Duration,
    pub fetch_timeout: Duration,
    pub fetch_max_bytes: usize,
    pub max_calls: usize,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let (api_key, api_key_source) = api_key_from_env();
        EngineConfig {
            api_key,
            api_key_source,
            gemini_base_url: env("NESTCHAT_GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            youtube_base_url: env("NESTCHAT_YOUTUBE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_YOUTUBE_BASE_URL.to_string()),
            model_candidates: model_candidates_from_env(),
            probe_budget: Duration::from_millis(
                env_u64("NESTCHAT_PROBE_BUDGET_MS", 20_000).clamp(200, 120_000),
            ),
            chat_budget: Duration::from_millis(
                env_u64("NESTCHAT_CHAT_BUDGET_MS", 45_000).clamp(200, 300_000),
            ),
            fetch_timeout: Duration::from_millis(
                env_u64("NESTCHAT_FETCH_TIMEOUT_MS", 15_000).clamp(200, 120_000),
            ),
            fetch_max_bytes: env_u64("NESTCHAT_FETCH_MAX_BYTES", 2_000_000)
                .clamp(10_000, 50_000_000) as usize,
            max_calls: env_u64("NESTCHAT_MAX_CALLS", 8).clamp(1, 64) as usize,
        }
    }
}
