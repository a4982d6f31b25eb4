//! Operator diagnostics for the `doctor` and `list-models` subcommands.
//!
//! The doctor report describes the effective configuration without ever echoing
//! the API key itself; only shape checks (vendor prefix, expected length) are
//! reported so a misconfigured key can be spotted from the output alone.

use nestchat_local::{EngineConfig, ModelInfo};
use serde_json::{json, Value};

/// Google AI Studio keys start with this prefix.
const GOOGLE_KEY_PREFIX: &str = "AIza";
/// Keys issued by AI Studio are this many characters long.
const GOOGLE_KEY_LEN: usize = 39;

pub fn doctor_report(cfg: &EngineConfig) -> Value {
    let api_key = match cfg.api_key.as_deref() {
        Some(key) => json!({
            "present": true,
            "source": cfg.api_key_source,
            "has_vendor_prefix": key.starts_with(GOOGLE_KEY_PREFIX),
            "expected_length": key.chars().count() == GOOGLE_KEY_LEN,
        }),
        None => json!({ "present": false }),
    };
    json!({
        "api_key": api_key,
        "gemini_base_url": cfg.gemini_base_url,
        "youtube_base_url": cfg.youtube_base_url,
        "model_candidates": cfg.model_candidates,
        "budgets_ms": {
            "probe": cfg.probe_budget.as_millis() as u64,
            "chat": cfg.chat_budget.as_millis() as u64,
            "fetch": cfg.fetch_timeout.as_millis() as u64,
        },
        "fetch_max_bytes": cfg.fetch_max_bytes,
        "max_concurrent_calls": cfg.max_calls,
    })
}

/// One line per model: name, display name when present, and whether the model
/// can serve `generateContent` (the only method the chat path uses).
pub fn render_models(models: &[ModelInfo]) -> String {
    let mut out = String::new();
    for m in models {
        let chat_capable = m
            .supported_generation_methods
            .iter()
            .any(|method| method == "generateContent");
        let marker = if chat_capable { "generateContent" } else { "-" };
        match m.display_name.as_deref() {
            Some(display) if !display.is_empty() => {
                out.push_str(&format!("{:<44} {:<28} {}\n", m.name, display, marker));
            }
            _ => out.push_str(&format!("{:<44} {:<28} {}\n", m.name, "", marker)),
        }
    }
    out
}
