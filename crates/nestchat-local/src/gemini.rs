//! Gemini text-generation backend (Generative Language API, v1beta).
//!
//! Small and bounded: one POST per call, key-in-query like most samples,
//! per-request timeout supplied by the caller. Proxying or fixture
//! testing goes through the configurable base URL.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use nestchat_core::CallError;

#[derive(Debug, Clone, Serialize)]
pub struct Part {
    pub text: String,
}

/// One turn of a Gemini conversation. `role` is `user` or `model`.
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub role: &'static str,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Content {
            role: "user",
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Content {
            role: "model",
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

fn default_generation_config() -> GenerationConfig {
    GenerationConfig {
        temperature: 0.7,
        top_p: 0.95,
        top_k: 64,
        max_output_tokens: 2048,
    }
}

fn default_safety_settings() -> Vec<SafetySetting> {
    SAFETY_CATEGORIES
        .iter()
        .map(|&category| SafetySetting {
            category,
            threshold: "BLOCK_MEDIUM_AND_ABOVE",
        })
        .collect()
}

fn api_error_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v.get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

/// Maps a non-success HTTP response onto the call-error taxonomy. The
/// body is consulted because some proxies flatten status codes.
fn classify_failure(status: reqwest::StatusCode, body: &str) -> CallError {
    let detail = api_error_message(body).unwrap_or_else(|| {
        let mut snippet: String = body.chars().take(200).collect();
        if snippet.is_empty() {
            snippet = status.to_string();
        }
        snippet
    });
    let code = status.as_u16();
    if code == 404 || detail.contains("not found") || detail.contains("NOT_FOUND") {
        return CallError::ModelConfigError;
    }
    if code == 429 || detail.contains("429") || detail.contains("RESOURCE_EXHAUSTED") {
        return CallError::RateLimited;
    }
    CallError::GenerationError(format!("HTTP {code}: {detail}"))
}

fn transport_error(e: reqwest::Error) -> CallError {
    if e.is_timeout() {
        CallError::Timeout
    } else {
        CallError::GenerationError(format!("request failed: {e}"))
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    pub model: String,
}

impl GeminiClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        GeminiClient {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn request(
        &self,
        contents: &[Content],
        timeout: Duration,
    ) -> Result<serde_json::Value, CallError> {
        let req = GenerateRequest {
            contents,
            generation_config: default_generation_config(),
            safety_settings: default_safety_settings(),
        };
        let url = format!(
            "{base}/v1beta/models/{model}:generateContent?key={key}",
            base = self.base_url.trim_end_matches('/'),
            model = self.model,
            key = self.api_key
        );
        let resp = self
            .client
            .post(url)
            .timeout(timeout)
            .json(&req)
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }
        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| CallError::GenerationError(format!("bad response body: {e}")))
    }

    /// One generation call. Returns the text of the first candidate,
    /// parts joined with newlines.
    pub async fn generate(
        &self,
        contents: &[Content],
        timeout: Duration,
    ) -> Result<String, CallError> {
        let v = self.request(contents, timeout).await?;

        // candidates[0].content.parts[*].text
        let mut out = String::new();
        if let Some(parts) = v
            .get("candidates")
            .and_then(|x| x.as_array())
            .and_then(|c| c.first())
            .and_then(|c0| c0.get("content"))
            .and_then(|x| x.get("parts"))
            .and_then(|x| x.as_array())
        {
            for p in parts {
                if let Some(t) = p.get("text").and_then(|x| x.as_str()) {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(t);
                }
            }
        }
        if out.trim().is_empty() {
            if let Some(reason) = v
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(|r| r.as_str())
            {
                return Err(CallError::GenerationError(format!(
                    "response blocked ({reason})"
                )));
            }
            return Err(CallError::GenerationError(
                "empty response from model".to_string(),
            ));
        }
        Ok(out)
    }

    /// Cheap liveness check used while walking the model candidate list.
    /// Success is the call itself succeeding; an empty reply still counts.
    pub async fn probe(&self, timeout: Duration) -> Result<(), CallError> {
        self.request(&[Content::user("Test")], timeout)
            .await
            .map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Lists the models the key can see. Used by diagnostics, not by the
/// serving path.
pub async fn list_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<Vec<ModelInfo>, CallError> {
    let url = format!(
        "{base}/v1beta/models?key={key}",
        base = base_url.trim_end_matches('/'),
        key = api_key
    );
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(transport_error)?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(classify_failure(status, &body));
    }
    let list: ModelList = resp
        .json()
        .await
        .map_err(|e| CallError::GenerationError(format!("bad response body: {e}")))?;
    Ok(list.models)
}
