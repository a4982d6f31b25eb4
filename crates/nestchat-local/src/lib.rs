//! Extraction and chat internals for nestchat.
//!
//! This crate owns everything between the HTTP surface and the outside
//! world: pulling text out of resources (PDF files, webpages, YouTube
//! transcripts), selecting a working Gemini model, and running bounded
//! chat turns against it. `nestchat-core` defines the shared types and
//! trait seams; the binary crate wires both to axum.

use std::time::Duration;

use nestchat_core::{ExtractedText, ExtractionError, ResourceContent};

pub mod bounded;
pub mod chat;
pub mod config;
pub mod extract;
pub mod gemini;
pub mod model;
pub mod store;
pub mod youtube;

pub use bounded::BoundedRunner;
pub use chat::ChatEngine;
pub use config::EngineConfig;
pub use gemini::{list_models, GeminiClient, ModelInfo};
pub use model::{ModelSelector, DEFAULT_MODEL_CANDIDATES};
pub use store::{JsonResourceStore, MemorySessionStore};

/// Sent on every outbound fetch. Content hosts and YouTube serve
/// different (or no) markup to non-browser agents.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/126.0.0.0 Safari/537.36";

/// Resolves `ResourceContent` into text, one bounded fetch per call.
#[derive(Debug, Clone)]
pub struct Extractor {
    client: reqwest::Client,
    fetch_timeout: Duration,
    max_bytes: usize,
    youtube_base: String,
}

impl Extractor {
    pub fn new(cfg: &EngineConfig) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            // Safety defaults so DNS/TLS stalls cannot hang a request
            // forever. Per-call timeouts still apply on top.
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExtractionError::NetworkError(format!("http client: {e}")))?;
        Ok(Extractor {
            client,
            fetch_timeout: cfg.fetch_timeout,
            max_bytes: cfg.fetch_max_bytes,
            youtube_base: cfg.youtube_base_url.clone(),
        })
    }

    /// The shared HTTP client. The Gemini side reuses it so the process
    /// keeps one connection pool.
    pub fn http_client(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub async fn resource_text(
        &self,
        content: &ResourceContent,
    ) -> Result<ExtractedText, ExtractionError> {
        let text = match content {
            ResourceContent::Pdf { path } => extract::extract_pdf(path).await?,
            ResourceContent::Link { url } => {
                extract::extract_webpage(&self.client, url, self.fetch_timeout, self.max_bytes)
                    .await?
            }
            ResourceContent::Youtube { url } => {
                youtube::extract_youtube(
                    &self.client,
                    &self.youtube_base,
                    url,
                    self.fetch_timeout,
                    self.max_bytes,
                )
                .await?
            }
        };
        Ok(ExtractedText {
            kind: content.kind(),
            text,
        })
    }
}
