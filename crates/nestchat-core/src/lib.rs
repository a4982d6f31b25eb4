use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hard cap on the resource-text snapshot a session keeps (characters, not bytes).
pub const RESOURCE_TEXT_CAP_CHARS: usize = 15_000;

/// Size of the resource-text slice sent as model context on each turn.
pub const CONTEXT_SLICE_CHARS: usize = 8_000;

/// Why a resource's content could not be turned into text.
///
/// The payload is the user-facing message; it is returned verbatim in the
/// init response, so construction sites write complete sentences.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ExtractionError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Encrypted(String),
    #[error("{0}")]
    NoTextContent(String),
    #[error("{0}")]
    UnsupportedContentType(String),
    #[error("{0}")]
    TranscriptUnavailable(String),
    #[error("{0}")]
    NetworkError(String),
    #[error("{0}")]
    ParseError(String),
}

impl ExtractionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::NotFound(_) => "not_found",
            ExtractionError::Encrypted(_) => "encrypted",
            ExtractionError::NoTextContent(_) => "no_text_content",
            ExtractionError::UnsupportedContentType(_) => "unsupported_content_type",
            ExtractionError::TranscriptUnavailable(_) => "transcript_unavailable",
            ExtractionError::NetworkError(_) => "network_error",
            ExtractionError::ParseError(_) => "parse_error",
        }
    }
}

/// Why a model call did not produce a reply.
///
/// Display strings are the exact texts the chat surface returns, so the
/// HTTP layer can serialize them without a mapping table.
#[derive(thiserror::Error, Debug, Clone)]
pub enum CallError {
    #[error("The AI model took too long to respond. Please try a simpler question or try again later.")]
    Timeout,
    #[error("{0}")]
    ModelUnavailable(String),
    #[error("Sorry, there was an issue with the AI model. Please check your API key and model configuration.")]
    ModelConfigError,
    #[error("Too many requests to the AI service. Please try again later.")]
    RateLimited,
    #[error("Error generating response: {0}")]
    GenerationError(String),
}

impl CallError {
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Timeout => "timeout",
            CallError::ModelUnavailable(_) => "model_unavailable",
            CallError::ModelConfigError => "model_config_error",
            CallError::RateLimited => "rate_limited",
            CallError::GenerationError(_) => "generation_error",
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pdf,
    Link,
    Youtube,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pdf => "pdf",
            ResourceKind::Link => "link",
            ResourceKind::Youtube => "youtube",
        }
    }
}

/// What a resource points at. Produced by the resource store when the
/// resource is created; consumed once per chat initialization. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceContent {
    Pdf { path: PathBuf },
    Link { url: String },
    Youtube { url: String },
}

impl ResourceContent {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceContent::Pdf { .. } => ResourceKind::Pdf,
            ResourceContent::Link { .. } => ResourceKind::Link,
            ResourceContent::Youtube { .. } => ResourceKind::Youtube,
        }
    }
}

/// Successful extraction result. Never partially valid: an extractor either
/// returns the full text for its source or an `ExtractionError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub kind: ResourceKind,
    pub text: String,
}

/// One user prompt and the model reply it produced, appended atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub prompt: String,
    pub reply: String,
}

/// Per-resource conversation state held in the external session store.
///
/// The resource-text snapshot is captured once at initialization and never
/// re-extracted; later edits to the underlying resource do not affect an
/// open session. History is append-only and replayed verbatim on every
/// turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub resource_id: u64,
    pub resource_text: String,
    pub history: Vec<ChatTurn>,
}

impl ChatSession {
    /// Caps the snapshot at `RESOURCE_TEXT_CAP_CHARS`.
    pub fn new(resource_id: u64, resource_text: &str) -> Self {
        Self {
            resource_id,
            resource_text: truncate_chars(resource_text, RESOURCE_TEXT_CAP_CHARS).to_string(),
            history: Vec::new(),
        }
    }

    pub fn push_turn(&mut self, prompt: impl Into<String>, reply: impl Into<String>) {
        self.history.push(ChatTurn {
            prompt: prompt.into(),
            reply: reply.into(),
        });
    }
}

/// Session identifier for a resource's chat: `resource_<id>`.
pub fn session_key(resource_id: u64) -> String {
    format!("resource_{resource_id}")
}

/// First `max_chars` characters of `s`, cut on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Supplies resource content by id. The chat core never writes back.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    async fn content(&self, resource_id: u64) -> Result<Option<ResourceContent>, StoreError>;
}

/// Maps (browser owner, session id) to chat sessions. Lifecycle (expiry,
/// eviction) is entirely the store's concern.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, owner: &str, session_id: &str) -> Result<Option<ChatSession>, StoreError>;
    async fn store(
        &self,
        owner: &str,
        session_id: &str,
        session: ChatSession,
    ) -> Result<(), StoreError>;
    /// Whether this owner has any sessions at all (distinguishes "no
    /// sessions" from "unknown session id" in chat error messages).
    async fn has_any(&self, owner: &str) -> Result<bool, StoreError>;
}
