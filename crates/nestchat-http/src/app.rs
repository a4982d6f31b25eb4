//! HTTP surface for the chat service.
//!
//! Two JSON endpoints mirror the browser flow: `POST /api/chatbot/init/:resource_id`
//! extracts the resource text and opens a session, `POST /api/chatbot/chat` runs one
//! turn against that session. Errors travel inside the JSON envelope (`success: false`
//! plus an `error` string) with HTTP 200 so the frontend has a single decode path;
//! the only exception is an unknown resource id, which is a plain 404.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use nestchat_core::{session_key, ChatSession, ResourceStore, SessionStore, RESOURCE_TEXT_CAP_CHARS};
use nestchat_local::{ChatEngine, Extractor};

/// Cookie that scopes chat sessions to one browser.
pub const OWNER_COOKIE: &str = "nestchat_sid";

const KEY_MISSING_MSG: &str =
    "Gemini API key is not configured. Please set GEMINI_API_KEY in your .env file.";
const MODEL_DOWN_MSG: &str =
    "The Gemini AI model is not working. Please check your API key and internet connection.";

pub struct AppState {
    pub engine: ChatEngine,
    pub extractor: Extractor,
    pub resources: Arc<dyn ResourceStore>,
    pub sessions: Arc<dyn SessionStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chatbot/init/:resource_id", post(chatbot_init))
        .route("/api/chatbot/chat", post(chatbot_chat))
        .with_state(state)
}

#[derive(Debug, Deserialize, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Identity of the requesting browser, plus whether we minted it on this request.
struct Owner {
    id: String,
    fresh: bool,
}

fn owner_from_headers(headers: &HeaderMap) -> Owner {
    if let Some(id) = cookie_value(headers, OWNER_COOKIE) {
        return Owner { id, fresh: false };
    }
    Owner {
        id: uuid::Uuid::new_v4().to_string(),
        fresh: true,
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    for piece in raw.split(';') {
        if let Some(v) = piece.trim().strip_prefix(name) {
            if let Some(v) = v.strip_prefix('=') {
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

/// Builds the response, attaching a session cookie when this request minted one.
fn respond(status: StatusCode, body: Value, owner: &Owner) -> Response {
    let mut resp = (status, Json(body)).into_response();
    if owner.fresh {
        let cookie = format!("{OWNER_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", owner.id);
        if let Ok(v) = HeaderValue::from_str(&cookie) {
            resp.headers_mut().append(SET_COOKIE, v);
        }
    }
    resp
}

fn error_body(message: impl Into<String>) -> Value {
    json!({ "success": false, "error": message.into() })
}

async fn chatbot_init(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    let owner = owner_from_headers(&headers);

    if !state.engine.configured() {
        return respond(StatusCode::OK, error_body(KEY_MISSING_MSG), &owner);
    }
    let Some(model_name) = state.engine.model_name().await else {
        return respond(StatusCode::OK, error_body(MODEL_DOWN_MSG), &owner);
    };

    let content = match state.resources.content(resource_id).await {
        Ok(Some(content)) => content,
        Ok(None) => {
            return respond(StatusCode::NOT_FOUND, error_body("Resource not found"), &owner)
        }
        Err(e) => {
            tracing::error!(resource_id, error = %e, "resource lookup failed");
            return respond(
                StatusCode::OK,
                error_body(format!("Error initializing chatbot: {e}")),
                &owner,
            );
        }
    };

    let kind = content.kind();
    let extracted = match state.extractor.resource_text(&content).await {
        Ok(extracted) => extracted,
        Err(e) => {
            tracing::warn!(resource_id, kind = kind.as_str(), error_kind = e.kind(), "extraction failed");
            return respond(StatusCode::OK, error_body(e.to_string()), &owner);
        }
    };

    let session_id = session_key(resource_id);
    let session = ChatSession::new(resource_id, &extracted.text);
    if let Err(e) = state.sessions.store(&owner.id, &session_id, session).await {
        tracing::error!(resource_id, error = %e, "session store failed");
        return respond(
            StatusCode::OK,
            error_body(format!("Error initializing chatbot: {e}")),
            &owner,
        );
    }

    tracing::info!(
        resource_id,
        kind = kind.as_str(),
        chars = extracted.text.chars().count().min(RESOURCE_TEXT_CAP_CHARS),
        "chat session initialized"
    );
    respond(
        StatusCode::OK,
        json!({
            "success": true,
            "session_id": session_id,
            "resource_type": kind.as_str(),
            "model_name": model_name,
        }),
        &owner,
    )
}

async fn chatbot_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<ChatRequest>>,
) -> Response {
    let owner = owner_from_headers(&headers);

    if !state.engine.configured() {
        return respond(StatusCode::OK, error_body(KEY_MISSING_MSG), &owner);
    }
    if state.engine.model_name().await.is_none() {
        return respond(StatusCode::OK, error_body(MODEL_DOWN_MSG), &owner);
    }

    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (session_id, prompt) = match (req.session_id.as_deref(), req.prompt.as_deref()) {
        (Some(s), Some(p)) if !s.is_empty() && !p.is_empty() => (s, p),
        _ => return respond(StatusCode::OK, error_body("Invalid session ID or prompt"), &owner),
    };

    match state.sessions.has_any(&owner.id).await {
        Ok(true) => {}
        Ok(false) => {
            return respond(StatusCode::OK, error_body("No active chatbot sessions"), &owner)
        }
        Err(e) => {
            tracing::error!(error = %e, "session lookup failed");
            return respond(
                StatusCode::OK,
                error_body(format!("Error processing request: {e}")),
                &owner,
            );
        }
    }

    let mut session = match state.sessions.load(&owner.id, session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return respond(StatusCode::OK, error_body("Session expired or invalid"), &owner)
        }
        Err(e) => {
            tracing::error!(error = %e, "session lookup failed");
            return respond(
                StatusCode::OK,
                error_body(format!("Error processing request: {e}")),
                &owner,
            );
        }
    };

    let reply = match state.engine.chat_turn(&mut session, prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(session_id, error_kind = e.kind(), "chat turn failed");
            return respond(StatusCode::OK, error_body(e.to_string()), &owner);
        }
    };

    if let Err(e) = state.sessions.store(&owner.id, session_id, session).await {
        tracing::error!(error = %e, "session store failed");
        return respond(
            StatusCode::OK,
            error_body(format!("Error processing request: {e}")),
            &owner,
        );
    }

    respond(StatusCode::OK, json!({ "success": true, "response": reply }), &owner)
}
