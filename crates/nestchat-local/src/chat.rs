//! Chat orchestration.
//!
//! Turns a `(session, prompt)` pair into a reply. Each turn replays the
//! session history to the model and wraps the current prompt with a
//! bounded slice of the extracted resource text. Failures are
//! request-scoped: an errored turn leaves the session ready for retry.

use std::time::Duration;

use nestchat_core::{truncate_chars, CallError, ChatSession, CONTEXT_SLICE_CHARS};

use crate::bounded::BoundedRunner;
use crate::gemini::Content;
use crate::model::ModelSelector;

const CHAT_UNAVAILABLE: &str = "The AI chatbot is currently unavailable. Please check the API key configuration in the .env file and ensure you have a valid Google AI API key.";

/// Wraps the current prompt with a labeled slice of the resource text.
/// Sessions without resource text send the prompt as-is.
fn wrap_prompt(resource_text: &str, prompt: &str) -> String {
    if resource_text.is_empty() {
        return prompt.to_string();
    }
    let context = truncate_chars(resource_text, CONTEXT_SLICE_CHARS);
    format!("Context information from the resource:\n{context}\n\nUser query: {prompt}")
}

/// History replay plus the wrapped current prompt. History holds raw
/// prompts; the context slice is attached only to the turn being sent.
fn replay(session: &ChatSession, prompt: &str) -> Vec<Content> {
    let mut contents = Vec::with_capacity(session.history.len() * 2 + 1);
    for turn in &session.history {
        contents.push(Content::user(turn.prompt.clone()));
        contents.push(Content::model(turn.reply.clone()));
    }
    contents.push(Content::user(wrap_prompt(&session.resource_text, prompt)));
    contents
}

pub struct ChatEngine {
    selector: ModelSelector,
    runner: BoundedRunner,
    chat_budget: Duration,
}

impl ChatEngine {
    pub fn new(selector: ModelSelector, runner: BoundedRunner, chat_budget: Duration) -> Self {
        ChatEngine {
            selector,
            runner,
            chat_budget,
        }
    }

    pub fn configured(&self) -> bool {
        self.selector.configured()
    }

    /// Kicks off the candidate walk so the first user request does not
    /// pay for it.
    pub async fn warm_up(&self) {
        let _ = self.selector.active().await;
    }

    pub async fn model_name(&self) -> Option<String> {
        self.selector.active_model_name().await
    }

    /// One chat turn. On success via the history-bearing path the turn
    /// is appended to the session. If that path times out, a one-shot
    /// call without history is attempted instead; a reply produced that
    /// way is returned but *not* appended, so the model will not see
    /// this exchange on later turns. Continuity is sacrificed for
    /// availability there.
    pub async fn chat_turn(
        &self,
        session: &mut ChatSession,
        prompt: &str,
    ) -> Result<String, CallError> {
        let Some(model) = self.selector.active().await else {
            return Err(CallError::ModelUnavailable(CHAT_UNAVAILABLE.to_string()));
        };

        let budget = self.chat_budget;
        let contents = replay(session, prompt);
        let call_model = model.clone();
        let primary = self
            .runner
            .run(budget, "chat", async move {
                call_model.generate(&contents, budget).await
            })
            .await;

        match primary {
            Ok(reply) => {
                session.push_turn(prompt, &reply);
                Ok(reply)
            }
            Err(CallError::Timeout) => {
                tracing::warn!(
                    resource = session.resource_id,
                    turns = session.history.len(),
                    "chat with history timed out; retrying one-shot"
                );
                let bare = vec![Content::user(wrap_prompt(&session.resource_text, prompt))];
                let reply = self
                    .runner
                    .run(budget, "chat_one_shot", async move {
                        model.generate(&bare, budget).await
                    })
                    .await?;
                Ok(reply)
            }
            Err(e) => Err(e),
        }
    }
}
