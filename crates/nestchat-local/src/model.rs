//! Model selection.
//!
//! The configured candidate list is walked once, in order, probing each
//! model with a trivial prompt under the bounded runner. The first
//! candidate that answers is committed as the process-wide model. A
//! fully failed walk is just as sticky: the outcome is cached either
//! way, and an operator restarts the process to re-attempt after an
//! outage. Different deployments expose different model names, and
//! probing avoids committing a handle that accepts construction but
//! rejects generation.

use std::time::Duration;

use tokio::sync::OnceCell;

use crate::bounded::BoundedRunner;
use crate::gemini::GeminiClient;

/// Preferred fast model first, then full-path aliases, then the legacy
/// fallback name.
pub const DEFAULT_MODEL_CANDIDATES: [&str; 4] = [
    "gemini-2.0-flash",
    "gemini-pro",
    "models/gemini-flash",
    "models/gemini-pro",
];

pub struct ModelSelector {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    candidates: Vec<String>,
    probe_budget: Duration,
    runner: BoundedRunner,
    cell: OnceCell<Option<GeminiClient>>,
}

impl ModelSelector {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        candidates: Vec<String>,
        probe_budget: Duration,
        runner: BoundedRunner,
    ) -> Self {
        ModelSelector {
            http,
            base_url: base_url.into(),
            api_key,
            candidates,
            probe_budget,
            runner,
            cell: OnceCell::new(),
        }
    }

    /// Whether an API key is present at all. Without one the walk is
    /// skipped entirely and `active` always reports unavailable.
    pub fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// The committed model, walking the candidate list on first use.
    pub async fn active(&self) -> Option<GeminiClient> {
        self.cell.get_or_init(|| self.walk_candidates()).await.clone()
    }

    pub async fn active_model_name(&self) -> Option<String> {
        self.active().await.map(|m| m.model)
    }

    async fn walk_candidates(&self) -> Option<GeminiClient> {
        let key = self.api_key.as_deref()?;
        for name in &self.candidates {
            let client = GeminiClient::new(
                self.http.clone(),
                self.base_url.clone(),
                key,
                name.clone(),
            );
            let probe = client.clone();
            let budget = self.probe_budget;
            match self
                .runner
                .run(budget, "model_probe", async move { probe.probe(budget).await })
                .await
            {
                Ok(()) => {
                    tracing::info!(model = %name, "model candidate committed");
                    return Some(client);
                }
                Err(e) => {
                    tracing::warn!(model = %name, kind = e.kind(), error = %e, "model candidate failed probe");
                }
            }
        }
        tracing::error!("no model candidate answered; chat will report the model as unavailable");
        None
    }
}
