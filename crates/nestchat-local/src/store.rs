//! Store implementations backing the chat traits.
//!
//! Resources come from a JSON manifest loaded once at startup; sessions
//! live in process memory. Both are deliberately plain: durability and
//! eviction policy belong to whoever embeds the engine, not here.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use nestchat_core::{ChatSession, ResourceContent, ResourceStore, SessionStore, StoreError};

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: u64,
    #[serde(flatten)]
    content: ResourceContent,
}

/// Read-only resource catalog from a JSON manifest:
///
/// ```json
/// [
///   { "id": 1, "kind": "pdf", "path": "notes.pdf" },
///   { "id": 2, "kind": "link", "url": "https://example.com/post" },
///   { "id": 3, "kind": "youtube", "url": "https://youtu.be/dQw4w9WgXcQ" }
/// ]
/// ```
///
/// Relative PDF paths resolve against the uploads root.
#[derive(Debug)]
pub struct JsonResourceStore {
    resources: HashMap<u64, ResourceContent>,
}

impl JsonResourceStore {
    pub fn load(manifest: &Path, uploads_root: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(manifest)
            .map_err(|e| StoreError(format!("cannot read {}: {e}", manifest.display())))?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&raw)
            .map_err(|e| StoreError(format!("malformed manifest {}: {e}", manifest.display())))?;

        let mut resources = HashMap::with_capacity(entries.len());
        for entry in entries {
            let content = match entry.content {
                ResourceContent::Pdf { path } if path.is_relative() => ResourceContent::Pdf {
                    path: uploads_root.join(path),
                },
                other => other,
            };
            if resources.insert(entry.id, content).is_some() {
                tracing::warn!(id = entry.id, "duplicate resource id in manifest; keeping the later entry");
            }
        }
        Ok(JsonResourceStore { resources })
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl ResourceStore for JsonResourceStore {
    async fn content(&self, resource_id: u64) -> Result<Option<ResourceContent>, StoreError> {
        Ok(self.resources.get(&resource_id).cloned())
    }
}

/// Sessions keyed by (browser owner, session id), in memory only. A
/// restart forgets everything, which matches the lifetime of the cookie
/// the owner id comes from.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<(String, String), ChatSession>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, owner: &str, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        let map = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map
            .get(&(owner.to_string(), session_id.to_string()))
            .cloned())
    }

    async fn store(
        &self,
        owner: &str,
        session_id: &str,
        session: ChatSession,
    ) -> Result<(), StoreError> {
        let mut map = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        map.insert((owner.to_string(), session_id.to_string()), session);
        Ok(())
    }

    async fn has_any(&self, owner: &str) -> Result<bool, StoreError> {
        let map = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.keys().any(|(o, _)| o == owner))
    }
}
