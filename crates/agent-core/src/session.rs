//! Session Management
//!
//! A chat session owns the conversation history, the single attachment slot
//! and the usage analytics. Persistent key/value storage lives behind
//! [`KeyValueStore`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analytics::UsageAnalytics;
use crate::error::{AgentError, Result};
use crate::message::ConversationHistory;
use crate::provider::ProviderProfile;

/// Store key for the user's API key
pub const API_KEY_STORE_KEY: &str = "chat_api_key";

/// Store key for the analytics snapshot
pub const ANALYTICS_STORE_KEY: &str = "chat_analytics";

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// File attached to the next user turn (Google only)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedAttachment {
    pub name: String,
    pub mime_type: String,
    pub base64_data: String,
}

impl UploadedAttachment {
    /// Accepts raw base64 or a `data:<mime>;base64,<payload>` URL
    pub fn from_base64(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: &str,
    ) -> Result<Self> {
        let payload = if data.starts_with("data:") {
            data.split_once(',').map_or("", |(_, rest)| rest)
        } else {
            data
        }
        .trim();

        if payload.is_empty() {
            return Err(AgentError::InvalidAttachment("empty payload".into()));
        }
        STANDARD
            .decode(payload)
            .map_err(|e| AgentError::InvalidAttachment(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            mime_type: mime_type.into(),
            base64_data: payload.to_string(),
        })
    }

    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            base64_data: STANDARD.encode(bytes),
        }
    }
}

/// A chat session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique identifier
    pub id: SessionId,

    /// Conversation history; only the orchestrator appends to it
    pub history: ConversationHistory,

    /// Pending attachment for the next submit
    pub attachment: Option<UploadedAttachment>,

    /// Usage counters
    pub analytics: UsageAnalytics,

    /// Start of the current chat
    pub started_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_analytics(UsageAnalytics::default())
    }

    /// Start a session on top of previously persisted analytics
    pub fn with_analytics(analytics: UsageAnalytics) -> Self {
        Self {
            id: SessionId::new(),
            history: ConversationHistory::new(),
            attachment: None,
            analytics,
            started_at: Utc::now(),
        }
    }

    /// Set the attachment slot; only Google models accept files
    pub fn attach(&mut self, provider: ProviderProfile, file: UploadedAttachment) -> Result<()> {
        if provider != ProviderProfile::Google {
            return Err(AgentError::AttachmentUnsupported(provider));
        }
        tracing::debug!(name = %file.name, mime = %file.mime_type, "Attachment set");
        self.attachment = Some(file);
        Ok(())
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }

    /// New chat: history and attachment are reset together
    pub fn reset(&mut self) {
        self.history.clear();
        self.attachment = None;
        self.started_at = Utc::now();
        self.analytics.session_start = self.started_at;
    }

    /// Time since the chat started
    pub fn duration(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistent key/value store (API key, analytics snapshot)
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store (for development/testing)
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Load the saved API key, if any
pub fn load_api_key(store: &dyn KeyValueStore) -> Result<Option<String>> {
    Ok(store.get(API_KEY_STORE_KEY)?.filter(|k| !k.trim().is_empty()))
}

pub fn save_api_key(store: &dyn KeyValueStore, key: &str) -> Result<()> {
    store.set(API_KEY_STORE_KEY, key.trim())
}

pub fn clear_api_key(store: &dyn KeyValueStore) -> Result<()> {
    store.remove(API_KEY_STORE_KEY)
}

/// Load analytics, merging the saved snapshot over defaults
pub fn load_analytics(store: &dyn KeyValueStore) -> Result<UsageAnalytics> {
    match store.get(ANALYTICS_STORE_KEY)? {
        Some(saved) => UsageAnalytics::merged_from_json(&saved),
        None => Ok(UsageAnalytics::default()),
    }
}

pub fn save_analytics(store: &dyn KeyValueStore, analytics: &UsageAnalytics) -> Result<()> {
    store.set(ANALYTICS_STORE_KEY, &serde_json::to_string(analytics)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Turn;

    #[test]
    fn test_session_creation() {
        let session = ChatSession::new();
        assert!(session.history.is_empty());
        assert!(session.attachment.is_none());
    }

    #[test]
    fn test_attachment_rules() {
        let mut session = ChatSession::new();
        let file = UploadedAttachment::from_bytes("a.png", "image/png", b"png");

        assert!(matches!(
            session.attach(ProviderProfile::OpenAi, file.clone()),
            Err(AgentError::AttachmentUnsupported(ProviderProfile::OpenAi))
        ));
        session.attach(ProviderProfile::Google, file).unwrap();
        assert!(session.attachment.is_some());
    }

    #[test]
    fn test_attachment_from_data_url() {
        let file = UploadedAttachment::from_base64("a.png", "image/png", "data:image/png;base64,aGVsbG8=")
            .unwrap();
        assert_eq!(file.base64_data, "aGVsbG8=");

        assert!(UploadedAttachment::from_base64("a", "image/png", "***").is_err());
        assert!(UploadedAttachment::from_base64("a", "image/png", "data:image/png;base64,").is_err());
    }

    #[test]
    fn test_reset_clears_history_and_attachment() {
        let mut session = ChatSession::new();
        session.history.push(Turn::user("hi"));
        session
            .attach(ProviderProfile::Google, UploadedAttachment::from_bytes("a", "image/png", b"x"))
            .unwrap();
        session.analytics.track_api_call("GPT-4o");

        session.reset();

        assert!(session.history.is_empty());
        assert!(session.attachment.is_none());
        assert_eq!(session.analytics.api_calls, 1);
        assert_eq!(session.analytics.session_start, session.started_at);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryKeyValueStore::new();
        assert!(load_api_key(&store).unwrap().is_none());

        save_api_key(&store, "  sk-abc ").unwrap();
        assert_eq!(load_api_key(&store).unwrap().as_deref(), Some("sk-abc"));

        clear_api_key(&store).unwrap();
        assert!(load_api_key(&store).unwrap().is_none());
    }

    #[test]
    fn test_analytics_persistence() {
        let store = MemoryKeyValueStore::new();
        let mut analytics = UsageAnalytics::default();
        analytics.track_tool_call("googleSearch");
        save_analytics(&store, &analytics).unwrap();

        let loaded = load_analytics(&store).unwrap();
        assert_eq!(loaded.tool_calls, 1);
        assert_eq!(loaded.tool_usage.get("googleSearch"), Some(&1));
    }
}
