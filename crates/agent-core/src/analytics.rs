//! Usage Analytics and Export

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::ConversationHistory;
use crate::provider::SelectedModel;

/// Usage counters persisted across sessions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAnalytics {
    pub total_messages: u64,
    pub api_calls: u64,
    pub tool_calls: u64,
    pub tool_usage: BTreeMap<String, u64>,
    pub model_usage: BTreeMap<String, u64>,
    pub session_start: DateTime<Utc>,
}

impl Default for UsageAnalytics {
    fn default() -> Self {
        Self {
            total_messages: 0,
            api_calls: 0,
            tool_calls: 0,
            tool_usage: BTreeMap::new(),
            model_usage: BTreeMap::new(),
            session_start: Utc::now(),
        }
    }
}

impl UsageAnalytics {
    /// Parse a saved snapshot; fields missing from it keep their defaults
    pub fn merged_from_json(saved: &str) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        if let (Value::Object(base), Value::Object(overlay)) =
            (&mut merged, serde_json::from_str::<Value>(saved)?)
        {
            base.extend(overlay);
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn track_message(&mut self) {
        self.total_messages += 1;
    }

    /// One model request, keyed by display name
    pub fn track_api_call(&mut self, model: &str) {
        self.api_calls += 1;
        *self.model_usage.entry(model.to_string()).or_insert(0) += 1;
    }

    pub fn track_tool_call(&mut self, tool: &str) {
        self.tool_calls += 1;
        *self.tool_usage.entry(tool.to_string()).or_insert(0) += 1;
    }

    /// Zero all counters and restart the clock
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Tool usage, most used first
    pub fn tool_ranking(&self) -> Vec<(&str, u64)> {
        rank(&self.tool_usage)
    }

    /// Model usage, most used first
    pub fn model_ranking(&self) -> Vec<(&str, u64)> {
        rank(&self.model_usage)
    }

    /// Whole minutes since `session_start`
    pub fn session_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.session_start).num_minutes()
    }
}

fn rank(usage: &BTreeMap<String, u64>) -> Vec<(&str, u64)> {
    let mut ranked: Vec<(&str, u64)> = usage.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

/// Downloadable chat export
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExport {
    pub timestamp: String,
    pub model: Option<SelectedModel>,
    pub conversation_history: ConversationHistory,
    pub analytics: UsageAnalytics,
    pub session_duration_ms: i64,
}

impl ChatExport {
    pub fn new(
        model: Option<SelectedModel>,
        history: &ConversationHistory,
        analytics: &UsageAnalytics,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            model,
            conversation_history: history.clone(),
            analytics: analytics.clone(),
            session_duration_ms: (now - started_at).num_milliseconds(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Suggested download name, e.g. `chat-export-2024-05-01T12-30-00.json`
    pub fn file_name(now: DateTime<Utc>) -> String {
        format!("chat-export-{}.json", now.format("%Y-%m-%dT%H-%M-%S"))
    }
}
