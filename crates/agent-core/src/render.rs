//! Renderer Collaborator
//!
//! The orchestrator never touches a display directly. It emits
//! [`RenderEvent`]s to a [`MessageRenderer`], which the host turns into
//! whatever its surface needs (WebSocket frames, a response log, a terminal).

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who a displayed message belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayRole {
    User,
    Agent,
    ToolOutput,
}

/// Provider connection indicator
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// One display update
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RenderEvent {
    /// A complete message; agent messages carry rendered HTML
    Message {
        role: DisplayRole,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        html: Option<String>,
    },
    /// In-progress streamed assistant text (full text so far)
    StreamUpdate { content: String, html: String },
    /// The streamed assistant message is complete
    StreamFinished { content: String, html: String },
    Status { status: ConnectionStatus },
    Alert { message: String },
    Chart { config: Value },
}

/// Display collaborator driven by the orchestrator
pub trait MessageRenderer: Send + Sync {
    fn render(&self, event: RenderEvent);

    fn add_message(&self, role: DisplayRole, content: &str) {
        let html = (role == DisplayRole::Agent).then(|| markdown_to_html(content));
        self.render(RenderEvent::Message {
            role,
            content: content.to_string(),
            html,
        });
    }

    fn update_streaming(&self, content: &str) {
        self.render(RenderEvent::StreamUpdate {
            content: content.to_string(),
            html: markdown_to_html(content),
        });
    }

    fn finish_streaming(&self, content: &str) {
        self.render(RenderEvent::StreamFinished {
            content: content.to_string(),
            html: markdown_to_html(content),
        });
    }

    fn connection_status(&self, status: ConnectionStatus) {
        self.render(RenderEvent::Status { status });
    }

    fn alert(&self, message: &str) {
        self.render(RenderEvent::Alert {
            message: message.to_string(),
        });
    }
}

/// Discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderer;

impl MessageRenderer for NullRenderer {
    fn render(&self, _event: RenderEvent) {}
}

/// Keeps every event in order
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<RenderEvent>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<RenderEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl MessageRenderer for RecordingRenderer {
    fn render(&self, event: RenderEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Render the supported markdown subset: `**bold**`, `* ` bullet lists and
/// one paragraph per non-empty line.
pub fn markdown_to_html(text: &str) -> String {
    let text = text.trim();
    let mut html = String::new();
    let mut in_list = false;

    for line in text.lines() {
        let line = replace_bold(line);
        let trimmed = line.trim();

        if let Some(item) = trimmed.strip_prefix("* ") {
            if !in_list {
                html.push_str("<ul>");
                in_list = true;
            }
            html.push_str("<li>");
            html.push_str(item);
            html.push_str("</li>");
            continue;
        }

        if in_list {
            html.push_str("</ul>");
            in_list = false;
        }
        if !trimmed.is_empty() {
            html.push_str("<p>");
            html.push_str(&line);
            html.push_str("</p>");
        }
    }

    if in_list {
        html.push_str("</ul>");
    }
    html
}

fn replace_bold(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(open) = rest.find("**") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("**") else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str("<strong>");
        out.push_str(&after_open[..close]);
        out.push_str("</strong>");
        rest = &after_open[close + 2..];
    }

    out.push_str(rest);
    out
}
