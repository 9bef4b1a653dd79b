//! Stream Reassembly
//!
//! Decodes an OpenAI-style SSE body (`data: <json>\n` lines terminated by
//! `data: [DONE]`) into one assistant turn. Bytes are buffered until a full
//! line is available, so frames and multi-byte characters split across chunk
//! boundaries reassemble to the same turn as an unsplit body.
//!
//! Malformed frames are skipped and counted rather than failing the stream.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::message::{ToolCallRequest, Turn};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Default, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<FrameChoice>,
}

#[derive(Debug, Default, Deserialize)]
struct FrameChoice {
    #[serde(default)]
    delta: Option<FrameDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FrameDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallFragment>>,
}

/// One partial tool call from a stream delta
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionFragment>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FunctionFragment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    pub fn new(index: usize, id: Option<&str>, name: Option<&str>, arguments: Option<&str>) -> Self {
        Self {
            index: Some(index),
            id: id.map(Into::into),
            function: Some(FunctionFragment {
                name: name.map(Into::into),
                arguments: arguments.map(Into::into),
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments_json: String,
}

/// In-progress tool calls keyed by stream index.
///
/// `id` and `name` keep their first non-empty value; argument fragments are
/// concatenated strictly in arrival order.
#[derive(Clone, Debug, Default)]
pub struct PendingToolCallAccumulator {
    calls: BTreeMap<usize, PendingToolCall>,
}

impl PendingToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment; fragments without an index are ignored
    pub fn merge(&mut self, fragment: &ToolCallFragment) {
        let Some(index) = fragment.index else {
            tracing::debug!("Skipping tool call fragment without index");
            return;
        };
        let pending = self.calls.entry(index).or_default();

        if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
            if pending.id.is_empty() {
                pending.id = id.to_string();
            }
        }
        if let Some(function) = &fragment.function {
            if let Some(name) = function.name.as_deref().filter(|n| !n.is_empty()) {
                if pending.name.is_empty() {
                    pending.name = name.to_string();
                }
            }
            if let Some(arguments) = &function.arguments {
                pending.arguments_json.push_str(arguments);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Completed calls ordered by stream index
    pub fn finalize(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_values()
            .map(|p| ToolCallRequest::new(p.id, p.name, p.arguments_json))
            .collect()
    }
}

/// What one [`StreamReassembler::feed`] call changed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedProgress {
    /// Accumulated text grew
    pub text_updated: bool,
    /// The `[DONE]` marker was seen
    pub done: bool,
}

/// Incremental decoder for a chunked completion stream
#[derive(Debug, Default)]
pub struct StreamReassembler {
    buffer: Vec<u8>,
    text: String,
    tool_calls: PendingToolCallAccumulator,
    done: bool,
    malformed_frames: usize,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next raw chunk of the response body
    pub fn feed(&mut self, chunk: &[u8]) -> FeedProgress {
        let mut progress = FeedProgress::default();
        if self.done {
            progress.done = true;
            return progress;
        }

        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            progress.text_updated |= self.process_line(&line[..pos]);
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        progress.done = self.done;
        progress
    }

    fn process_line(&mut self, raw: &[u8]) -> bool {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return false;
        };

        if data.trim() == DONE_MARKER {
            self.done = true;
            return false;
        }

        let frame: StreamFrame = match serde_json::from_str(data) {
            Ok(frame) => frame,
            Err(e) => {
                self.malformed_frames += 1;
                tracing::warn!(
                    error = %e,
                    skipped = self.malformed_frames,
                    "Skipping malformed stream frame"
                );
                return false;
            }
        };

        let Some(delta) = frame.choices.into_iter().next().and_then(|c| c.delta) else {
            return false;
        };

        let mut text_updated = false;
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            self.text.push_str(&content);
            text_updated = true;
        }
        for fragment in delta.tool_calls.unwrap_or_default() {
            self.tool_calls.merge(&fragment);
        }
        text_updated
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Frames skipped because their payload was not valid JSON
    pub const fn malformed_frames(&self) -> usize {
        self.malformed_frames
    }

    /// Flush any unterminated final line and build the assistant turn
    pub fn finish(mut self) -> Turn {
        if !self.done && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.process_line(&rest);
        }
        if self.malformed_frames > 0 {
            tracing::debug!(skipped = self.malformed_frames, "Stream finished with malformed frames");
        }
        Turn::assistant_with_tools(self.text, self.tool_calls.finalize())
    }
}
