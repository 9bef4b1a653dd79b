//! Transport Abstraction
//!
//! The orchestrator talks HTTP only through [`Transport`], so the loop can be
//! driven by reqwest in production and by a scripted queue in tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::Stream;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::provider::ProviderProfile;

/// Raw body chunks of a streaming response
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// One outbound POST
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub provider: ProviderProfile,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Buffered response
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Streaming response
pub struct HttpStreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl HttpStreamResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Collect the remaining body and parse it as JSON (`null` when it is not)
    pub async fn into_json(mut self) -> Value {
        let mut bytes = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(_) => break,
            }
        }
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }
}

impl std::fmt::Debug for HttpStreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// HTTP client used for provider calls
///
/// Failures before a status line is received are reported as
/// [`AgentError::Transport`]; any status, 2xx or not, is returned as a response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse>;

    async fn post_stream(&self, request: &HttpRequest) -> Result<HttpStreamResponse>;
}

/// Canned reply for [`ScriptedTransport`]
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    Json { status: u16, body: Value },
    Stream { status: u16, chunks: Vec<Vec<u8>> },
    Fail(String),
}

impl ScriptedReply {
    pub const fn ok(body: Value) -> Self {
        Self::Json { status: 200, body }
    }

    /// A 200 SSE body delivered in the given chunks
    pub fn stream<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self::Stream {
            status: 200,
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }
}

/// In-process transport that replays queued replies (for testing/offline use)
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next(&self, request: &HttpRequest) -> Result<ScriptedReply> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        reply.ok_or_else(|| transport_error(request, "no scripted reply left"))
    }
}

fn transport_error(request: &HttpRequest, message: impl Into<String>) -> AgentError {
    AgentError::Transport {
        provider: request.provider,
        message: message.into(),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse> {
        match self.next(request)? {
            ScriptedReply::Json { status, body } => Ok(HttpResponse { status, body }),
            ScriptedReply::Stream { status, chunks } => Ok(HttpResponse {
                status,
                body: serde_json::from_slice(&chunks.concat()).unwrap_or(Value::Null),
            }),
            ScriptedReply::Fail(message) => Err(transport_error(request, message)),
        }
    }

    async fn post_stream(&self, request: &HttpRequest) -> Result<HttpStreamResponse> {
        let (status, chunks) = match self.next(request)? {
            ScriptedReply::Stream { status, chunks } => (status, chunks),
            ScriptedReply::Json { status, body } => (status, vec![body.to_string().into_bytes()]),
            ScriptedReply::Fail(message) => return Err(transport_error(request, message)),
        };
        Ok(HttpStreamResponse {
            status,
            body: Box::pin(stream::iter(chunks.into_iter().map(Ok))),
        })
    }
}
