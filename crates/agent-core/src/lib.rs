//! # agent-core
//!
//! Provider-agnostic agent loop with an extensible tool system.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Agent                                │
//! │  ┌─────────────┐  ┌──────────────┐  ┌──────────────────────────┐  │
//! │  │  Iterative  │  │    Tools     │  │  ProviderAdapter         │  │
//! │  │    Loop     │──│   Registry   │  │  (Request/Response/Auth) │  │
//! │  └──────┬──────┘  └──────────────┘  └──────────────────────────┘  │
//! │         │                                                          │
//! │  ┌──────┴──────┐  ┌──────────────┐  ┌──────────────────────────┐  │
//! │  │  Transport  │──│    Stream    │  │  MessageRenderer         │  │
//! │  │   (trait)   │  │  Reassembler │  │  (display collaborator)  │  │
//! │  └─────────────┘  └──────────────┘  └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Providers differ only inside [`provider`]; the loop in [`reasoning`]
//! branches once per request on whether the adapter streams.

pub mod analytics;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod render;
pub mod session;
pub mod stream;
pub mod tool;
pub mod transport;

pub use analytics::{ChatExport, UsageAnalytics};
pub use error::{AgentError, Result};
pub use message::{ConversationHistory, Role, ToolCallRequest, Turn};
pub use provider::{ModelSelector, ProviderAdapter, ProviderProfile, SelectedModel, SharedModelSelection};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, SubmitOutcome};
pub use render::{ConnectionStatus, DisplayRole, MessageRenderer, RenderEvent};
pub use session::{ChatSession, KeyValueStore, MemoryKeyValueStore, UploadedAttachment};
pub use stream::StreamReassembler;
pub use tool::{ParameterSchema, Tool, ToolDeclaration, ToolRegistry, ToolResult};
pub use transport::{HttpRequest, HttpResponse, HttpStreamResponse, Transport};
