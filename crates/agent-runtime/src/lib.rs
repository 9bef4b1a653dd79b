//! # agent-runtime
//!
//! Runtime plumbing for the agent-chat system.
//!
//! - [`HttpTransport`]: reqwest implementation of the core `Transport`
//!   (buffered JSON POST and streaming POST)
//! - [`RuntimeConfig`]: environment-driven settings (default key, loop
//!   bound, HTTP timeout)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{HttpTransport, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_env()?;
//! let agent = AgentBuilder::new()
//!     .transport(Arc::new(HttpTransport::from_config(&config)?))
//!     .models(Arc::new(selection))
//!     .max_tool_iterations(config.max_tool_iterations())
//!     .build()?;
//! ```

pub mod config;
pub mod http;

pub use config::RuntimeConfig;
pub use http::HttpTransport;

// Re-export core types for convenience
pub use agent_core::{Agent, AgentBuilder, AgentError, Result, Tool, ToolRegistry, Transport};
