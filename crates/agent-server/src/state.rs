//! Application State

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, broadcast};

use agent_core::session::load_analytics;
use agent_core::{
    Agent, AgentBuilder, ChatSession, KeyValueStore, Result, SharedModelSelection, Transport,
};
use agent_runtime::RuntimeConfig;
use agent_tools::{ChartSink, ToolsConfig, default_registry};

const CHART_CHANNEL_CAPACITY: usize = 16;

/// Fans rendered charts out to whichever handler is driving the current submit
#[derive(Clone, Debug)]
pub struct ChartBroadcast {
    tx: broadcast::Sender<Value>,
}

impl ChartBroadcast {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHART_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.tx.subscribe()
    }
}

impl Default for ChartBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartSink for ChartBroadcast {
    fn render_chart(&self, config: Value) {
        // No receiver just means nobody is watching
        let _ = self.tx.send(config);
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Agent loop with the built-in tools
    pub agent: Arc<Agent>,

    /// Current model, re-read by the agent on every iteration
    pub models: SharedModelSelection,

    /// The single chat; locked for the whole of a submit
    pub session: Arc<Mutex<ChatSession>>,

    /// Persisted API key and analytics
    pub store: Arc<dyn KeyValueStore>,

    pub config: Arc<RuntimeConfig>,

    pub charts: ChartBroadcast,
}

impl AppState {
    pub fn new(
        transport: Arc<dyn Transport>,
        tools: &ToolsConfig,
        config: RuntimeConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let charts = ChartBroadcast::new();
        let models = SharedModelSelection::default();

        let agent = AgentBuilder::new()
            .transport(transport)
            .models(Arc::new(models.clone()))
            .tools(default_registry(tools, Arc::new(charts.clone())))
            .max_tool_iterations(config.max_tool_iterations())
            .build()?;

        let session = ChatSession::with_analytics(load_analytics(store.as_ref())?);

        Ok(Self {
            agent: Arc::new(agent),
            models,
            session: Arc::new(Mutex::new(session)),
            store,
            config: Arc::new(config),
            charts,
        })
    }

    /// Saved key, falling back to the configured default
    pub fn api_key(&self) -> Result<Option<String>> {
        let saved = agent_core::session::load_api_key(self.store.as_ref())?;
        Ok(self.config.resolve_api_key(saved.as_deref()))
    }
}
