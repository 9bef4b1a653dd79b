//! Agent Loop
//!
//! One submit drives an iterative loop: request a model turn, append it, and
//! while the turn requests tools dispatch them serially, append their results
//! and ask again. The model selection is re-read at the top of every
//! iteration so a switch mid-chain applies to the very next request.
//!
//! OpenAI requests are streamed; every other provider uses a buffered POST.

use std::sync::Arc;

use futures::StreamExt;

use crate::error::{AgentError, Result};
use crate::message::{ToolCallRequest, Turn};
use crate::provider::{ModelSelector, ProviderAdapter, ProviderProfile, RequestContext, SelectedModel};
use crate::render::{ConnectionStatus, DisplayRole, MessageRenderer};
use crate::session::{ChatSession, UploadedAttachment};
use crate::stream::StreamReassembler;
use crate::tool::{ToolDeclaration, ToolRegistry};
use crate::transport::{HttpRequest, Transport};

/// Default bound on model requests per submit
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Maximum model requests in one tool-calling chain
    pub max_tool_iterations: usize,

    /// Stream responses from providers that support it
    pub streaming: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            streaming: true,
        }
    }
}

/// How a submit ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing to send (empty text and no attachment)
    Ignored,
    /// The model produced a final turn
    Completed { model_requests: usize },
}

/// The main Agent struct
pub struct Agent {
    transport: Arc<dyn Transport>,
    tools: Arc<ToolRegistry>,
    models: Arc<dyn ModelSelector>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        transport: Arc<dyn Transport>,
        tools: Arc<ToolRegistry>,
        models: Arc<dyn ModelSelector>,
        config: AgentConfig,
    ) -> Self {
        Self {
            transport,
            tools,
            models,
            config,
        }
    }

    /// Validate and append a user message, then run the loop.
    ///
    /// Validation and loop failures are also reported to `renderer`; turns
    /// appended before a failure stay in the history.
    pub async fn submit(
        &self,
        session: &mut ChatSession,
        text: &str,
        api_key: Option<&str>,
        renderer: &dyn MessageRenderer,
    ) -> Result<SubmitOutcome> {
        let result = self.try_submit(session, text, api_key, renderer).await;
        if let Err(e) = &result {
            renderer.alert(&e.user_message());
        }
        result
    }

    async fn try_submit(
        &self,
        session: &mut ChatSession,
        text: &str,
        api_key: Option<&str>,
        renderer: &dyn MessageRenderer,
    ) -> Result<SubmitOutcome> {
        let model = self.models.selected_model().ok_or(AgentError::NoModelSelected)?;

        let text = text.trim();
        if text.is_empty() && session.attachment.is_none() {
            return Ok(SubmitOutcome::Ignored);
        }

        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AgentError::MissingApiKey(model.provider))?;

        renderer.add_message(DisplayRole::User, text);
        session.analytics.track_message();
        session.history.push(Turn::user(text));

        let attachment = session.attachment.take();
        self.run(session, api_key, attachment, renderer).await
    }

    /// Run model turns until one requests no tools
    pub async fn run(
        &self,
        session: &mut ChatSession,
        api_key: &str,
        attachment: Option<UploadedAttachment>,
        renderer: &dyn MessageRenderer,
    ) -> Result<SubmitOutcome> {
        let result = self.run_loop(session, api_key, attachment, renderer).await;
        if let Err(e) = &result {
            tracing::error!(session = %session.id, error = %e, "Agent loop failed");
            if e.is_provider_error() {
                renderer.connection_status(ConnectionStatus::Error("API Error".into()));
            }
        }
        result
    }

    async fn run_loop(
        &self,
        session: &mut ChatSession,
        api_key: &str,
        mut attachment: Option<UploadedAttachment>,
        renderer: &dyn MessageRenderer,
    ) -> Result<SubmitOutcome> {
        let declarations = self.tools.declarations();
        let mut iterations = 0;

        loop {
            iterations += 1;

            if iterations > self.config.max_tool_iterations {
                return Err(AgentError::MaxToolIterations(self.config.max_tool_iterations));
            }

            // Snapshot for this iteration only
            let model = self.models.selected_model().ok_or(AgentError::NoModelSelected)?;
            let adapter = model.provider.adapter();

            let file = attachment.take().filter(|file| {
                let accepted = model.provider == ProviderProfile::Google;
                if !accepted {
                    tracing::warn!(name = %file.name, provider = %model.provider, "Dropping attachment");
                }
                accepted
            });

            renderer.connection_status(ConnectionStatus::Connecting);
            session.analytics.track_api_call(&model.display_name);

            let turn = self
                .request_turn(&model, adapter, session, &declarations, file.as_ref(), api_key, renderer)
                .await?;
            renderer.connection_status(ConnectionStatus::Connected);

            let calls: Vec<ToolCallRequest> = if adapter.dispatches_tools() {
                turn.tool_calls().to_vec()
            } else {
                Vec::new()
            };
            session.history.push(turn);

            if calls.is_empty() {
                tracing::debug!(iterations, model = %model.name, "Agent loop finished");
                return Ok(SubmitOutcome::Completed {
                    model_requests: iterations,
                });
            }

            self.dispatch_tools(session, &calls, renderer).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn request_turn(
        &self,
        model: &SelectedModel,
        adapter: &dyn ProviderAdapter,
        session: &mut ChatSession,
        declarations: &[ToolDeclaration],
        attachment: Option<&UploadedAttachment>,
        api_key: &str,
        renderer: &dyn MessageRenderer,
    ) -> Result<Turn> {
        let stream = self.config.streaming && adapter.supports_streaming();
        let request = HttpRequest {
            provider: model.provider,
            url: adapter.request_url(&model.name, api_key),
            headers: adapter.auth_headers(api_key),
            body: adapter.build_request_body(&RequestContext {
                model: &model.name,
                history: &session.history,
                tools: declarations,
                attachment,
                stream,
            }),
        };
        tracing::debug!(provider = %model.provider, model = %model.name, stream, "Requesting model turn");

        if stream {
            let turn = self.streamed_turn(adapter, &request, renderer).await?;
            session.analytics.track_message();
            Ok(turn)
        } else {
            let turn = self.buffered_turn(adapter, &request).await?;
            if !turn.content().is_empty() {
                renderer.add_message(DisplayRole::Agent, turn.content());
                session.analytics.track_message();
            }
            Ok(turn)
        }
    }

    async fn buffered_turn(&self, adapter: &dyn ProviderAdapter, request: &HttpRequest) -> Result<Turn> {
        let response = self.transport.post_json(request).await?;
        if !response.is_success() {
            return Err(AgentError::Provider {
                provider: request.provider,
                message: adapter.extract_error_message(&response.body),
            });
        }
        adapter.extract_assistant_turn(&response.body)
    }

    async fn streamed_turn(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &HttpRequest,
        renderer: &dyn MessageRenderer,
    ) -> Result<Turn> {
        let response = self.transport.post_stream(request).await?;
        if !response.is_success() {
            let body = response.into_json().await;
            return Err(AgentError::Provider {
                provider: request.provider,
                message: adapter.extract_error_message(&body),
            });
        }

        let mut body = response.body;
        let mut reassembler = StreamReassembler::new();
        while let Some(chunk) = body.next().await {
            let progress = reassembler.feed(&chunk?);
            if progress.text_updated {
                renderer.update_streaming(reassembler.text());
            }
            if progress.done {
                break;
            }
        }

        let turn = reassembler.finish();
        renderer.finish_streaming(turn.content());
        Ok(turn)
    }

    /// Dispatch serially and append results in request order
    async fn dispatch_tools(
        &self,
        session: &mut ChatSession,
        calls: &[ToolCallRequest],
        renderer: &dyn MessageRenderer,
    ) {
        for call in calls {
            session.analytics.track_tool_call(&call.name);

            let result = self.tools.dispatch(call).await;
            if !result.success && !self.tools.is_quiet(&call.name) {
                renderer.add_message(DisplayRole::ToolOutput, &result.output);
                session.analytics.track_message();
            }

            session
                .history
                .push(Turn::tool(&call.id, &call.name, result.output));
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    transport: Option<Arc<dyn Transport>>,
    models: Option<Arc<dyn ModelSelector>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            models: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn models(mut self, models: Arc<dyn ModelSelector>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn tool<T: crate::tool::Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub const fn max_tool_iterations(mut self, max: usize) -> Self {
        self.config.max_tool_iterations = max;
        self
    }

    pub const fn streaming(mut self, enabled: bool) -> Self {
        self.config.streaming = enabled;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let transport = self
            .transport
            .ok_or_else(|| AgentError::Config("Transport is required".into()))?;
        let models = self
            .models
            .ok_or_else(|| AgentError::Config("Model selection is required".into()))?;
        if self.config.max_tool_iterations == 0 {
            return Err(AgentError::Config("max_tool_iterations must be at least 1".into()));
        }

        Ok(Agent::new(transport, Arc::new(self.tools), models, self.config))
    }
}
