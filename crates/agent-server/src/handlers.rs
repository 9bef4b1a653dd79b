//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{MutexGuard, broadcast, mpsc};

use agent_core::provider::{ModelInfo, default_model_catalog, validate_key_format};
use agent_core::render::RecordingRenderer;
use agent_core::session::{clear_api_key, save_analytics, save_api_key};
use agent_core::{
    AgentError, ChatExport, ChatSession, ConnectionStatus, MessageRenderer, ModelSelector,
    ProviderProfile, RenderEvent, SelectedModel, SubmitOutcome, Turn, UploadedAttachment, UsageAnalytics,
};

use crate::state::AppState;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: Option<SelectedModel>,
    pub api_key_present: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    /// Empty clears the selection
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct SelectModelResponse {
    pub model: Option<SelectedModel>,
    pub provider: Option<ProviderProfile>,
    pub status: ConnectionStatus,
}

#[derive(Debug, Deserialize)]
pub struct SaveKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct SaveKeyResponse {
    pub saved: bool,
    pub status: ConnectionStatus,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentRequest {
    pub name: String,
    pub mime_type: String,
    /// Base64 payload, optionally as a data URL
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// `completed` or `ignored`; absent when the submit failed
    pub outcome: Option<&'static str>,
    pub model_requests: usize,
    pub history: Vec<Turn>,
    pub events: Vec<RenderEvent>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsageEntry {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub analytics: UsageAnalytics,
    pub tool_ranking: Vec<UsageEntry>,
    pub model_ranking: Vec<UsageEntry>,
    pub session_minutes: i64,
}

impl AnalyticsResponse {
    fn new(analytics: &UsageAnalytics) -> Self {
        let entries = |ranking: Vec<(&str, u64)>| {
            ranking
                .into_iter()
                .map(|(name, count)| UsageEntry {
                    name: name.to_string(),
                    count,
                })
                .collect()
        };
        Self {
            tool_ranking: entries(analytics.tool_ranking()),
            model_ranking: entries(analytics.model_ranking()),
            session_minutes: analytics.session_minutes(Utc::now()),
            analytics: analytics.clone(),
        }
    }
}

fn error_response(status: StatusCode, code: &str, error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn agent_error(err: &AgentError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match err {
        AgentError::NoModelSelected => (StatusCode::BAD_REQUEST, "NO_MODEL"),
        AgentError::MissingApiKey(_) => (StatusCode::BAD_REQUEST, "MISSING_API_KEY"),
        AgentError::AttachmentUnsupported(_) | AgentError::InvalidAttachment(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_ATTACHMENT")
        }
        AgentError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR"),
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    }
    error_response(status, code, err.user_message())
}

fn busy() -> (StatusCode, Json<ErrorResponse>) {
    error_response(
        StatusCode::CONFLICT,
        "BUSY",
        "A message is already being processed.",
    )
}

fn lock_session(state: &AppState) -> ApiResult<MutexGuard<'_, ChatSession>> {
    state.session.try_lock().map_err(|_| busy())
}

/// Connected when `key` fits the provider's format, otherwise an error status
fn key_status(provider: ProviderProfile, key: &str) -> ConnectionStatus {
    if validate_key_format(provider.as_str(), key) {
        ConnectionStatus::Connected
    } else {
        ConnectionStatus::Error("Invalid key format".into())
    }
}

fn persist_analytics(state: &AppState, analytics: &UsageAnalytics) {
    if let Err(e) = save_analytics(state.store.as_ref(), analytics) {
        tracing::warn!(error = %e, "Failed to save analytics");
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let api_key_present = state.api_key().ok().flatten().is_some();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model: state.models.selected_model(),
        api_key_present,
    })
}

/// Selectable models
pub async fn list_models() -> Json<Vec<ModelInfo>> {
    Json(default_model_catalog())
}

/// Select (or clear) the model used from the next loop iteration on
pub async fn select_model(
    State(state): State<AppState>,
    Json(payload): Json<SelectModelRequest>,
) -> ApiResult<Json<SelectModelResponse>> {
    let name = payload.model.trim();
    if name.is_empty() {
        state.models.clear();
        return Ok(Json(SelectModelResponse {
            model: None,
            provider: None,
            status: ConnectionStatus::Disconnected,
        }));
    }

    let model = SelectedModel::from_name(name);
    state.models.select(model.clone());
    tracing::info!(model = %model.name, provider = %model.provider, "Model selected");

    let status = match state.api_key().map_err(|e| agent_error(&e))? {
        Some(key) => key_status(model.provider, &key),
        None => ConnectionStatus::Disconnected,
    };

    Ok(Json(SelectModelResponse {
        provider: Some(model.provider),
        model: Some(model),
        status,
    }))
}

/// Save the API key
pub async fn save_key(
    State(state): State<AppState>,
    Json(payload): Json<SaveKeyRequest>,
) -> ApiResult<Json<SaveKeyResponse>> {
    let key = payload.api_key.trim();
    if key.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "MISSING_API_KEY", "API key is empty"));
    }
    save_api_key(state.store.as_ref(), key).map_err(|e| agent_error(&e))?;

    let status = state
        .models
        .selected_model()
        .map_or(ConnectionStatus::Disconnected, |m| key_status(m.provider, key));

    Ok(Json(SaveKeyResponse { saved: true, status }))
}

/// Forget the saved API key
pub async fn clear_key(State(state): State<AppState>) -> ApiResult<StatusCode> {
    clear_api_key(state.store.as_ref()).map_err(|e| agent_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Attach a file to the next submit
pub async fn set_attachment(
    State(state): State<AppState>,
    Json(payload): Json<AttachmentRequest>,
) -> ApiResult<StatusCode> {
    let model = state
        .models
        .selected_model()
        .ok_or_else(|| agent_error(&AgentError::NoModelSelected))?;
    let file = UploadedAttachment::from_base64(payload.name, payload.mime_type, &payload.data)
        .map_err(|e| agent_error(&e))?;

    let mut session = lock_session(&state)?;
    session
        .attach(model.provider, file)
        .map_err(|e| agent_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_attachment(State(state): State<AppState>) -> ApiResult<StatusCode> {
    lock_session(&state)?.clear_attachment();
    Ok(StatusCode::NO_CONTENT)
}

/// Submit a message and wait for the whole loop
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let mut session = lock_session(&state)?;
    let mut charts = state.charts.subscribe();
    let renderer = RecordingRenderer::new();

    let result = submit(&state, &mut session, &payload.message, &renderer).await;

    let mut events = renderer.take();
    while let Ok(config) = charts.try_recv() {
        events.push(RenderEvent::Chart { config });
    }

    let (outcome, model_requests, error) = match result {
        Ok(SubmitOutcome::Ignored) => (Some("ignored"), 0, None),
        Ok(SubmitOutcome::Completed { model_requests }) => (Some("completed"), model_requests, None),
        Err(e) => (None, 0, Some(e.user_message())),
    };

    Ok(Json(ChatResponse {
        outcome,
        model_requests,
        history: session.history.turns().to_vec(),
        events,
        error,
    }))
}

/// Run one submit against the locked session and persist analytics after it
async fn submit(
    state: &AppState,
    session: &mut ChatSession,
    text: &str,
    renderer: &dyn MessageRenderer,
) -> agent_core::Result<SubmitOutcome> {
    let api_key = match state.api_key() {
        Ok(key) => key,
        Err(e) => {
            renderer.alert(&e.user_message());
            return Err(e);
        }
    };

    let result = state
        .agent
        .submit(session, text, api_key.as_deref(), renderer)
        .await;
    persist_analytics(state, &session.analytics);
    result
}

/// Start a new chat
pub async fn new_chat(State(state): State<AppState>) -> ApiResult<StatusCode> {
    let mut session = lock_session(&state)?;
    session.reset();
    persist_analytics(&state, &session.analytics);
    tracing::info!(session = %session.id.as_str(), "New chat");
    Ok(StatusCode::NO_CONTENT)
}

/// Download the conversation and analytics as JSON
pub async fn export_chat(State(state): State<AppState>) -> ApiResult<Response> {
    let session = lock_session(&state)?;
    let now = Utc::now();
    let export = ChatExport::new(
        state.models.selected_model(),
        &session.history,
        &session.analytics,
        session.started_at,
        now,
    );
    let body = export.to_json_pretty().map_err(|e| agent_error(&e))?;
    let disposition = format!("attachment; filename=\"{}\"", ChatExport::file_name(now));

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub async fn get_analytics(State(state): State<AppState>) -> ApiResult<Json<AnalyticsResponse>> {
    let session = lock_session(&state)?;
    Ok(Json(AnalyticsResponse::new(&session.analytics)))
}

pub async fn reset_analytics(State(state): State<AppState>) -> ApiResult<Json<AnalyticsResponse>> {
    let mut session = lock_session(&state)?;
    session.analytics.reset();
    persist_analytics(&state, &session.analytics);
    Ok(Json(AnalyticsResponse::new(&session.analytics)))
}

// ============================================================================
// WebSocket
// ============================================================================

/// Forwards renderer events to the socket task
struct ChannelRenderer {
    tx: mpsc::UnboundedSender<RenderEvent>,
}

impl MessageRenderer for ChannelRenderer {
    fn render(&self, event: RenderEvent) {
        let _ = self.tx.send(event);
    }
}

/// WebSocket streaming chat
pub async fn chat_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        // JSON `{"message": ...}` or the bare text
        let text = serde_json::from_str::<ChatRequest>(msg.as_str())
            .map_or_else(|_| msg.as_str().to_string(), |r| r.message);

        let Ok(mut session) = state.session.try_lock() else {
            let alert = RenderEvent::Alert {
                message: "A message is already being processed.".into(),
            };
            if send_event(&mut sender, &alert).await.is_err() {
                break;
            }
            continue;
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let renderer = ChannelRenderer { tx };
        let mut charts = state.charts.subscribe();
        let mut open = true;

        {
            let run = submit(&state, &mut session, &text, &renderer);
            tokio::pin!(run);

            loop {
                tokio::select! {
                    _ = &mut run => break,
                    Some(event) = rx.recv() => {
                        open &= send_event(&mut sender, &event).await.is_ok();
                    }
                    chart = charts.recv() => {
                        if let Some(config) = received_chart(chart) {
                            open &= send_event(&mut sender, &RenderEvent::Chart { config }).await.is_ok();
                        }
                    }
                }
            }
        }

        while let Ok(event) = rx.try_recv() {
            open &= send_event(&mut sender, &event).await.is_ok();
        }
        while let Ok(config) = charts.try_recv() {
            open &= send_event(&mut sender, &RenderEvent::Chart { config }).await.is_ok();
        }

        if !open {
            tracing::debug!("WebSocket closed during submit");
            break;
        }
    }
}

fn received_chart(chart: Result<Value, broadcast::error::RecvError>) -> Option<Value> {
    match chart {
        Ok(config) => Some(config),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "Chart receiver lagged");
            None
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}

async fn send_event<S>(sender: &mut S, event: &RenderEvent) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(event).unwrap_or_default();
    sender.send(Message::Text(text.into())).await
}
