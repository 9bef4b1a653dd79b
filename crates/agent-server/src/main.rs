//! agent-chat HTTP Server
//!
//! Axum host for the agent loop: REST endpoints for settings, submit and
//! export, plus a WebSocket that pushes renderer events as they happen.

mod handlers;
mod state;
mod store;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_runtime::{HttpTransport, RuntimeConfig};
use agent_tools::ToolsConfig;

use crate::handlers::{
    chat_handler, chat_stream_handler, clear_attachment, clear_key, export_chat, get_analytics,
    health_check, list_models, new_chat, reset_analytics, save_key, select_model, set_attachment,
};
use crate::state::AppState;
use crate::store::JsonFileStore;

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))

        // Settings
        .route("/api/model", post(select_model))
        .route("/api/key", post(save_key).delete(clear_key))
        .route("/api/attachment", post(set_attachment).delete(clear_attachment))

        // Chat
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", get(chat_stream_handler))
        .route("/api/chat/new", post(new_chat))
        .route("/api/export", get(export_chat))
        .route("/api/analytics", get(get_analytics).delete(reset_analytics))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = RuntimeConfig::from_env()?;
    let tools = ToolsConfig::from_env()?;
    if config.default_api_key.is_some() {
        tracing::info!("✓ Default API key configured");
    }
    if tools.search.api_key.is_empty() {
        tracing::warn!("⚠ GOOGLE_API_KEY not set - googleSearch will fail");
    }
    if tools.pipe.endpoint.is_none() {
        tracing::warn!("⚠ AI_PIPE_ENDPOINT not set - aiPipe returns mock data");
    }

    let transport = Arc::new(HttpTransport::from_config(&config)?);
    let store = Arc::new(JsonFileStore::from_env()?);
    let state = AppState::new(transport, &tools, config, store)?;

    tracing::info!("Registered {} tools:", state.agent.tools().len());
    for name in state.agent.tools().names() {
        tracing::info!("  • {}", name);
    }

    let app = router(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 agent-chat server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health            - Health check");
    tracing::info!("  GET  /api/models        - List available models");
    tracing::info!("  POST /api/model         - Select model");
    tracing::info!("  POST /api/chat          - Send message");
    tracing::info!("  GET  /api/chat/stream   - WebSocket streaming");
    tracing::info!("  GET  /api/export        - Download chat export");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::transport::{ScriptedReply, ScriptedTransport};
    use agent_core::{KeyValueStore, MemoryKeyValueStore};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_state(replies: Vec<ScriptedReply>) -> (AppState, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let state = AppState::new(
            transport.clone(),
            &ToolsConfig::default(),
            RuntimeConfig::default(),
            Arc::new(MemoryKeyValueStore::new()),
        )
        .unwrap();
        (state, transport)
    }

    async fn call(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router(state.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn sse(deltas: &[Value]) -> String {
        let mut body: String = deltas
            .iter()
            .map(|d| format!("data: {}\n\n", json!({"choices": [{"delta": d}]})))
            .collect();
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn select(state: &AppState, model: &str) -> Value {
        call(state, Method::POST, "/api/model", Some(json!({"model": model}))).await.1
    }

    #[tokio::test]
    async fn test_health_and_models() {
        let (state, _) = test_state(vec![]);

        let (status, body) = call(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["api_key_present"], false);
        assert!(body["model"].is_null());

        let (_, models) = call(&state, Method::GET, "/api/models", None).await;
        assert!(models.as_array().unwrap().iter().any(|m| m["id"] == "gemini-1.5-flash"));
    }

    #[tokio::test]
    async fn test_model_and_key_validation_status() {
        let (state, _) = test_state(vec![]);

        let selected = select(&state, "gpt-4o").await;
        assert_eq!(selected["provider"], "openai");
        assert_eq!(selected["status"]["status"], "disconnected");

        let (status, saved) = call(&state, Method::POST, "/api/key", Some(json!({"api_key": "not-a-key"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["status"], json!({"status": "error", "detail": "Invalid key format"}));

        call(&state, Method::POST, "/api/key", Some(json!({"api_key": " sk-valid "}))).await;
        assert_eq!(select(&state, "gpt-4o-mini").await["status"]["status"], "connected");

        let (status, _) = call(&state, Method::DELETE, "/api/key", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(call(&state, Method::GET, "/health", None).await.1["api_key_present"], false);
    }

    #[tokio::test]
    async fn test_chat_round_trip_persists_analytics() {
        let (state, transport) = test_state(vec![ScriptedReply::ok(json!({
            "candidates": [{"content": {"parts": [{"text": "**hi** there"}]}}]
        }))]);
        select(&state, "gemini-1.5-flash").await;
        call(&state, Method::POST, "/api/key", Some(json!({"api_key": "g-key"}))).await;

        let (status, body) = call(&state, Method::POST, "/api/chat", Some(json!({"message": "hello"}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "completed");
        assert!(body["error"].is_null());
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1]["content"], "**hi** there");
        assert!(body["events"].as_array().unwrap().iter().any(|e| {
            e["event"] == "message" && e["html"] == "<p><strong>hi</strong> there</p>"
        }));
        assert!(transport.requests()[0].url.ends_with("gemini-1.5-flash:generateContent?key=g-key"));

        let saved = state.store.get(agent_core::session::ANALYTICS_STORE_KEY).unwrap().unwrap();
        let analytics: Value = serde_json::from_str(&saved).unwrap();
        assert_eq!(analytics["apiCalls"], 1);
        assert_eq!(analytics["modelUsage"]["Gemini 1.5 Flash"], 1);

        let (_, analytics) = call(&state, Method::GET, "/api/analytics", None).await;
        assert_eq!(analytics["model_ranking"][0]["name"], "Gemini 1.5 Flash");
    }

    #[tokio::test]
    async fn test_chat_errors_are_reported() {
        let (state, _) = test_state(vec![]);

        let (_, body) = call(&state, Method::POST, "/api/chat", Some(json!({"message": "hello"}))).await;
        assert_eq!(body["error"], "Please select an LLM model first.");
        assert!(body["outcome"].is_null());

        select(&state, "claude-3-haiku-20240307").await;
        let (_, body) = call(&state, Method::POST, "/api/chat", Some(json!({"message": "hello"}))).await;
        assert_eq!(body["error"], "Please enter your Anthropic API key first.");
        assert_eq!(body["events"][0], json!({"event": "alert", "message": "Please enter your Anthropic API key first."}));
    }

    #[tokio::test]
    async fn test_chart_tool_call_reaches_events() {
        let chart = json!({
            "type": "pie",
            "data": {"labels": ["a", "b"], "datasets": [{"label": "share", "data": [1, 2]}]}
        });
        let arguments = json!({"chartConfig": chart}).to_string();
        let (state, _) = test_state(vec![
            ScriptedReply::stream([sse(&[json!({"tool_calls": [{"index": 0, "id": "call_1",
                "function": {"name": "createChart", "arguments": arguments}}]})])]),
            ScriptedReply::stream([sse(&[json!({"content": "Here is your chart."})])]),
        ]);
        select(&state, "gpt-4o").await;
        call(&state, Method::POST, "/api/key", Some(json!({"api_key": "sk-test"}))).await;

        let (_, body) = call(&state, Method::POST, "/api/chat", Some(json!({"message": "chart it"}))).await;

        assert_eq!(body["model_requests"], 2);
        let events = body["events"].as_array().unwrap();
        assert!(events.iter().any(|e| e["event"] == "chart" && e["config"] == chart));
        assert!(!events.iter().any(|e| e["role"] == "tool-output"));
        let history = body["history"].as_array().unwrap();
        assert_eq!(history[2]["content"], "Chart rendered: pie chart with 1 dataset(s).");
    }

    #[tokio::test]
    async fn test_attachment_rules() {
        let (state, _) = test_state(vec![]);
        let upload = json!({"name": "cat.png", "mime_type": "image/png", "data": "data:image/png;base64,aGVsbG8="});

        let (status, body) = call(&state, Method::POST, "/api/attachment", Some(upload.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "NO_MODEL");

        select(&state, "gpt-4o").await;
        let (status, body) = call(&state, Method::POST, "/api/attachment", Some(upload.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Image upload is only supported for Google Gemini models.");

        select(&state, "gemini-1.5-pro").await;
        let (status, _) = call(&state, Method::POST, "/api/attachment", Some(upload)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.session.lock().await.attachment.is_some());

        call(&state, Method::DELETE, "/api/attachment", None).await;
        assert!(state.session.lock().await.attachment.is_none());
    }

    #[tokio::test]
    async fn test_busy_session_conflicts() {
        let (state, _) = test_state(vec![]);
        let _guard = state.session.lock().await;

        let (status, body) = call(&state, Method::POST, "/api/chat", Some(json!({"message": "hi"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "BUSY");
        assert_eq!(call(&state, Method::POST, "/api/chat/new", None).await.0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_new_chat_and_export() {
        let (state, _) = test_state(vec![]);
        state.session.lock().await.history.push(agent_core::Turn::user("old"));
        select(&state, "gpt-4o").await;

        let response = router(state.clone())
            .oneshot(Request::get("/api/export").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment; filename=\"chat-export-"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let export: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(export["model"]["displayName"], "GPT-4o");
        assert_eq!(export["conversationHistory"].as_array().unwrap().len(), 1);

        let (status, _) = call(&state, Method::POST, "/api/chat/new", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.session.lock().await.history.is_empty());

        let (_, analytics) = call(&state, Method::DELETE, "/api/analytics", None).await;
        assert_eq!(analytics["analytics"]["apiCalls"], 0);
    }
}
