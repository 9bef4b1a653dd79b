//! LLM Provider Adapters
//!
//! All per-provider asymmetry lives here: endpoint, auth headers, request body
//! shape, response extraction and API-key format checks. Each provider is a
//! unit struct implementing [`RequestBuilder`], [`ResponseExtractor`] and
//! [`AuthStrategy`]; the orchestrator picks one [`ProviderAdapter`] per request
//! from the selected model and never branches on provider names itself.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{ProviderProfile, RequestContext};
//!
//! let adapter = ProviderProfile::from_model("claude-3-5-sonnet-latest").adapter();
//! let body = adapter.build_request_body(&ctx);
//! let headers = adapter.auth_headers(&api_key);
//! ```

use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::message::{ConversationHistory, Role, Turn};
use crate::session::UploadedAttachment;
use crate::tool::ToolDeclaration;

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const GOOGLE_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models/";
pub const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_MAX_TOKENS: u32 = 1000;

const GOOGLE_EMPTY_RESPONSE: &str = "No response from Gemini";
const ANTHROPIC_EMPTY_RESPONSE: &str = "No response from Claude";

/// The supported LLM backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderProfile {
    #[serde(rename = "openai")]
    OpenAi,
    Google,
    Anthropic,
}

impl ProviderProfile {
    /// Derive the provider from a model identifier by prefix.
    ///
    /// Anything unrecognised is treated as an OpenAI-compatible model.
    pub fn from_model(model: &str) -> Self {
        if model.starts_with("gemini-") {
            Self::Google
        } else if model.starts_with("claude-") {
            Self::Anthropic
        } else {
            Self::OpenAi
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Anthropic => "anthropic",
        }
    }

    /// Human-facing provider name
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Google => "Google",
            Self::Anthropic => "Anthropic",
        }
    }

    /// The adapter implementing this provider's wire format
    pub fn adapter(self) -> &'static dyn ProviderAdapter {
        match self {
            Self::OpenAi => &OpenAiAdapter,
            Self::Google => &GoogleAdapter,
            Self::Anthropic => &AnthropicAdapter,
        }
    }
}

impl std::fmt::Display for ProviderProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderProfile {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "google" => Ok(Self::Google),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(AgentError::Config(format!("Unknown provider: {other}"))),
        }
    }
}

/// Snapshot of the model chosen for one loop iteration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedModel {
    pub name: String,
    pub display_name: String,
    pub provider: ProviderProfile,
}

impl SelectedModel {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            provider: ProviderProfile::from_model(&name),
            display_name: display_name.into(),
            name,
        }
    }

    /// Select by name, taking the display name from the catalog when known
    pub fn from_name(name: &str) -> Self {
        let display_name = default_model_catalog()
            .into_iter()
            .find(|m| m.id == name)
            .map_or_else(|| name.to_string(), |m| m.name);
        Self::new(name, display_name)
    }
}

/// Information about a selectable model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: ProviderProfile,
    pub supports_vision: bool,
}

impl ModelInfo {
    fn new(id: &str, name: &str) -> Self {
        let provider = ProviderProfile::from_model(id);
        Self {
            id: id.into(),
            name: name.into(),
            provider,
            supports_vision: provider == ProviderProfile::Google,
        }
    }
}

/// Models offered for selection
pub fn default_model_catalog() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new("gpt-4o", "GPT-4o"),
        ModelInfo::new("gpt-4o-mini", "GPT-4o Mini"),
        ModelInfo::new("gpt-4-turbo", "GPT-4 Turbo"),
        ModelInfo::new("gemini-1.5-flash", "Gemini 1.5 Flash"),
        ModelInfo::new("gemini-1.5-pro", "Gemini 1.5 Pro"),
        ModelInfo::new("claude-3-5-sonnet-latest", "Claude 3.5 Sonnet"),
        ModelInfo::new("claude-3-haiku-20240307", "Claude 3 Haiku"),
    ]
}

/// Source of the currently selected model.
///
/// Read once per loop iteration, so a switch made while tools run takes effect
/// on the next model request.
pub trait ModelSelector: Send + Sync {
    fn selected_model(&self) -> Option<SelectedModel>;
}

/// Shared, clonable model selection handle
#[derive(Clone, Debug, Default)]
pub struct SharedModelSelection {
    inner: Arc<RwLock<Option<SelectedModel>>>,
}

impl SharedModelSelection {
    pub fn new(model: Option<SelectedModel>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(model)),
        }
    }

    pub fn select(&self, model: SelectedModel) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(model);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl ModelSelector for SharedModelSelection {
    fn selected_model(&self) -> Option<SelectedModel> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Everything a request body is built from
#[derive(Clone, Copy, Debug)]
pub struct RequestContext<'a> {
    pub model: &'a str,
    pub history: &'a ConversationHistory,
    pub tools: &'a [ToolDeclaration],
    pub attachment: Option<&'a UploadedAttachment>,
    pub stream: bool,
}

/// Builds provider-specific URLs and request bodies
pub trait RequestBuilder {
    /// Full URL for a request; only Google carries model and key in the URL
    fn request_url(&self, model: &str, api_key: &str) -> String;

    fn build_request_body(&self, ctx: &RequestContext<'_>) -> Value;
}

/// Extracts a normalized assistant turn from a buffered response
pub trait ResponseExtractor {
    fn extract_assistant_turn(&self, body: &Value) -> Result<Turn>;

    /// Provider-reported error message from a non-2xx body
    fn extract_error_message(&self, body: &Value) -> String {
        body.pointer("/error/message")
            .and_then(Value::as_str)
            .or_else(|| body.get("message").and_then(Value::as_str))
            .unwrap_or("Unknown error")
            .to_string()
    }
}

/// Authentication header shape and key-format sanity check
pub trait AuthStrategy {
    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)>;

    /// Client-side format check only; says nothing about authorization
    fn validate_key_format(&self, key: &str) -> bool;
}

/// One provider's complete capability set
pub trait ProviderAdapter: RequestBuilder + ResponseExtractor + AuthStrategy + Send + Sync {
    fn profile(&self) -> ProviderProfile;

    /// Whether responses are requested as an SSE stream
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Whether tool calls on assistant turns are dispatched
    fn dispatches_tools(&self) -> bool {
        false
    }
}

fn json_headers() -> Vec<(String, String)> {
    vec![("Content-Type".into(), "application/json".into())]
}

fn malformed(provider: ProviderProfile, detail: impl std::fmt::Display) -> AgentError {
    AgentError::Provider {
        provider,
        message: format!("Malformed response: {detail}"),
    }
}

// ============================================================================
// OpenAI
// ============================================================================

/// OpenAI chat completions
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenAiAdapter;

impl RequestBuilder for OpenAiAdapter {
    fn request_url(&self, _model: &str, _api_key: &str) -> String {
        OPENAI_ENDPOINT.into()
    }

    fn build_request_body(&self, ctx: &RequestContext<'_>) -> Value {
        let mut body = json!({
            "model": ctx.model,
            "messages": ctx.history,
        });

        // An empty `tools` array is rejected by the API
        if !ctx.tools.is_empty() {
            let tools: Vec<Value> = ctx.tools.iter().map(ToolDeclaration::to_openai).collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = json!("auto");
        }
        if ctx.stream {
            body["stream"] = json!(true);
        }
        body
    }
}

impl ResponseExtractor for OpenAiAdapter {
    fn extract_assistant_turn(&self, body: &Value) -> Result<Turn> {
        let message = body
            .pointer("/choices/0/message")
            .ok_or_else(|| malformed(ProviderProfile::OpenAi, "missing choices[0].message"))?;

        match serde_json::from_value::<Turn>(message.clone()) {
            Ok(turn @ Turn::Assistant { .. }) => Ok(turn),
            Ok(other) => Ok(Turn::assistant(other.content())),
            Err(e) => Err(malformed(ProviderProfile::OpenAi, e)),
        }
    }
}

impl AuthStrategy for OpenAiAdapter {
    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)> {
        let mut headers = json_headers();
        headers.push(("Authorization".into(), format!("Bearer {api_key}")));
        headers
    }

    fn validate_key_format(&self, key: &str) -> bool {
        key.starts_with("sk-")
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile::OpenAi
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn dispatches_tools(&self) -> bool {
        true
    }
}

// ============================================================================
// Google
// ============================================================================

/// Google Gemini `generateContent`
#[derive(Clone, Copy, Debug, Default)]
pub struct GoogleAdapter;

impl GoogleAdapter {
    const fn remap_role(role: Role) -> &'static str {
        match role {
            Role::Assistant => "model",
            _ => "user",
        }
    }
}

impl RequestBuilder for GoogleAdapter {
    fn request_url(&self, model: &str, api_key: &str) -> String {
        format!("{GOOGLE_ENDPOINT}{model}:generateContent?key={api_key}")
    }

    fn build_request_body(&self, ctx: &RequestContext<'_>) -> Value {
        // Tool-call metadata has no representation here; tool turns travel as plain user text.
        let attach_at = ctx.attachment.and(ctx.history.last_user_index());

        let contents: Vec<Value> = ctx
            .history
            .turns()
            .iter()
            .enumerate()
            .map(|(i, turn)| match (attach_at, ctx.attachment) {
                (Some(idx), Some(file)) if idx == i => json!({
                    "role": "user",
                    "parts": [
                        {"text": turn.content()},
                        {"inline_data": {"mime_type": file.mime_type, "data": file.base64_data}},
                    ],
                }),
                _ => json!({
                    "role": Self::remap_role(turn.role()),
                    "parts": [{"text": turn.content()}],
                }),
            })
            .collect();

        json!({ "contents": contents })
    }
}

impl ResponseExtractor for GoogleAdapter {
    fn extract_assistant_turn(&self, body: &Value) -> Result<Turn> {
        let text = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(GOOGLE_EMPTY_RESPONSE);
        Ok(Turn::assistant(text))
    }
}

impl AuthStrategy for GoogleAdapter {
    fn auth_headers(&self, _api_key: &str) -> Vec<(String, String)> {
        json_headers()
    }

    fn validate_key_format(&self, key: &str) -> bool {
        key.len() > 20
    }
}

impl ProviderAdapter for GoogleAdapter {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile::Google
    }
}

// ============================================================================
// Anthropic
// ============================================================================

/// Anthropic messages API
#[derive(Clone, Copy, Debug, Default)]
pub struct AnthropicAdapter;

impl RequestBuilder for AnthropicAdapter {
    fn request_url(&self, _model: &str, _api_key: &str) -> String {
        ANTHROPIC_ENDPOINT.into()
    }

    fn build_request_body(&self, ctx: &RequestContext<'_>) -> Value {
        let messages: Vec<Value> = ctx
            .history
            .turns()
            .iter()
            .filter(|t| t.role() != Role::System)
            .map(|t| {
                let role = match t.role() {
                    Role::Assistant => "assistant",
                    // Tool results appear as user context
                    _ => "user",
                };
                json!({"role": role, "content": t.content()})
            })
            .collect();

        let tools: Vec<Value> = ctx.tools.iter().map(ToolDeclaration::to_anthropic).collect();

        json!({
            "model": ctx.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "messages": messages,
            "tools": tools,
        })
    }
}

impl ResponseExtractor for AnthropicAdapter {
    fn extract_assistant_turn(&self, body: &Value) -> Result<Turn> {
        let text = body
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(ANTHROPIC_EMPTY_RESPONSE);
        Ok(Turn::assistant(text))
    }
}

impl AuthStrategy for AnthropicAdapter {
    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)> {
        let mut headers = json_headers();
        headers.push(("x-api-key".into(), api_key.into()));
        headers.push(("anthropic-version".into(), ANTHROPIC_VERSION.into()));
        headers
    }

    fn validate_key_format(&self, key: &str) -> bool {
        key.starts_with("sk-ant-")
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile::Anthropic
    }
}

// ============================================================================
// Free-function facade
// ============================================================================

/// Fixed endpoint; Google's is a base path completed by [`RequestBuilder::request_url`]
pub const fn endpoint(provider: ProviderProfile) -> &'static str {
    match provider {
        ProviderProfile::OpenAi => OPENAI_ENDPOINT,
        ProviderProfile::Google => GOOGLE_ENDPOINT,
        ProviderProfile::Anthropic => ANTHROPIC_ENDPOINT,
    }
}

pub fn auth_headers(provider: ProviderProfile, api_key: &str) -> Vec<(String, String)> {
    provider.adapter().auth_headers(api_key)
}

/// Non-streaming request body for `provider`
pub fn build_request_body(
    provider: ProviderProfile,
    model: &str,
    history: &ConversationHistory,
    tools: &[ToolDeclaration],
    attachment: Option<&UploadedAttachment>,
) -> Value {
    provider.adapter().build_request_body(&RequestContext {
        model,
        history,
        tools,
        attachment,
        stream: false,
    })
}

pub fn extract_assistant_turn(provider: ProviderProfile, body: &Value) -> Result<Turn> {
    provider.adapter().extract_assistant_turn(body)
}

/// Key format check by provider name; unknown providers only need length > 10
pub fn validate_key_format(provider: &str, key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    match provider.parse::<ProviderProfile>() {
        Ok(profile) => profile.adapter().validate_key_format(key),
        Err(_) => key.len() > 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCallRequest;
    use crate::tool::ParameterSchema;

    fn search_declaration() -> ToolDeclaration {
        ToolDeclaration {
            name: "googleSearch".into(),
            description: "Search".into(),
            parameters: vec![ParameterSchema::new("query", "string", "The query", true)],
        }
    }

    #[test]
    fn test_provider_from_model() {
        assert_eq!(ProviderProfile::from_model("gpt-4o"), ProviderProfile::OpenAi);
        assert_eq!(ProviderProfile::from_model("gemini-1.5-pro"), ProviderProfile::Google);
        assert_eq!(ProviderProfile::from_model("claude-3-haiku"), ProviderProfile::Anthropic);
        assert_eq!(ProviderProfile::from_model("mistral-large"), ProviderProfile::OpenAi);
    }

    #[test]
    fn test_validate_key_format() {
        assert!(validate_key_format("openai", "sk-abc"));
        assert!(!validate_key_format("openai", "abc"));
        assert!(validate_key_format("anthropic", "sk-ant-xyz"));
        assert!(!validate_key_format("anthropic", "sk-xyz"));
        assert!(validate_key_format("google", "AIzaSyA-123456789012345"));
        assert!(!validate_key_format("google", "short"));
        assert!(validate_key_format("mystery", "12345678901"));
        assert!(!validate_key_format("mystery", "1234567890"));
        assert!(!validate_key_format("openai", ""));
    }

    #[test]
    fn test_google_body_without_attachment() {
        let history = ConversationHistory::from(vec![Turn::user("hi"), Turn::assistant("yo")]);
        let body = build_request_body(ProviderProfile::Google, "gemini-1.5-flash", &history, &[], None);

        assert_eq!(
            body,
            json!({"contents": [
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "model", "parts": [{"text": "yo"}]},
            ]})
        );
    }

    #[test]
    fn test_google_body_with_attachment_on_last_user_turn() {
        let history = ConversationHistory::from(vec![
            Turn::user("first"),
            Turn::assistant("ok"),
            Turn::user("what is this?"),
        ]);
        let file = UploadedAttachment {
            name: "cat.png".into(),
            mime_type: "image/png".into(),
            base64_data: "aGVsbG8=".into(),
        };
        let body = build_request_body(
            ProviderProfile::Google,
            "gemini-1.5-flash",
            &history,
            &[search_declaration()],
            Some(&file),
        );

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["parts"], json!([{"text": "first"}]));
        assert_eq!(
            contents[2]["parts"],
            json!([
                {"text": "what is this?"},
                {"inline_data": {"mime_type": "image/png", "data": "aGVsbG8="}},
            ])
        );
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_openai_body_shape() {
        let history = ConversationHistory::from(vec![Turn::user("hi")]);
        let tools = [search_declaration()];
        let adapter = ProviderProfile::OpenAi.adapter();
        let body = adapter.build_request_body(&RequestContext {
            model: "gpt-4o",
            history: &history,
            tools: &tools,
            attachment: None,
            stream: true,
        });

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"], json!([{"role": "user", "content": "hi"}]));
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "googleSearch");
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["query"]));

        let plain = build_request_body(ProviderProfile::OpenAi, "gpt-4o", &history, &[], None);
        assert!(plain.get("tools").is_none());
        assert!(plain.get("stream").is_none());
    }

    #[test]
    fn test_anthropic_body_shape() {
        let history = ConversationHistory::from(vec![
            Turn::system("be nice"),
            Turn::user("hi"),
            Turn::assistant_with_tools("", vec![ToolCallRequest::new("a", "googleSearch", "{}")]),
            Turn::tool("a", "googleSearch", "[]"),
        ]);
        let body = build_request_body(
            ProviderProfile::Anthropic,
            "claude-3-haiku-20240307",
            &history,
            &[search_declaration()],
            None,
        );

        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(
            body["messages"],
            json!([
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": ""},
                {"role": "user", "content": "[]"},
            ])
        );
        assert_eq!(body["tools"][0]["name"], "googleSearch");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_auth_headers() {
        let openai = auth_headers(ProviderProfile::OpenAi, "sk-1");
        assert!(openai.contains(&("Authorization".into(), "Bearer sk-1".into())));

        let google = auth_headers(ProviderProfile::Google, "key");
        assert_eq!(google.len(), 1);

        let anthropic = auth_headers(ProviderProfile::Anthropic, "sk-ant-1");
        assert!(anthropic.contains(&("x-api-key".into(), "sk-ant-1".into())));
        assert!(anthropic.contains(&("anthropic-version".into(), ANTHROPIC_VERSION.into())));
    }

    #[test]
    fn test_google_url_carries_model_and_key() {
        let url = ProviderProfile::Google.adapter().request_url("gemini-1.5-pro", "KEY");
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent?key=KEY"
        );
        assert_eq!(ProviderProfile::OpenAi.adapter().request_url("gpt-4o", "KEY"), OPENAI_ENDPOINT);
    }

    #[test]
    fn test_extract_assistant_turns() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
        assert_eq!(
            extract_assistant_turn(ProviderProfile::OpenAi, &openai).unwrap(),
            Turn::assistant("hello")
        );

        let google = json!({"candidates": [{"content": {"parts": [{"text": "hi there"}]}}]});
        assert_eq!(
            extract_assistant_turn(ProviderProfile::Google, &google).unwrap().content(),
            "hi there"
        );
        assert_eq!(
            extract_assistant_turn(ProviderProfile::Google, &json!({})).unwrap().content(),
            GOOGLE_EMPTY_RESPONSE
        );

        let anthropic = json!({"content": [{"type": "text", "text": "bonjour"}]});
        assert_eq!(
            extract_assistant_turn(ProviderProfile::Anthropic, &anthropic).unwrap().content(),
            "bonjour"
        );
        assert_eq!(
            extract_assistant_turn(ProviderProfile::Anthropic, &json!({"content": []}))
                .unwrap()
                .content(),
            ANTHROPIC_EMPTY_RESPONSE
        );

        assert!(extract_assistant_turn(ProviderProfile::OpenAi, &json!({"choices": []})).is_err());
    }

    #[test]
    fn test_error_message_extraction() {
        let adapter = ProviderProfile::OpenAi.adapter();
        assert_eq!(
            adapter.extract_error_message(&json!({"error": {"message": "Incorrect API key"}})),
            "Incorrect API key"
        );
        assert_eq!(adapter.extract_error_message(&json!({"message": "flat"})), "flat");
        assert_eq!(adapter.extract_error_message(&json!(null)), "Unknown error");
    }

    #[test]
    fn test_shared_selection() {
        let selection = SharedModelSelection::default();
        assert!(selection.selected_model().is_none());

        selection.select(SelectedModel::from_name("gpt-4o"));
        let model = selection.selected_model().unwrap();
        assert_eq!(model.display_name, "GPT-4o");
        assert_eq!(model.provider, ProviderProfile::OpenAi);

        let custom = SelectedModel::from_name("claude-custom");
        assert_eq!(custom.display_name, "claude-custom");
        assert_eq!(custom.provider, ProviderProfile::Anthropic);
    }
}
