//! reqwest Transport
//!
//! Implementation of `Transport` over a shared `reqwest::Client`.

use std::time::Duration;

use agent_core::error::{AgentError, Result};
use agent_core::transport::{HttpRequest, HttpResponse, HttpStreamResponse, Transport};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use crate::config::RuntimeConfig;

/// HTTP transport for provider calls
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport; `timeout` of `None` never times out
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        Self::new(config.http_timeout)
    }

    /// Wrap an existing client
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: &HttpRequest) -> Result<reqwest::Response> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        tracing::debug!(provider = %request.provider, url = %redact(&request.url), "POST");
        builder
            .body(serde_json::to_vec(&request.body)?)
            .send()
            .await
            .map_err(|e| transport_error(request, &e))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(request, &e))?;

        let body = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(status, error = %e, "Response body is not JSON");
            Value::Null
        });
        Ok(HttpResponse { status, body })
    }

    async fn post_stream(&self, request: &HttpRequest) -> Result<HttpStreamResponse> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let provider = request.provider;

        let body = response.bytes_stream().map(move |chunk| {
            chunk.map(|bytes| bytes.to_vec()).map_err(|e| AgentError::Transport {
                provider,
                message: e.to_string(),
            })
        });
        Ok(HttpStreamResponse {
            status,
            body: Box::pin(body),
        })
    }
}

fn transport_error(request: &HttpRequest, err: &reqwest::Error) -> AgentError {
    tracing::warn!(provider = %request.provider, error = %err, "Transport failure");
    AgentError::Transport {
        provider: request.provider,
        message: format!("Failed to fetch: {err}"),
    }
}

/// Hide query-string credentials in logs
fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::provider::ProviderProfile;
    use futures::StreamExt;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut raw = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|line| {
                            let line = line.to_lowercase();
                            line.strip_prefix("content-length:")
                                .and_then(|v| v.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (format!("http://{addr}/v1/chat"), handle)
    }

    fn request(url: String) -> HttpRequest {
        HttpRequest {
            provider: ProviderProfile::OpenAi,
            url,
            headers: vec![
                ("Content-Type".into(), "application/json".into()),
                ("Authorization".into(), "Bearer sk-test".into()),
            ],
            body: json!({"model": "gpt-4o"}),
        }
    }

    #[tokio::test]
    async fn test_post_json() {
        let body = r#"{"choices":[]}"#;
        let (url, server) = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ))
        .await;

        let transport = HttpTransport::new(Some(Duration::from_secs(5))).unwrap();
        let response = transport.post_json(&request(url)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"choices": []}));

        let raw = server.await.unwrap().to_lowercase();
        assert!(raw.starts_with("post /v1/chat"));
        assert!(raw.contains("authorization: bearer sk-test"));
        assert_eq!(raw.matches("content-type: application/json").count(), 1);
        assert!(raw.ends_with(r#"{"model":"gpt-4o"}"#));
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let body = r#"{"error":{"message":"Incorrect API key provided"}}"#;
        let (url, _server) = serve_once(format!(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ))
        .await;

        let transport = HttpTransport::new(None).unwrap();
        let response = transport.post_json(&request(url)).await.unwrap();
        assert!(!response.is_success());
        assert_eq!(response.body["error"]["message"], "Incorrect API key provided");
    }

    #[tokio::test]
    async fn test_post_stream() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
        let (url, _server) = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{sse}"
        ))
        .await;

        let transport = HttpTransport::new(None).unwrap();
        let response = transport.post_stream(&request(url)).await.unwrap();
        assert!(response.is_success());

        let mut body = response.body;
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend(chunk.unwrap());
        }
        assert_eq!(String::from_utf8(collected).unwrap(), sse);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(Some(Duration::from_secs(2))).unwrap();
        let err = transport
            .post_json(&request(format!("http://{addr}/")))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Transport { .. }));
        assert!(err.to_string().contains("Failed to fetch"));
    }

    #[test]
    fn test_redact_query() {
        assert_eq!(redact("https://x/models/m:generateContent?key=secret"), "https://x/models/m:generateContent");
        assert_eq!(redact("https://x/v1"), "https://x/v1");
    }
}
