//! Transport session.
//!
//! One HTTP request per user turn. The request is a multipart form carrying
//! the new message, the prior history as JSON, the model options and the
//! staged files; the response body is handed back as a byte stream for the
//! frame decoder.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::attachments::StagedAttachment;
use crate::config::{ClientConfig, ModelConfig, COMPLETE_PATH, HEALTH_PATH, STREAM_PATH};
use crate::conversation::HistoryEntry;
use crate::error::{Result, TransportError};

/// Raw response body chunks, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Everything sent to the backend for one turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Text of the current turn; may be empty.
    pub message: String,
    /// Prior turns, attachments excluded.
    pub history: Vec<HistoryEntry>,
    /// Files sent with this turn.
    pub files: Vec<StagedAttachment>,
    /// Model options.
    pub model: ModelConfig,
}

/// Token accounting returned by the non-streaming endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the rendered prompt.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens generated.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Wall-clock generation time.
    #[serde(default)]
    pub latency_ms: u64,
}

/// Response of the non-streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Full answer text.
    pub answer: String,
    /// Token accounting.
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    ok: bool,
}

/// Opens a streamed chat request.
///
/// The HTTP implementation is [`HttpTransport`]; tests substitute scripted
/// byte streams.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue the request and return the response body as a byte stream.
    ///
    /// # Errors
    ///
    /// Fails before any body is read: connection failures, unreadable
    /// attachments and non-success responses (with the raw body as detail).
    /// Failures while reading the stream are yielded by the stream itself.
    async fn open(&self, request: ChatRequest) -> Result<ByteStream>;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// `reqwest`-backed transport for the inference backend.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Create a transport for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Query the backend's liveness endpoint.
    ///
    /// The whole request is bounded by the configured health timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or too slow, answers with a
    /// non-success status, or sends an unparseable body.
    pub async fn health(&self) -> Result<bool> {
        let url = self.config.endpoint(HEALTH_PATH);
        let response = self
            .client
            .get(&url)
            .timeout(self.config.health_timeout())
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: HealthResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Parse(e.to_string()))?;
        Ok(body.ok)
    }

    /// Run one turn against the non-streaming endpoint.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ChatTransport::open`], plus a parse error if
    /// the answer body is not the expected JSON.
    pub async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = self.config.endpoint(COMPLETE_PATH);
        let form = build_form(request).await?;

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::Parse(e.to_string()))
    }

    /// Consume a non-success response into a status error carrying its body.
    async fn status_error(response: reqwest::Response) -> TransportError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status, body_len = body.len(), "backend returned error status");
        TransportError::Status { status, body }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: ChatRequest) -> Result<ByteStream> {
        let url = self.config.endpoint(STREAM_PATH);
        tracing::debug!(
            %url,
            message_len = request.message.len(),
            history = request.history.len(),
            files = request.files.len(),
            "opening chat stream"
        );
        let form = build_form(request).await?;

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TransportError::Read(e.to_string()))
            })
            .boxed();
        Ok(stream)
    }
}

/// Assemble the multipart body shared by both chat endpoints.
///
/// Field order: `message`, `history`, the model options, then one `files`
/// part per attachment.
async fn build_form(request: ChatRequest) -> Result<Form> {
    let history = serde_json::to_string(&request.history)
        .map_err(|e| TransportError::Request(e.to_string()))?;

    let mut form = Form::new()
        .text("message", request.message)
        .text("history", history);
    for (name, value) in request.model.form_fields() {
        form = form.text(name, value);
    }

    for file in request.files {
        let bytes = file
            .source
            .read()
            .await
            .map_err(|source| TransportError::Attachment {
                name: file.name.clone(),
                source,
            })?;
        let part = Part::bytes(bytes)
            .file_name(file.name)
            .mime_str(&file.mime_type)
            .map_err(|e| TransportError::Request(e.to_string()))?;
        form = form.part("files", part);
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_tolerates_missing_usage() {
        let response: ChatResponse = serde_json::from_str(r#"{"answer":"hi"}"#).unwrap();
        assert_eq!(response.answer, "hi");
        assert_eq!(response.usage, Usage::default());
    }

    #[test]
    fn chat_response_parses_usage() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"answer":"ok","usage":{"prompt_tokens":12,"completion_tokens":3,"latency_ms":250}}"#,
        )
        .unwrap();
        assert_eq!(response.usage.prompt_tokens, 12);
        assert_eq!(response.usage.completion_tokens, 3);
        assert_eq!(response.usage.latency_ms, 250);
    }

    #[tokio::test]
    async fn build_form_fails_on_unreadable_attachment() {
        let request = ChatRequest {
            message: "look".to_string(),
            history: Vec::new(),
            files: vec![StagedAttachment {
                source: crate::attachments::FileHandle::Path("/nonexistent/valor/cat.png".into()),
                name: "cat.png".to_string(),
                mime_type: "image/png".to_string(),
            }],
            model: ModelConfig::default(),
        };
        let err = build_form(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Attachment { ref name, .. } if name == "cat.png"));
    }

    #[test]
    fn new_uses_config() {
        let config = ClientConfig {
            base_url: "http://backend:9000/".to_string(),
            ..ClientConfig::default()
        };
        let transport = HttpTransport::new(config).unwrap();
        assert_eq!(
            transport.config().endpoint(STREAM_PATH),
            "http://backend:9000/api/v1/chat/stream"
        );
    }
}
