//! Platform API client: request building, transport checks and stream setup.

mod types;

pub use types::{AgentChatRequest, ChatMessage, ChatRequest};

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::Instrument;

use crate::config::{ClientConfig, PlatformConfig};
use crate::error::SdkError;
use crate::stream::{
    agent_event_stream, chat_event_stream, collect_agent, collect_chat, AgentReply, BlockGrammar,
    ChatCompletion, DecoderOptions, EventStream, LineGrammar,
};
use crate::transport::{body_stream, ensure_success, BodyStream, HttpTransport};

use self::types::ChatStreamBody;

const X_APP_ID: HeaderName = HeaderName::from_static("x-app-id");
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const EVENT_STREAM: HeaderValue = HeaderValue::from_static("text/event-stream");
const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

const CHAT_COMPLETIONS_SEGMENTS: [&str; 4] = ["api", "v1", "chat", "completions"];

/// Event stream over a chat completion response.
pub type ChatEventStream = EventStream<BodyStream, LineGrammar>;
/// Event stream over an agent chat response.
pub type AgentEventStream = EventStream<BodyStream, BlockGrammar>;

/// Client for the platform's streaming chat endpoints.
#[derive(Clone)]
pub struct PlatformClient {
    base_url: url::Url,
    default_model: Option<String>,
    headers: http::HeaderMap,
    decoder_options: DecoderOptions,
    transport: Arc<HttpTransport>,
}

impl PlatformClient {
    /// Build a client from the full SDK configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] when the base URL or credentials cannot
    /// be turned into request headers.
    pub fn from_config(config: &ClientConfig) -> Result<Self, SdkError> {
        Self::new(
            &config.platform,
            config.stream.decoder_options(),
            Arc::new(HttpTransport::new(&config.http)),
        )
    }

    /// # Errors
    ///
    /// Returns [`SdkError::Config`] when the base URL or credentials cannot
    /// be turned into request headers.
    pub fn new(
        platform: &PlatformConfig,
        decoder_options: DecoderOptions,
        transport: Arc<HttpTransport>,
    ) -> Result<Self, SdkError> {
        let base_url = url::Url::parse(&platform.base_url)
            .map_err(|e| SdkError::Config(format!("Invalid platform base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SdkError::Config(
                "Platform base URL cannot be used as a base".to_string(),
            ));
        }
        Ok(Self {
            base_url,
            default_model: platform.default_model.clone(),
            headers: build_platform_headers(platform)?,
            decoder_options,
            transport,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    /// Open a streaming chat completion.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::InvalidRequest`] for an empty message list,
    /// [`SdkError::Transport`] when the request cannot be sent and
    /// [`SdkError::Upstream`] when the platform answers with a non-success
    /// status. No events are produced in any of these cases.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatEventStream, SdkError> {
        if request.messages.is_empty() {
            return Err(SdkError::InvalidRequest(
                "chat request needs at least one message".to_string(),
            ));
        }
        let mut request = request.clone();
        if request.model.is_none() {
            request.model.clone_from(&self.default_model);
        }
        let body = serde_json::to_vec(&ChatStreamBody {
            request: &request,
            stream: true,
        })
        .map_err(|e| SdkError::Internal(format!("Failed to encode chat request: {e}")))?;

        let url = self.endpoint(CHAT_COMPLETIONS_SEGMENTS)?;
        let body = self.open_stream(&url, Bytes::from(body)).await?;
        Ok(chat_event_stream(body, self.decoder_options))
    }

    /// Open a streaming chat with an agent/character.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::InvalidRequest`] for a blank agent id or message,
    /// [`SdkError::Transport`] when the request cannot be sent and
    /// [`SdkError::Upstream`] when the platform answers with a non-success
    /// status.
    pub async fn stream_agent_chat(
        &self,
        agent_id: &str,
        request: &AgentChatRequest,
    ) -> Result<AgentEventStream, SdkError> {
        if agent_id.trim().is_empty() {
            return Err(SdkError::InvalidRequest("agent id cannot be empty".to_string()));
        }
        if request.message.trim().is_empty() {
            return Err(SdkError::InvalidRequest(
                "agent message cannot be empty".to_string(),
            ));
        }
        let body = serde_json::to_vec(request)
            .map_err(|e| SdkError::Internal(format!("Failed to encode agent request: {e}")))?;

        let url = self.endpoint(["api", "v1", "agents", agent_id, "chat", "stream"])?;
        let body = self.open_stream(&url, Bytes::from(body)).await?;
        Ok(agent_event_stream(body, self.decoder_options))
    }

    /// Stream a chat completion and assemble the full reply.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::stream_chat`] or from the stream itself.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, SdkError> {
        collect_chat(self.stream_chat(request).await?).await
    }

    /// Stream an agent chat and assemble the full reply.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::stream_agent_chat`], stream-level
    /// errors, and [`SdkError::Application`] when the agent reports an error.
    pub async fn agent_chat(
        &self,
        agent_id: &str,
        request: &AgentChatRequest,
    ) -> Result<AgentReply, SdkError> {
        collect_agent(self.stream_agent_chat(agent_id, request).await?).await
    }

    fn endpoint<'a, I>(&self, segments: I) -> Result<url::Url, SdkError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SdkError::Config("Platform base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn open_stream(&self, url: &url::Url, body: Bytes) -> Result<BodyStream, SdkError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut headers = self.headers.clone();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert(X_REQUEST_ID, value);
        }

        let span = tracing::debug_span!("platform_stream", request_id = %request_id, path = url.path());
        async {
            tracing::debug!("opening platform stream");
            let response = self.transport.send_stream(url, &headers, body).await?;
            let response = ensure_success(response).await?;
            Ok::<_, SdkError>(body_stream(response))
        }
        .instrument(span)
        .await
    }
}

fn build_platform_headers(platform: &PlatformConfig) -> Result<http::HeaderMap, SdkError> {
    let mut headers = http::HeaderMap::with_capacity(4);
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", platform.api_key))
        .map_err(|_| SdkError::Config("API key contains invalid header characters".to_string()))?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, APPLICATION_JSON);
    headers.insert(ACCEPT, EVENT_STREAM);
    if let Some(app_id) = platform.app_id.as_deref() {
        let value = HeaderValue::from_str(app_id)
            .map_err(|_| SdkError::Config("App id contains invalid header characters".to_string()))?;
        headers.insert(X_APP_ID, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;

    fn platform(base_url: &str) -> PlatformConfig {
        PlatformConfig {
            base_url: base_url.to_string(),
            api_key: "sk-test".to_string(),
            app_id: Some("demo-app".to_string()),
            default_model: None,
        }
    }

    fn client(base_url: &str) -> PlatformClient {
        PlatformClient::new(
            &platform(base_url),
            DecoderOptions::default(),
            Arc::new(HttpTransport::new(&HttpConfig::default())),
        )
        .unwrap()
    }

    #[test]
    fn test_platform_headers() {
        let headers = build_platform_headers(&platform("https://api.example.com")).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-test");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(headers[ACCEPT], "text/event-stream");
        assert_eq!(headers[X_APP_ID], "demo-app");
    }

    #[test]
    fn test_invalid_api_key_header() {
        let mut config = platform("https://api.example.com");
        config.api_key = "sk\ntest".to_string();
        assert!(matches!(
            build_platform_headers(&config),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_under_base_path() {
        let client = client("https://api.example.com/tenant/");
        let url = client.endpoint(CHAT_COMPLETIONS_SEGMENTS).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/tenant/api/v1/chat/completions");

        let url = client
            .endpoint(["api", "v1", "agents", "a b/c", "chat", "stream"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/tenant/api/v1/agents/a%20b%2Fc/chat/stream"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = PlatformClient::new(
            &platform("mailto:ops@example.com"),
            DecoderOptions::default(),
            Arc::new(HttpTransport::new(&HttpConfig::default())),
        );
        assert!(matches!(result, Err(SdkError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_requests_fail_before_network() {
        let client = client("http://127.0.0.1:9");
        let err = client.stream_chat(&ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, SdkError::InvalidRequest(_)));

        let err = client
            .stream_agent_chat(" ", &AgentChatRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::InvalidRequest(_)));
    }
}
