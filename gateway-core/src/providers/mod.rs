//! Provider-protocol adapters (§4.D).
//!
//! An [`Adapter`] translates a canonical [`ChatRequest`] into a
//! provider-native `(url, headers, body)` triple and translates the
//! provider's response back into the canonical [`ChatResponse`]/
//! [`StreamChunk`] shape. Dispatch to the right adapter is by provider
//! name/URL substring (§4.D): `anthropic`/`claude` → Anthropic, `gemini`/
//! `google`/`googleapis.com` → Gemini, anything else → OpenAI-compatible
//! passthrough.

pub mod anthropic;
pub mod gemini;
pub mod http_client;
pub mod openai;

use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, StreamChunk};
use futures::Stream;
use reqwest::Client;
use std::pin::Pin;
use std::sync::Arc;

pub type StreamResult = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Where and how to reach a provider for one call: resolved base URL,
/// decrypted API key, and the upstream model name to request.
#[derive(Debug, Clone)]
pub struct ProviderTarget {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    /// Short dialect name, used for logging and tests.
    fn dialect(&self) -> &'static str;

    /// Builds the provider-native request triple for one call.
    fn build_request(
        &self,
        target: &ProviderTarget,
        request: &ChatRequest,
    ) -> Result<(String, reqwest::header::HeaderMap, serde_json::Value), ProviderError>;

    /// Parses a non-streaming provider response into the canonical shape.
    fn parse_response(
        &self,
        body: serde_json::Value,
        model: &str,
        request_id: &str,
    ) -> Result<ChatResponse, ProviderError>;

    /// Parses one SSE data-payload line into zero-or-one canonical chunks
    /// (some provider events, e.g. Anthropic's `ping`, carry nothing to
    /// emit).
    fn parse_stream_frame(
        &self,
        payload: &str,
        model: &str,
        request_id: &str,
    ) -> Result<Option<StreamChunk>, ProviderError>;

    /// Performs a non-streaming call end to end.
    async fn call(
        &self,
        client: &Client,
        target: &ProviderTarget,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let (url, headers, body) = self.build_request(target, request)?;
        let response = http_client::send_json(client, &url, headers, &body).await?;
        let request_id = ChatResponse::new_id();
        self.parse_response(response, &target.model, &request_id)
    }

    /// Performs a streaming call end to end, yielding canonical chunks.
    async fn stream(
        self: Arc<Self>,
        client: &Client,
        target: &ProviderTarget,
        request: &ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        let (url, headers, body) = self.build_request(target, request)?;
        let response = http_client::open_stream(client, &url, headers, &body).await?;
        let lines = http_client::sse_lines(response);
        let model = target.model.clone();
        let request_id = ChatResponse::new_id();
        let adapter = self.clone();

        Ok(Box::pin(async_stream::stream! {
            futures::pin_mut!(lines);
            while let Some(line) = futures::StreamExt::next(&mut lines).await {
                match line {
                    Ok(payload) => match adapter.parse_stream_frame(&payload, &model, &request_id) {
                        Ok(Some(chunk)) => yield Ok(chunk),
                        Ok(None) => continue,
                        Err(e) => yield Err(e),
                    },
                    Err(e) => yield Err(e),
                }
            }
        }))
    }
}

/// Dialect dispatch by provider name or base URL substring (§4.D).
pub fn adapter_for(provider_name: &str, base_url: &str) -> Arc<dyn Adapter> {
    let name = provider_name.to_ascii_lowercase();
    let url = base_url.to_ascii_lowercase();

    if name.contains("anthropic") || name.contains("claude") || url.contains("anthropic.com") {
        Arc::new(anthropic::AnthropicAdapter)
    } else if name.contains("gemini")
        || name.contains("google")
        || url.contains("googleapis.com")
    {
        Arc::new(gemini::GeminiAdapter)
    } else {
        Arc::new(openai::OpenAiAdapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_provider_name() {
        assert_eq!(adapter_for("anthropic", "https://example.com").dialect(), "anthropic");
        assert_eq!(adapter_for("google-gemini", "https://example.com").dialect(), "gemini");
        assert_eq!(adapter_for("my-openai-proxy", "https://example.com").dialect(), "openai");
    }

    #[test]
    fn dispatches_by_base_url_when_name_is_generic() {
        let adapter = adapter_for("primary", "https://api.anthropic.com");
        assert_eq!(adapter.dialect(), "anthropic");
        let adapter = adapter_for("primary", "https://generativelanguage.googleapis.com");
        assert_eq!(adapter.dialect(), "gemini");
    }
}
