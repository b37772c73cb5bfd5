//! OpenAI-compatible passthrough adapter (§4.D.1) — the default dialect.
//! Builds the request body directly from [`ChatRequest`]'s own field
//! shape and trusts the upstream response to already be OpenAI-shaped, so
//! this adapter mostly re-stamps the canonical id and passes the rest
//! through untouched.

use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, StreamChunk};
use crate::providers::{Adapter, ProviderTarget};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

pub struct OpenAiAdapter;

#[async_trait::async_trait]
impl Adapter for OpenAiAdapter {
    fn dialect(&self) -> &'static str {
        "openai"
    }

    fn build_request(
        &self,
        target: &ProviderTarget,
        request: &ChatRequest,
    ) -> Result<(String, HeaderMap, serde_json::Value), ProviderError> {
        let url = format!("{}/v1/chat/completions", target.base_url.trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", target.api_key))
            .map_err(|_| ProviderError::Http {
                status: 0,
                message: "API key contains invalid header characters".to_string(),
            })?;
        headers.insert(AUTHORIZATION, auth);

        let mut body = serde_json::to_value(request).map_err(ProviderError::Decode)?;
        body["model"] = serde_json::Value::String(target.model.clone());

        Ok((url, headers, body))
    }

    fn parse_response(
        &self,
        mut body: serde_json::Value,
        model: &str,
        request_id: &str,
    ) -> Result<ChatResponse, ProviderError> {
        if body.get("id").is_none() {
            body["id"] = serde_json::Value::String(request_id.to_string());
        }
        if body.get("model").is_none() {
            body["model"] = serde_json::Value::String(model.to_string());
        }
        serde_json::from_value(body).map_err(ProviderError::Decode)
    }

    fn parse_stream_frame(
        &self,
        payload: &str,
        _model: &str,
        _request_id: &str,
    ) -> Result<Option<StreamChunk>, ProviderError> {
        let chunk: StreamChunk = serde_json::from_str(payload).map_err(ProviderError::Decode)?;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    fn target() -> ProviderTarget {
        ProviderTarget {
            base_url: "https://api.openai.com".to_string(),
            api_key: "sk-test".to_string(),
            model: "gpt-4o".to_string(),
        }
    }

    #[test]
    fn build_request_targets_chat_completions_endpoint() {
        let adapter = OpenAiAdapter;
        let request = ChatRequest {
            model: "route-name".to_string(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let (url, headers, body) = adapter.build_request(&target(), &request).unwrap();
        assert_eq!(url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
        assert_eq!(body["model"], "gpt-4o");
    }

    #[test]
    fn parse_response_fills_missing_id() {
        let adapter = OpenAiAdapter;
        let body = serde_json::json!({
            "object": "chat.completion",
            "created": 1,
            "choices": [],
        });
        let response = adapter.parse_response(body, "gpt-4o", "chatcmpl-abc").unwrap();
        assert_eq!(response.id, "chatcmpl-abc");
        assert_eq!(response.model, "gpt-4o");
    }
}
