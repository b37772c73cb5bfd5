//! Google Gemini `generateContent`/`streamGenerateContent` adapter (§4.D.3).
//!
//! System messages become `systemInstruction`; everything else becomes a
//! `contents` turn with `role` remapped (`assistant` → `model`, anything
//! else → `user`). Sampling parameters nest under `generationConfig`. The
//! API key travels as a `key` query parameter rather than a header.

use crate::error::ProviderError;
use crate::models::{
    ChatRequest, ChatResponse, Choice, Delta, Message, Role, StreamChoice, StreamChunk, Usage,
};
use crate::providers::{Adapter, ProviderTarget};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

pub struct GeminiAdapter;

fn map_finish_reason(reason: &str) -> String {
    match reason {
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" => "content_filter",
        _ => "stop",
    }
    .to_string()
}

#[async_trait::async_trait]
impl Adapter for GeminiAdapter {
    fn dialect(&self) -> &'static str {
        "gemini"
    }

    fn build_request(
        &self,
        target: &ProviderTarget,
        request: &ChatRequest,
    ) -> Result<(String, HeaderMap, Value), ProviderError> {
        let base = target.base_url.trim_end_matches('/');
        let url = if request.is_streaming() {
            format!(
                "{base}/v1/models/{}:streamGenerateContent?alt=sse&key={}",
                target.model, target.api_key
            )
        } else {
            format!(
                "{base}/v1/models/{}:generateContent?key={}",
                target.model, target.api_key
            )
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut contents = Vec::new();
        let mut system_instruction: Option<Value> = None;
        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    system_instruction = Some(json!({ "parts": [{ "text": msg.content }] }));
                }
                _ => {
                    let role = if matches!(msg.role, Role::Assistant) {
                        "model"
                    } else {
                        "user"
                    };
                    contents.push(json!({ "role": role, "parts": [{ "text": msg.content }] }));
                }
            }
        }

        let mut body = json!({ "contents": contents });
        if let Some(system) = system_instruction {
            body["systemInstruction"] = system;
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(t) = request.temperature {
            generation_config.insert("temperature".to_string(), json!(t));
        }
        if let Some(p) = request.top_p {
            generation_config.insert("topP".to_string(), json!(p));
        }
        if let Some(m) = request.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(m));
        }
        if let Some(stop) = &request.stop {
            generation_config.insert("stopSequences".to_string(), json!(stop.clone().into_vec()));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        Ok((url, headers, body))
    }

    fn parse_response(
        &self,
        body: Value,
        model: &str,
        request_id: &str,
    ) -> Result<ChatResponse, ProviderError> {
        let candidate = body
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first());

        let content = candidate
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<String>()
            })
            .unwrap_or_default();

        let finish_reason = candidate
            .and_then(|c| c.get("finishReason"))
            .and_then(|r| r.as_str())
            .map(map_finish_reason);

        let usage = body.get("usageMetadata").map(|u| {
            let prompt = u
                .get("promptTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            let completion = u
                .get("candidatesTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            let total = u
                .get("totalTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or((prompt + completion) as u64) as u32;
            Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: total,
            }
        });

        Ok(ChatResponse {
            id: request_id.to_string(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason,
            }],
            usage,
        })
    }

    fn parse_stream_frame(
        &self,
        payload: &str,
        model: &str,
        request_id: &str,
    ) -> Result<Option<StreamChunk>, ProviderError> {
        let event: Value = serde_json::from_str(payload).map_err(ProviderError::Decode)?;
        let candidate = event
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first());
        let Some(candidate) = candidate else {
            return Ok(None);
        };

        let content = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<String>()
            })
            .unwrap_or_default();

        let finish_reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .map(map_finish_reason);

        Ok(Some(StreamChunk {
            id: request_id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![StreamChoice {
                index: 0,
                delta: Delta {
                    role: None,
                    content: if content.is_empty() {
                        None
                    } else {
                        Some(content)
                    },
                },
                finish_reason,
            }],
            usage: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    fn target() -> ProviderTarget {
        ProviderTarget {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: "key-123".to_string(),
            model: "gemini-1.5-pro".to_string(),
        }
    }

    #[test]
    fn system_message_becomes_system_instruction() {
        let adapter = GeminiAdapter;
        let request = ChatRequest {
            model: "route".to_string(),
            messages: vec![
                Message::system("be terse"),
                Message::assistant("ok"),
                Message::user("hi"),
            ],
            ..Default::default()
        };
        let (url, _, body) = adapter.build_request(&target(), &request).unwrap();
        assert!(url.contains("generateContent"));
        assert!(url.contains("key=key-123"));
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(body["contents"][0]["role"], "model");
        assert_eq!(body["contents"][1]["role"], "user");
    }

    #[test]
    fn streaming_url_uses_sse_verb() {
        let adapter = GeminiAdapter;
        let request = ChatRequest {
            model: "route".to_string(),
            messages: vec![Message::user("hi")],
            stream: Some(true),
            ..Default::default()
        };
        let (url, _, _) = adapter.build_request(&target(), &request).unwrap();
        assert!(url.contains("streamGenerateContent?alt=sse&key="));
    }

    #[test]
    fn finish_reason_is_mapped() {
        let adapter = GeminiAdapter;
        let body = json!({
            "candidates": [{ "content": {"parts": [{"text": "hi"}]}, "finishReason": "MAX_TOKENS" }]
        });
        let response = adapter
            .parse_response(body, "gemini-1.5-pro", "id-1")
            .unwrap();
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("length"));
    }
}
