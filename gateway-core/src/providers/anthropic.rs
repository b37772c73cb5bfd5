//! Anthropic Messages API adapter (§4.D.2).
//!
//! System messages are pulled out of the message list into the top-level
//! `system` field rather than merged into the first user turn; streaming
//! dispatches on `message_start` (role chunk), `content_block_delta` /
//! `text_delta` (content chunk), and `message_delta` (finish-reason
//! chunk via the `stop_reason` → OpenAI finish-reason map).

use crate::error::ProviderError;
use crate::models::{ChatResponse, Choice, Delta, Message, Role, StreamChoice, StreamChunk, Usage};
use crate::models::ChatRequest;
use crate::providers::{Adapter, ProviderTarget};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

pub struct AnthropicAdapter;

fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "stop_sequence" => "stop",
        other => other,
    }
    .to_string()
}

#[async_trait::async_trait]
impl Adapter for AnthropicAdapter {
    fn dialect(&self) -> &'static str {
        "anthropic"
    }

    fn build_request(
        &self,
        target: &ProviderTarget,
        request: &ChatRequest,
    ) -> Result<(String, HeaderMap, Value), ProviderError> {
        let url = format!("{}/v1/messages", target.base_url.trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&target.api_key).map_err(|_| ProviderError::Http {
                status: 0,
                message: "API key contains invalid header characters".to_string(),
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let mut system_message: Option<String> = None;
        let mut messages = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => system_message = Some(msg.content.clone()),
                _ => messages.push(json!({ "role": role_str(msg.role), "content": msg.content })),
            }
        }

        let mut body = json!({
            "model": target.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(1024),
        });

        if let Some(system) = system_message {
            body["system"] = Value::String(system);
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = request.top_p {
            body["top_p"] = json!(p);
        }
        if let Some(stop) = &request.stop {
            body["stop_sequences"] = json!(stop.clone().into_vec());
        }
        if request.is_streaming() {
            body["stream"] = json!(true);
        }

        Ok((url, headers, body))
    }

    fn parse_response(
        &self,
        body: Value,
        model: &str,
        request_id: &str,
    ) -> Result<ChatResponse, ProviderError> {
        let content = body
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<String>()
            })
            .unwrap_or_default();

        let finish_reason = body
            .get("stop_reason")
            .and_then(|r| r.as_str())
            .map(map_stop_reason);

        let usage = body.get("usage").map(|u| {
            let input = u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let output = u
                .get("output_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            Usage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
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
        let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");

        let stamp = |delta: Delta, finish_reason: Option<String>| StreamChunk {
            id: request_id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        };

        match event_type {
            "message_start" => Ok(Some(stamp(
                Delta {
                    role: Some(Role::Assistant),
                    content: None,
                },
                None,
            ))),
            "content_block_delta" => {
                let text = event
                    .get("delta")
                    .filter(|d| d.get("type").and_then(|t| t.as_str()) == Some("text_delta"))
                    .and_then(|d| d.get("text"))
                    .and_then(|t| t.as_str());
                match text {
                    Some(text) if !text.is_empty() => Ok(Some(stamp(
                        Delta {
                            role: None,
                            content: Some(text.to_string()),
                        },
                        None,
                    ))),
                    _ => Ok(None),
                }
            }
            "message_delta" => {
                let stop_reason = event
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|r| r.as_str());
                match stop_reason {
                    Some(reason) => Ok(Some(stamp(
                        Delta::default(),
                        Some(map_stop_reason(reason)),
                    ))),
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System | Role::Tool => "user",
    }
}
