//! # Canonical chat-completion types
//!
//! This module defines the OpenAI-shaped vocabulary every provider adapter
//! translates into and out of: [`ChatRequest`]/[`ChatResponse`] for the
//! non-streaming path, [`StreamChunk`] for the streaming path, and the shared
//! [`Message`]/[`Usage`]/[`Tool`] building blocks.
//!
//! Adapters never invent their own request/response shapes — they build a
//! provider-native `(url, headers, body)` triple from a [`ChatRequest`] and
//! parse a provider-native response back into this vocabulary. See
//! [`crate::providers`] for the adapter contract.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chat completion request in the canonical (OpenAI) shape.
///
/// `model` here names a *route*, not necessarily the literal upstream model —
/// the routing engine resolves it to a concrete `(provider, model)` pair
/// before an adapter ever sees this struct.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<HashMap<String, f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Legacy function-calling surface, passed through as-is (§1 Non-goals:
    /// tool/function calling is passthrough only, never interpreted here).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<Function>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallOption>,
}

impl ChatRequest {
    /// Validates the request per §4.D before any adapter is invoked.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let field_error = |field: &str, message: &str| {
            GatewayError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            }
        };

        if self.messages.is_empty() {
            return Err(field_error("messages", "must not be empty"));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(field_error("temperature", "must be within [0, 2]"));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(field_error("top_p", "must be within [0, 1]"));
            }
        }
        if let Some(p) = self.presence_penalty {
            if !(-2.0..=2.0).contains(&p) {
                return Err(field_error("presence_penalty", "must be within [-2, 2]"));
            }
        }
        if let Some(p) = self.frequency_penalty {
            if !(-2.0..=2.0).contains(&p) {
                return Err(field_error("frequency_penalty", "must be within [-2, 2]"));
            }
        }
        if let Some(m) = self.max_tokens {
            if m < 1 {
                return Err(field_error("max_tokens", "must be >= 1"));
            }
        }
        if let Some(n) = self.n {
            if n < 1 {
                return Err(field_error("n", "must be >= 1"));
            }
        }
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// `stop` accepts either a single string or a sequence of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequence {
    Single(String),
    Multiple(Vec<String>),
}

impl StopSequence {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopSequence::Single(s) => vec![s],
            StopSequence::Multiple(v) => v,
        }
    }
}

/// Chat completion response in the canonical shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// `chatcmpl-<12 hex chars>` per §4.D.
    pub fn new_id() -> String {
        let hex: String = uuid::Uuid::new_v4().simple().to_string();
        format!("chatcmpl-{}", &hex[..12])
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            function_call: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A generated completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Specific { function: FunctionChoice },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionChoice {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionCallOption {
    Mode(String),
    Specific { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Streaming chunk, the `chat.completion.chunk` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_messages() {
        let req = ChatRequest {
            model: "r".into(),
            ..Default::default()
        };
        assert!(matches!(
            req.validate(),
            Err(GatewayError::ValidationError { field, .. }) if field == "messages"
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let req = ChatRequest {
            model: "r".into(),
            messages: vec![Message::user("hi")],
            temperature: Some(3.0),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_request() {
        let req = ChatRequest {
            model: "r".into(),
            messages: vec![Message::user("hi")],
            temperature: Some(0.7),
            top_p: Some(0.9),
            max_tokens: Some(16),
            n: Some(1),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn stop_sequence_normalises_to_vec() {
        assert_eq!(
            StopSequence::Single("END".into()).into_vec(),
            vec!["END".to_string()]
        );
        assert_eq!(
            StopSequence::Multiple(vec!["A".into(), "B".into()]).into_vec(),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn chat_completion_id_has_expected_shape() {
        let id = ChatResponse::new_id();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), "chatcmpl-".len() + 12);
    }
}
