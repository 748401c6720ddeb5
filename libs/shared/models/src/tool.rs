use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope returned by every tool operation on the voice boundary.
///
/// The voice layer holds no server-side session, so the updated conversation
/// snapshot is echoed back with every response and replayed on the next turn.
/// `message_to_patient` may be left empty; response composition is a
/// downstream concern and the structured `data`/`error_code` must be enough
/// for it to phrase a correct utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub message_to_patient: String,
    pub conversation_state: Value,
}

impl ToolResponse {
    pub fn ok(data: Value, state: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_code: None,
            message_to_patient: String::new(),
            conversation_state: state,
        }
    }

    pub fn error(code: impl Into<String>, data: Option<Value>, state: Value) -> Self {
        Self {
            success: false,
            data,
            error_code: Some(code.into()),
            message_to_patient: String::new(),
            conversation_state: state,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message_to_patient = message.into();
        self
    }
}

/// Named-argument bundle for a tool invocation: free-form arguments plus the
/// serialized conversation snapshot from the previous turn.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolInvocation {
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub conversation_state: Value,
}
