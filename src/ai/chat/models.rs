//! The core models for relaying a chat between a client and an LLM.
use serde::{Deserialize, Serialize};

/// One user message paired with the assistant's response to it. The
/// response is absent while it is still being generated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(rename = "message")]
    pub user_message: String,
    #[serde(rename = "response", default)]
    pub assistant_response: Option<String>,
}

impl Exchange {
    pub fn new(user_message: &str, assistant_response: &str) -> Self {
        Self {
            user_message: user_message.to_string(),
            assistant_response: Some(assistant_response.to_string()),
        }
    }
}

/// What the UI submits: the new input and everything said before it
/// in chronological order.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub input: String,
    #[serde(default)]
    pub previous_conversations: Vec<Exchange>,
}

/// A single submission ready to send upstream. The context window is
/// the most recent exchanges, oldest first.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub input: String,
    pub context_window: Vec<Exchange>,
}

impl GenerationRequest {
    pub fn new(request: ChatRequest, max_previous: usize) -> Self {
        let ChatRequest {
            input,
            previous_conversations,
        } = request;
        let context_window = super::context::context_window(previous_conversations, max_previous);
        Self {
            input,
            context_window,
        }
    }
}

/// Commands a client sends over the chat socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    SendChat(ChatRequest),
    StopChat,
}

/// Events pushed to a client over the chat socket.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Response { content: String },
    Done,
    Error { message: String },
}
