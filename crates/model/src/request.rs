use crate::response::ToolCallRequest;

/// A request to be sent to the model backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelRequest {
    /// The input messages, oldest first.
    pub messages: Vec<ModelMessage>,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
    /// An assistant request to call a tool.
    ToolCall(ToolCallRequest),
    /// A tool call result.
    Tool(ToolCallResult),
}

impl ModelMessage {
    /// Returns the role name of this message, as most backends spell it.
    #[inline]
    pub fn role(&self) -> &'static str {
        match self {
            ModelMessage::System(_) => "system",
            ModelMessage::User(_) => "user",
            ModelMessage::Assistant(_) | ModelMessage::ToolCall(_) => {
                "assistant"
            }
            ModelMessage::Tool(_) => "tool",
        }
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool that was called.
    pub name: String,
    /// The result of the tool call.
    pub content: String,
}
