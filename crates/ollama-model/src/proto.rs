use barry_model::translate::OllamaFunctionTool;
use barry_model::{ModelMessage, ModelRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OllamaConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatChunk {
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub done: bool,
    pub done_reason: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ModelTag {
    #[serde(default)]
    pub name: String,
    pub model: Option<String>,
}

impl ModelTag {
    /// Returns the name the server reports for this model.
    pub fn id(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.name)
    }
}

// ---------------------------
// Types shared in both ways
// ---------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Returns the arguments as a JSON value.
    ///
    /// Some models encode the arguments as a JSON string instead of an
    /// object.
    pub fn arguments(self) -> Value {
        match self.arguments {
            Value::String(s) => serde_json::from_str(&s).unwrap_or_default(),
            other => other,
        }
    }
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        tool_name: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaFunctionTool>,
    stream: bool,
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    tools: &[OllamaFunctionTool],
    config: &OllamaConfig,
) -> ChatRequest {
    let mut messages: Vec<Message> = vec![];
    for msg in &req.messages {
        match msg {
            ModelMessage::System(content) => messages.push(Message::System {
                content: content.clone(),
            }),
            ModelMessage::User(content) => messages.push(Message::User {
                content: content.clone(),
            }),
            ModelMessage::Assistant(content) => {
                messages.push(Message::Assistant {
                    content: content.clone(),
                    tool_calls: vec![],
                })
            }
            ModelMessage::ToolCall(req) => {
                let call = ToolCall {
                    function: FunctionCall {
                        name: req.name.clone(),
                        arguments: Value::Object(req.arguments.clone()),
                    },
                };
                // Calls of one round belong to the assistant message that
                // requested them.
                match messages.last_mut() {
                    Some(Message::Assistant { tool_calls, .. }) => {
                        tool_calls.push(call)
                    }
                    _ => messages.push(Message::Assistant {
                        content: String::new(),
                        tool_calls: vec![call],
                    }),
                }
            }
            ModelMessage::Tool(result) => messages.push(Message::Tool {
                content: result.content.clone(),
                tool_name: result.name.clone(),
            }),
        }
    }

    ChatRequest {
        model: config.model.clone(),
        messages,
        tools: tools.to_vec(),
        stream: true,
    }
}
