use barry_model::translate::GeminiFunctionDeclaration;
use barry_model::{ModelMessage, ModelRequest, ToolCallRequest, ToolCallResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::GeminiConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

// ---------------------------
// Types shared in both ways
// ---------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

// -----------
// Conversions
// -----------

const USER_ROLE: &str = "user";
const MODEL_ROLE: &str = "model";

pub fn create_request(
    req: &ModelRequest,
    declarations: &[GeminiFunctionDeclaration],
    config: &GeminiConfig,
) -> GenerateContentRequest {
    let system_texts: Vec<&str> = req
        .messages
        .iter()
        .filter_map(|msg| match msg {
            ModelMessage::System(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let system_instruction = (!system_texts.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part::text(system_texts.join("\n\n"))],
    });

    let tools = if declarations.is_empty() {
        vec![]
    } else {
        vec![Tool {
            function_declarations: declarations.to_vec(),
        }]
    };

    GenerateContentRequest {
        contents: create_contents(&req.messages),
        system_instruction,
        tools,
        generation_config: GenerationConfig {
            temperature: config.temperature,
        },
    }
}

/// Converts the messages to contents.
///
/// Gemini expects the calls of one round in a single model content, and
/// their responses in the user content right after it. Runs of tool
/// messages are regrouped that way, and adjacent contents of the same role
/// are merged.
fn create_contents(messages: &[ModelMessage]) -> Vec<Content> {
    let mut contents = vec![];
    let mut calls = vec![];
    let mut responses = vec![];

    for msg in messages {
        match msg {
            ModelMessage::ToolCall(req) => {
                calls.push(Part::function_call(req));
                continue;
            }
            ModelMessage::Tool(result) => {
                responses.push(Part::function_response(result));
                continue;
            }
            _ => {}
        }

        flush_round(&mut contents, &mut calls, &mut responses);
        match msg {
            ModelMessage::User(text) => {
                push_part(&mut contents, USER_ROLE, Part::text(text));
            }
            ModelMessage::Assistant(text) => {
                push_part(&mut contents, MODEL_ROLE, Part::text(text));
            }
            _ => {}
        }
    }
    flush_round(&mut contents, &mut calls, &mut responses);

    contents
}

fn flush_round(
    contents: &mut Vec<Content>,
    calls: &mut Vec<Part>,
    responses: &mut Vec<Part>,
) {
    for part in calls.drain(..) {
        push_part(contents, MODEL_ROLE, part);
    }
    for part in responses.drain(..) {
        push_part(contents, USER_ROLE, part);
    }
}

fn push_part(contents: &mut Vec<Content>, role: &str, part: Part) {
    match contents.last_mut() {
        Some(last) if last.role.as_deref() == Some(role) => {
            last.parts.push(part);
        }
        _ => contents.push(Content {
            role: Some(role.to_owned()),
            parts: vec![part],
        }),
    }
}

impl Part {
    fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn function_call(req: &ToolCallRequest) -> Self {
        Self {
            function_call: Some(FunctionCall {
                id: None,
                name: req.name.clone(),
                args: req.arguments.clone(),
            }),
            ..Default::default()
        }
    }

    fn function_response(result: &ToolCallResult) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                id: None,
                name: result.name.clone(),
                response: serde_json::json!({ "result": result.content }),
            }),
            ..Default::default()
        }
    }
}
