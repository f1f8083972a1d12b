//! Translation of tool descriptors into backend declarations.
//!
//! Every backend describes callable functions in its own dialect. Gemini
//! accepts an OpenAPI subset with upper-case type names and rejects `null`
//! where it expects a list. Ollama takes the OpenAI-style tool object with
//! plain JSON Schema parameters. The functions here are pure: they never
//! invent tool names and never drop any, and the required list always
//! equals the descriptor's required list.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::{ParameterSpec, ParameterType, ToolDescriptor};

/// The declaration dialect a backend understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Gemini `functionDeclarations`.
    Gemini,
    /// Ollama (OpenAI-compatible) `tools`.
    Ollama,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gemini => f.write_str("gemini"),
            BackendKind::Ollama => f.write_str("ollama"),
        }
    }
}

/// A tool declaration in one of the backend dialects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolDeclaration {
    /// The Gemini dialect.
    Gemini(GeminiFunctionDeclaration),
    /// The Ollama dialect.
    Ollama(OllamaFunctionTool),
}

impl ToolDeclaration {
    /// Returns the name of the declared tool.
    pub fn name(&self) -> &str {
        match self {
            ToolDeclaration::Gemini(decl) => &decl.name,
            ToolDeclaration::Ollama(tool) => &tool.function.name,
        }
    }

    /// Returns the names of the required parameters.
    pub fn required(&self) -> &[String] {
        match self {
            ToolDeclaration::Gemini(decl) => decl
                .parameters
                .as_ref()
                .map(|p| p.required.as_slice())
                .unwrap_or_default(),
            ToolDeclaration::Ollama(tool) => &tool.function.parameters.required,
        }
    }
}

/// A Gemini function declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionDeclaration {
    /// Name of the function.
    pub name: String,
    /// Description of the function.
    pub description: String,
    /// The parameter object, absent for functions without parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<GeminiSchema>,
}

/// The schema types Gemini understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeminiType {
    /// `STRING`.
    String,
    /// `NUMBER`.
    Number,
    /// `INTEGER`.
    Integer,
    /// `BOOLEAN`.
    Boolean,
    /// `OBJECT`.
    Object,
    /// `ARRAY`.
    Array,
}

/// A schema node in the Gemini dialect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeminiSchema {
    /// The type of the node.
    #[serde(rename = "type")]
    pub ty: GeminiType,
    /// Description of the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The allowed values. Gemini only accepts string enumerations.
    #[serde(
        rename = "enum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enum_values: Option<Vec<String>>,
    /// The properties of an object node.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, GeminiSchema>,
    /// The required properties of an object node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// The element schema of an array node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<GeminiSchema>>,
}

impl GeminiSchema {
    fn of_type(ty: GeminiType) -> Self {
        Self {
            ty,
            description: None,
            enum_values: None,
            properties: BTreeMap::new(),
            required: vec![],
            items: None,
        }
    }
}

/// A tool in the Ollama dialect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OllamaFunctionTool {
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub ty: String,
    /// The function being declared.
    pub function: OllamaFunction,
}

/// The function part of an Ollama tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OllamaFunction {
    /// Name of the function.
    pub name: String,
    /// Description of the function.
    pub description: String,
    /// The parameter object.
    pub parameters: OllamaParameters,
}

/// The parameter object of an Ollama function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OllamaParameters {
    /// Always `"object"`.
    #[serde(rename = "type")]
    pub ty: String,
    /// The JSON Schema of each parameter.
    pub properties: BTreeMap<String, Value>,
    /// The required parameters.
    pub required: Vec<String>,
}

/// The error returned when a descriptor cannot be expressed in a dialect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaTranslationError {
    /// The tool being translated.
    pub tool: String,
    /// The offending parameter.
    pub parameter: String,
    /// The type name that could not be mapped.
    pub type_name: String,
}

impl Display for SchemaTranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parameter `{}` of tool `{}` has unsupported type `{}`",
            self.parameter, self.tool, self.type_name
        )
    }
}

impl Error for SchemaTranslationError {}

/// Translates a descriptor into the declaration shape of `kind`.
pub fn translate(
    tool: &ToolDescriptor,
    kind: BackendKind,
) -> Result<ToolDeclaration, SchemaTranslationError> {
    match kind {
        BackendKind::Gemini => {
            translate_gemini(tool).map(ToolDeclaration::Gemini)
        }
        BackendKind::Ollama => {
            translate_ollama(tool).map(ToolDeclaration::Ollama)
        }
    }
}

/// Translates all descriptors, stopping at the first failure.
pub fn translate_all(
    tools: &[ToolDescriptor],
    kind: BackendKind,
) -> Result<Vec<ToolDeclaration>, SchemaTranslationError> {
    tools.iter().map(|tool| translate(tool, kind)).collect()
}

fn unsupported(
    tool: &ToolDescriptor,
    param: &ParameterSpec,
    ty: &ParameterType,
) -> SchemaTranslationError {
    SchemaTranslationError {
        tool: tool.name().to_owned(),
        parameter: param.name.clone(),
        type_name: ty.as_str().to_owned(),
    }
}

fn gemini_type(ty: &ParameterType) -> Option<GeminiType> {
    Some(match ty {
        ParameterType::String => GeminiType::String,
        ParameterType::Number => GeminiType::Number,
        ParameterType::Integer => GeminiType::Integer,
        ParameterType::Boolean => GeminiType::Boolean,
        ParameterType::Object => GeminiType::Object,
        ParameterType::Array => GeminiType::Array,
        ParameterType::Unsupported(_) => return None,
    })
}

fn translate_gemini(
    tool: &ToolDescriptor,
) -> Result<GeminiFunctionDeclaration, SchemaTranslationError> {
    let mut properties = BTreeMap::new();
    for param in tool.parameters() {
        let ty = gemini_type(&param.ty)
            .ok_or_else(|| unsupported(tool, param, &param.ty))?;
        let mut schema = GeminiSchema::of_type(ty);
        schema.description = param.description.clone();
        schema.enum_values = param.enum_values.as_ref().map(|values| {
            values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        });
        if ty == GeminiType::Array {
            let item_ty =
                param.item_type.as_ref().unwrap_or(&ParameterType::String);
            let item = gemini_type(item_ty)
                .ok_or_else(|| unsupported(tool, param, item_ty))?;
            schema.items = Some(Box::new(GeminiSchema::of_type(item)));
        }
        properties.insert(param.name.clone(), schema);
    }

    let parameters = if properties.is_empty() && tool.required().is_empty() {
        None
    } else {
        let mut object = GeminiSchema::of_type(GeminiType::Object);
        object.properties = properties;
        object.required = tool.required().to_vec();
        Some(object)
    };

    Ok(GeminiFunctionDeclaration {
        name: tool.name().to_owned(),
        description: tool.description().to_owned(),
        parameters,
    })
}

fn translate_ollama(
    tool: &ToolDescriptor,
) -> Result<OllamaFunctionTool, SchemaTranslationError> {
    let mut properties = BTreeMap::new();
    for param in tool.parameters() {
        if let ParameterType::Unsupported(_) = &param.ty {
            return Err(unsupported(tool, param, &param.ty));
        }
        let mut schema = serde_json::Map::new();
        schema.insert("type".to_owned(), param.ty.as_str().into());
        if let Some(description) = &param.description {
            schema
                .insert("description".to_owned(), description.as_str().into());
        }
        if let Some(values) = &param.enum_values {
            schema.insert("enum".to_owned(), Value::Array(values.clone()));
        }
        if let Some(default) = &param.default {
            schema.insert("default".to_owned(), default.clone());
        }
        if let Some(minimum) = &param.minimum {
            schema.insert("minimum".to_owned(), minimum.clone());
        }
        if param.ty == ParameterType::Array {
            let item_ty =
                param.item_type.as_ref().unwrap_or(&ParameterType::String);
            if let ParameterType::Unsupported(_) = item_ty {
                return Err(unsupported(tool, param, item_ty));
            }
            let mut items = serde_json::Map::new();
            items.insert("type".to_owned(), item_ty.as_str().into());
            schema.insert("items".to_owned(), Value::Object(items));
        }
        properties.insert(param.name.clone(), Value::Object(schema));
    }

    Ok(OllamaFunctionTool {
        ty: "function".to_owned(),
        function: OllamaFunction {
            name: tool.name().to_owned(),
            description: tool.description().to_owned(),
            parameters: OllamaParameters {
                ty: "object".to_owned(),
                properties,
                required: tool.required().to_vec(),
            },
        },
    })
}
