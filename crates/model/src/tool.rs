use std::fmt::{self, Display};

use serde_json::{Map, Value};

/// The semantic type of a tool parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterType {
    /// A string.
    String,
    /// A floating point number.
    Number,
    /// An integer.
    Integer,
    /// A boolean.
    Boolean,
    /// A nested object.
    Object,
    /// A list of values.
    Array,
    /// A type that no backend declaration can express, kept verbatim so
    /// that translation can report it.
    Unsupported(String),
}

impl ParameterType {
    /// Parses a JSON Schema type name.
    pub fn parse(name: &str) -> Self {
        match name {
            "string" => ParameterType::String,
            "number" => ParameterType::Number,
            "integer" => ParameterType::Integer,
            "boolean" => ParameterType::Boolean,
            "object" => ParameterType::Object,
            "array" => ParameterType::Array,
            other => ParameterType::Unsupported(other.to_owned()),
        }
    }

    /// Returns the JSON Schema spelling of this type.
    pub fn as_str(&self) -> &str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Integer => "integer",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
            ParameterType::Unsupported(name) => name,
        }
    }

    // Schemas may spell the type as a list (`["integer", "null"]`) or omit
    // it entirely. A missing type is treated as a string, everything that
    // is not a plain name is unsupported.
    fn from_schema(schema: &Value) -> Self {
        match schema.get("type") {
            None => ParameterType::String,
            Some(Value::String(name)) => Self::parse(name),
            Some(other) => ParameterType::Unsupported(other.to_string()),
        }
    }
}

impl Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes one parameter of a tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSpec {
    /// Name of the parameter.
    pub name: String,
    /// Semantic type of the parameter.
    pub ty: ParameterType,
    /// Human readable description, if the worker provided one.
    pub description: Option<String>,
    /// Whether the caller must provide this parameter.
    pub required: bool,
    /// The allowed values, if the parameter is constrained to a set.
    ///
    /// An empty constraint is normalized to `None`.
    pub enum_values: Option<Vec<Value>>,
    /// The value the worker uses when the parameter is omitted.
    pub default: Option<Value>,
    /// The inclusive lower bound for numeric parameters.
    pub minimum: Option<Value>,
    /// The element type for array parameters.
    pub item_type: Option<ParameterType>,
}

/// Describes a tool discovered from a worker.
///
/// The descriptor is immutable once created. It keeps the raw input schema
/// next to the parsed parameters, so that backends accepting JSON Schema
/// can still see everything the worker declared.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    parameters: Vec<ParameterSpec>,
    required: Vec<String>,
    input_schema: Value,
}

impl ToolDescriptor {
    /// Creates a descriptor from a JSON Schema object describing the tool
    /// input, in the shape MCP `tools/list` returns it.
    pub fn from_input_schema<N, D>(
        name: N,
        description: D,
        input_schema: Value,
    ) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        let required: Vec<String> = input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                    .collect()
            })
            .unwrap_or_default();

        let empty = Map::new();
        let properties = input_schema
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let parameters = properties
            .iter()
            .map(|(name, schema)| ParameterSpec {
                name: name.clone(),
                ty: ParameterType::from_schema(schema),
                description: schema
                    .get("description")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
                required: required.contains(name),
                enum_values: schema
                    .get("enum")
                    .and_then(Value::as_array)
                    .filter(|values| !values.is_empty())
                    .cloned(),
                default: schema.get("default").cloned(),
                minimum: schema.get("minimum").cloned(),
                item_type: schema.get("items").map(ParameterType::from_schema),
            })
            .collect();

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            required,
            input_schema,
        }
    }

    /// Returns the name of the tool.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description of the tool.
    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the parameters of the tool.
    #[inline]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Returns the names of the required parameters, in declaration order.
    #[inline]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Returns the raw input schema.
    #[inline]
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Finds a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Returns the required parameters missing from `arguments`.
    pub fn missing_arguments<'a>(
        &'a self,
        arguments: &'a Map<String, Value>,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.required
            .iter()
            .filter(|name| !arguments.contains_key(name.as_str()))
            .map(String::as_str)
    }
}
