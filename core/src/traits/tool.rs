use anyhow::Context;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::path::PathBuf;

/// Coarse classification of a tool's side effects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Write,
    Shell,
    Network,
    Memory,
    Mcp,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Shell => "shell",
            Self::Network => "network",
            Self::Memory => "memory",
            Self::Mcp => "mcp",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to run a tool with already validated parameters.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub params: Map<String, Value>,
    pub cwd: PathBuf,
}

impl ToolInvocation {
    pub fn new(params: Map<String, Value>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            params,
            cwd: cwd.into(),
        }
    }

    /// Deserializes the parameters into a typed struct.
    pub fn parse<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .context("Failed to parse tool parameters")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub truncated: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            metadata: Map::new(),
            truncated: false,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            metadata: Map::new(),
            truncated: false,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Renders the result the way the model sees it. Failures lead with the
    /// error so the model reads it before any partial output.
    pub fn to_model_output(&self) -> String {
        if self.success {
            return self.output.clone();
        }

        let error = self.error.as_deref().unwrap_or("Tool execution failed");
        if self.output.is_empty() {
            format!("Error: {}", error)
        } else {
            format!("Error: {}\n\n{}", error, self.output)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// No type constraint (e.g. `anyOf` or `$ref` properties).
    Any,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub description: String,
    pub required: bool,
    pub nullable: bool,
    pub minimum: Option<i64>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
            description: description.into(),
            required: true,
            nullable: false,
            minimum: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty, description)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_minimum(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    fn to_property(&self) -> Value {
        let mut property = Map::new();
        match (self.ty, self.nullable) {
            (ParamType::Any, _) => {}
            (ty, false) => {
                property.insert("type".into(), json!(ty.as_str()));
            }
            (ty, true) => {
                property.insert("type".into(), json!([ty.as_str(), "null"]));
            }
        }
        if !self.description.is_empty() {
            property.insert("description".into(), json!(self.description));
        }
        if let Some(minimum) = self.minimum {
            property.insert("minimum".into(), json!(minimum));
        }
        Value::Object(property)
    }

    /// Reads the top-level parameters back out of a JSON Schema object.
    pub fn from_document(document: &Value) -> Vec<ParamSpec> {
        let required: Vec<&str> = document
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let Some(properties) = document.get("properties").and_then(|p| p.as_object()) else {
            return vec![];
        };

        properties
            .iter()
            .map(|(name, property)| {
                let (ty, nullable) = match property.get("type") {
                    Some(Value::String(ty)) => (ParamType::parse(ty).unwrap_or(ParamType::Any), false),
                    Some(Value::Array(types)) => {
                        let nullable = types.iter().any(|t| t.as_str() == Some("null"));
                        let ty = types
                            .iter()
                            .filter_map(|t| t.as_str())
                            .find(|t| *t != "null")
                            .and_then(ParamType::parse)
                            .unwrap_or(ParamType::Any);
                        (ty, nullable)
                    }
                    _ => (ParamType::Any, false),
                };

                ParamSpec {
                    name: name.clone(),
                    ty,
                    description: property
                        .get("description")
                        .and_then(|d| d.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    required: required.contains(&name.as_str()),
                    nullable,
                    minimum: property.get("minimum").and_then(|m| {
                        m.as_i64().or_else(|| m.as_f64().map(|f| f.ceil() as i64))
                    }),
                }
            })
            .collect()
    }

    fn check(&self, value: Option<&Value>, errors: &mut Vec<String>) {
        let value = match value {
            None if self.required => {
                errors.push(format!("{}: field required", self.name));
                return;
            }
            None => return,
            Some(value) => value,
        };

        if value.is_null() {
            if !self.nullable && self.ty != ParamType::Any {
                errors.push(format!("{}: must not be null", self.name));
            }
            return;
        }

        if !self.ty.matches(value) {
            errors.push(format!(
                "{}: expected {}, got {}",
                self.name,
                self.ty.as_str(),
                json_type_name(value)
            ));
            return;
        }

        if let Some(minimum) = self.minimum
            && let Some(n) = value.as_f64()
            && n < minimum as f64
        {
            errors.push(format!(
                "{}: must be greater than or equal to {}",
                self.name, minimum
            ));
        }
    }
}

/// Parameter schema of a tool: either a closed set of declared fields or a
/// free-form JSON Schema document.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolSchema {
    Fields(Vec<ParamSpec>),
    Document(Value),
}

impl ToolSchema {
    /// Derives a document schema from a parameter struct.
    pub fn from_type<T: JsonSchema>() -> Self {
        Self::Document(schemars::schema_for!(T).to_value())
    }

    pub fn to_parameters(&self) -> Value {
        match self {
            Self::Fields(fields) => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.name.clone(), f.to_property()))
                    .collect();
                let required: Vec<&str> = fields
                    .iter()
                    .filter(|f| f.required)
                    .map(|f| f.name.as_str())
                    .collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
            Self::Document(document) => {
                let mut document = document.clone();
                if let Some(object) = document.as_object_mut() {
                    object.remove("$schema");
                    object.remove("title");
                }
                document
            }
        }
    }

    pub fn params(&self) -> Vec<ParamSpec> {
        match self {
            Self::Fields(fields) => fields.clone(),
            Self::Document(document) => ParamSpec::from_document(document),
        }
    }

    /// Returns every violation, not just the first.
    pub fn validate(&self, params: &Map<String, Value>) -> Vec<String> {
        let mut errors = Vec::new();
        for spec in self.params() {
            spec.check(params.get(&spec.name), &mut errors);
        }
        errors
    }
}

/// What the model sees about a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A request for the user to approve a mutating tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfirmation {
    pub tool_name: String,
    pub kind: ToolKind,
    pub description: String,
    pub params: Map<String, Value>,
}

impl fmt::Display for ToolConfirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.description)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn kind(&self) -> ToolKind;

    fn schema(&self) -> ToolSchema;

    async fn execute(&self, invocation: ToolInvocation) -> anyhow::Result<ToolResult>;

    fn validate_params(&self, params: &Map<String, Value>) -> Vec<String> {
        self.schema().validate(params)
    }

    fn is_mutating(&self, _invocation: &ToolInvocation) -> bool {
        self.kind().is_mutating()
    }

    fn get_confirmation(&self, invocation: &ToolInvocation) -> Option<ToolConfirmation> {
        if !self.is_mutating(invocation) {
            return None;
        }
        Some(ToolConfirmation {
            tool_name: self.name().to_string(),
            kind: self.kind(),
            description: format!("Run {} tool '{}'", self.kind(), self.name()),
            params: invocation.params.clone(),
        })
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().to_parameters(),
        }
    }
}
