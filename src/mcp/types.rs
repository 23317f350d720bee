//! Tool-provider data model shared by the supervisor, router and formatters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A configured tool-provider server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Unique server name, used as the registry key.
    pub name: String,
    /// Endpoint URL of the server.
    pub url: String,
}

impl ServerEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A single declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    /// Declared type as reported by the server (`string`, `integer`, ...).
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: None,
            required: false,
            default: None,
            enum_values: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A tool as published by one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Build a definition from an MCP tool's JSON input schema.
    ///
    /// Every entry under `properties` becomes one parameter. When `type` is
    /// an array (`["string", "null"]`) the first non-null entry wins.
    pub fn from_input_schema(
        name: impl Into<String>,
        description: Option<String>,
        schema: &serde_json::Map<String, Value>,
    ) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let parameters = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(param_name, prop)| ToolParameter {
                        name: param_name.clone(),
                        param_type: declared_type(prop),
                        description: prop
                            .get("description")
                            .and_then(Value::as_str)
                            .map(ToString::to_string),
                        required: required.contains(&param_name.as_str()),
                        default: prop.get("default").filter(|v| !v.is_null()).cloned(),
                        enum_values: prop.get("enum").and_then(Value::as_array).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.into(),
            description,
            parameters,
        }
    }
}

fn declared_type(prop: &Value) -> String {
    match prop.get("type") {
        Some(Value::String(t)) => t.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .unwrap_or("string")
            .to_string(),
        _ => "string".to_string(),
    }
}

/// Content returned by a tool invocation, decoded into a closed set of shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    /// The tool returned nothing.
    Empty,
    /// Plain textual content.
    Text(String),
    /// A tagged `{"type": "text", "text": ...}` block.
    TextBlock(String),
    /// A number or boolean.
    Primitive(Value),
    /// Any other object or array.
    Structured(Value),
    /// Content the client could not decode, kept as a raw rendering.
    Unknown(String),
}

impl ToolContent {
    /// Decode a raw JSON value into one of the known content shapes.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(text) => Self::Text(text),
            Value::Bool(_) | Value::Number(_) => Self::Primitive(value),
            Value::Object(ref obj) if obj.get("type").and_then(Value::as_str) == Some("text") => {
                match obj.get("text") {
                    Some(Value::String(text)) => Self::TextBlock(text.clone()),
                    Some(Value::Null) | None => Self::TextBlock(String::new()),
                    Some(other) => Self::TextBlock(other.to_string()),
                }
            }
            Value::Object(_) | Value::Array(_) => Self::Structured(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl std::fmt::Display for ToolContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(text) | Self::TextBlock(text) | Self::Unknown(text) => f.write_str(text),
            Self::Primitive(value) | Self::Structured(value) => write!(f, "{value}"),
        }
    }
}

/// Outcome of a tool call as reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationResult {
    pub content: ToolContent,
    /// Tool-level error code; `None` or `Some(0)` means success.
    pub error_code: Option<i64>,
}

impl ToolInvocationResult {
    pub fn success(content: ToolContent) -> Self {
        Self {
            content,
            error_code: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.error_code, None | Some(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_to_parameters() {
        let schema = json!({
            "type": "object",
            "properties": {
                "city": { "type": "string", "description": "City name" },
                "days": { "type": ["integer", "null"], "default": 3 },
                "units": { "type": "string", "enum": ["metric", "imperial"] }
            },
            "required": ["city"]
        });

        let def = ToolDefinition::from_input_schema(
            "forecast",
            Some("Weather forecast".into()),
            schema.as_object().unwrap(),
        );

        assert_eq!(def.parameters.len(), 3);
        let city = def.parameters.iter().find(|p| p.name == "city").unwrap();
        assert!(city.required);
        assert_eq!(city.description.as_deref(), Some("City name"));

        let days = def.parameters.iter().find(|p| p.name == "days").unwrap();
        assert_eq!(days.param_type, "integer");
        assert_eq!(days.default, Some(json!(3)));
        assert!(!days.required);

        let units = def.parameters.iter().find(|p| p.name == "units").unwrap();
        assert_eq!(units.enum_values.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_content_decoding() {
        assert_eq!(ToolContent::from_value(Value::Null), ToolContent::Empty);
        assert_eq!(
            ToolContent::from_value(json!({"type": "text", "text": "42"})),
            ToolContent::TextBlock("42".into())
        );
        assert_eq!(
            ToolContent::from_value(json!(7)),
            ToolContent::Primitive(json!(7))
        );
        assert!(matches!(
            ToolContent::from_value(json!([1, 2])),
            ToolContent::Structured(_)
        ));
    }

    #[test]
    fn test_success_codes() {
        let mut result = ToolInvocationResult::success(ToolContent::Empty);
        assert!(result.is_success());
        result.error_code = Some(0);
        assert!(result.is_success());
        result.error_code = Some(7);
        assert!(!result.is_success());
    }
}
