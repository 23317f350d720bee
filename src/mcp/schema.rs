//! Projects registered tools into OpenAI function-calling schema.

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::mcp::registry::ToolRegistry;
use crate::mcp::types::{ToolDefinition, ToolParameter};

const KNOWN_TYPES: [&str; 6] = ["string", "integer", "number", "boolean", "array", "object"];

/// Function schemas for every tool of every connected server, in
/// registration order.
pub fn openai_tools(registry: &ToolRegistry) -> Vec<Value> {
    let mut out = Vec::new();

    for server in registry.live_servers() {
        let Some(tools) = server.tools.as_ref() else {
            warn!(server = %server.name, "Server is connected but has no tools listed; skipping");
            continue;
        };
        debug!(server = %server.name, tool_count = tools.len(), "Formatting tools");

        for tool in tools.iter() {
            if tool.name.is_empty() {
                warn!(server = %server.name, "Skipping nameless tool");
                continue;
            }
            out.push(function_schema(tool));
        }
    }

    out
}

fn function_schema(tool: &ToolDefinition) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &tool.parameters {
        if param.name.is_empty() {
            warn!(tool = %tool.name, "Skipping nameless parameter");
            continue;
        }
        properties.insert(param.name.clone(), parameter_schema(param));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    let mut parameters = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        parameters["required"] = Value::Array(required);
    }

    let description = tool
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("Executes the {} tool.", tool.name));

    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": description,
            "parameters": parameters,
        }
    })
}

fn parameter_schema(param: &ToolParameter) -> Value {
    let declared = param.param_type.to_lowercase();
    let json_type = KNOWN_TYPES
        .iter()
        .find(|t| **t == declared)
        .copied()
        .unwrap_or("string");

    let description = param
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("Parameter {}", param.name));

    let mut schema = json!({
        "type": json_type,
        "description": description,
    });

    if let Some(values) = param.enum_values.as_ref().filter(|v| !v.is_empty()) {
        schema["enum"] = Value::Array(values.clone());
    }
    if let Some(default) = param.default.as_ref().filter(|v| !v.is_null()) {
        schema["default"] = default.clone();
    }
    match json_type {
        "array" => schema["items"] = json!({ "type": "string" }),
        "object" => schema["properties"] = json!({}),
        _ => {}
    }

    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::tests::NullConnection;
    use std::sync::Arc;

    #[test]
    fn test_schema_shape() {
        let registry = ToolRegistry::new(["alpha"]);
        let tool = ToolDefinition::new("forecast")
            .with_parameter(
                ToolParameter::new("city", "string")
                    .required()
                    .with_description("City name"),
            )
            .with_parameter(ToolParameter::new("tags", "array"))
            .with_parameter(ToolParameter::new("filters", "object"))
            .with_parameter(ToolParameter::new("when", "datetime"));
        registry.publish("alpha", Arc::new(NullConnection), vec![tool]);

        let tools = openai_tools(&registry);
        assert_eq!(tools.len(), 1);

        let function = &tools[0]["function"];
        assert_eq!(function["name"], "forecast");
        assert_eq!(function["description"], "Executes the forecast tool.");

        let params = &function["parameters"];
        assert_eq!(params["type"], "object");
        assert_eq!(params["required"], json!(["city"]));
        assert_eq!(params["properties"]["city"]["description"], "City name");
        assert_eq!(params["properties"]["tags"]["items"], json!({"type": "string"}));
        assert_eq!(params["properties"]["filters"]["properties"], json!({}));
        assert_eq!(params["properties"]["when"]["type"], "string");
        assert_eq!(params["properties"]["when"]["description"], "Parameter when");
    }

    #[test]
    fn test_enum_and_default() {
        let registry = ToolRegistry::new(["alpha"]);
        let mut units = ToolParameter::new("units", "string");
        units.enum_values = Some(vec![json!("metric"), json!("imperial")]);
        units.default = Some(json!("metric"));
        let mut empty_enum = ToolParameter::new("mode", "string");
        empty_enum.enum_values = Some(Vec::new());
        let tool = ToolDefinition::new("convert")
            .with_description("Unit conversion")
            .with_parameter(units)
            .with_parameter(empty_enum);
        registry.publish("alpha", Arc::new(NullConnection), vec![tool]);

        let tools = openai_tools(&registry);
        let props = &tools[0]["function"]["parameters"]["properties"];
        assert_eq!(props["units"]["enum"], json!(["metric", "imperial"]));
        assert_eq!(props["units"]["default"], "metric");
        assert!(props["mode"].get("enum").is_none());
        assert!(tools[0]["function"]["parameters"].get("required").is_none());
        assert_eq!(tools[0]["function"]["description"], "Unit conversion");
    }

    #[test]
    fn test_nameless_entries_and_disconnected_servers_are_skipped() {
        let registry = ToolRegistry::new(["alpha", "beta"]);
        let tool = ToolDefinition::new("ok").with_parameter(ToolParameter::new("", "string"));
        registry.publish(
            "alpha",
            Arc::new(NullConnection),
            vec![ToolDefinition::new(""), tool],
        );

        let tools = openai_tools(&registry);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["function"]["parameters"]["properties"], json!({}));
    }
}
