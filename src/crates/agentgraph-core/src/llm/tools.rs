//! Tool schemas advertised to chat models

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Tool description bound to a model request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema of the arguments object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonValue>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_serialization() {
        let def = ToolDefinition::new("search", "Search the web")
            .with_parameters(json!({"type": "object", "properties": {"q": {"type": "string"}}}));
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["name"], "search");
        assert_eq!(value["parameters"]["type"], "object");

        let bare = serde_json::to_value(ToolDefinition::new("noop", "")).unwrap();
        assert!(bare.get("parameters").is_none());
    }
}
