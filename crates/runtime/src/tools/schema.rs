//! Argument validation against a tool's JSON schema.

use crate::model::ToolSpec;
use crate::tools::ToolError;
use jsonschema::JSONSchema;
use serde_json::Value;

/// Check `args` against the tool's input schema.
///
/// Runs before any tool body or approval gate, so malformed calls never
/// produce a checkpoint.
pub fn validate_arguments(spec: &ToolSpec, args: &Value) -> Result<(), ToolError> {
    let compiled = JSONSchema::compile(&spec.schema).map_err(|error| {
        ToolError::InvalidInput(format!("invalid schema for tool '{}': {error}", spec.name))
    })?;

    if let Err(errors) = compiled.validate(args) {
        let details = errors
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{path}: {error}")
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ToolError::InvalidInput(format!(
            "validation failed for tool '{}': {details}",
            spec.name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> ToolSpec {
        ToolSpec::new(
            "fetchWeather",
            "Look up the weather",
            json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            }),
        )
    }

    #[test]
    fn accepts_valid_arguments() {
        assert!(validate_arguments(&spec(), &json!({"city": "Paris"})).is_ok());
    }

    #[test]
    fn rejects_missing_and_mistyped() {
        let err = validate_arguments(&spec(), &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));

        let err = validate_arguments(&spec(), &json!({"city": 7})).unwrap_err();
        let ToolError::InvalidInput(message) = err else {
            panic!("expected invalid input");
        };
        assert!(message.contains("/city"), "{message}");
    }
}
