use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::warn;

use super::error::ToolCallError;
use crate::domain::types::ToolDescriptor;

/// Check `arguments` against the tool's declared `inputSchema`.
///
/// A schema that does not compile is reported once per call and skipped;
/// the server remains the final authority in that case.
pub(crate) fn validate_arguments(
    descriptor: &ToolDescriptor,
    arguments: &Value,
) -> Result<(), ToolCallError> {
    let compiled = match JSONSchema::compile(&descriptor.input_schema) {
        Ok(compiled) => compiled,
        Err(err) => {
            warn!(
                tool = %descriptor.name,
                error = %err,
                "tool declares an invalid input schema; skipping argument validation"
            );
            return Ok(());
        }
    };

    if let Err(errors) = compiled.validate(arguments) {
        let reasons = errors
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{path}: {error}")
                }
            })
            .collect();
        return Err(ToolCallError::InvalidArguments {
            tool: descriptor.name.clone(),
            reasons,
        });
    }
    Ok(())
}

/// Models often send `null` for tools without parameters.
pub(crate) fn normalise_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    }
}
