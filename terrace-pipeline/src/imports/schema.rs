use jsonschema::JSONSchema;
use serde_json::Value;

/// Validates a value against a JSON schema
///
/// # Errors
/// Returns one message per violation, prefixed with the instance path
pub fn validate_schema(schema: &Value, value: &Value) -> std::result::Result<(), Vec<String>> {
    let compiled = JSONSchema::options()
        .compile(schema)
        .map_err(|e| vec![format!("invalid schema: {}", e)])?;
    if let Err(errors) = compiled.validate(value) {
        let messages = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        return Err(messages);
    }
    Ok(())
}
