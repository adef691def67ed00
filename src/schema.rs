//! Schema validators
//!
//! Ready-made [`SchemaValidator`] implementations: JSON Schema documents
//! (compiled with `jsonschema`) and regular-expression patterns for text
//! fields. Anything else can implement the trait directly.

use std::fmt;
use std::sync::Arc;

use jsonschema::JSONSchema;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{FormError, Result};
use crate::validation::{SchemaValidator, SchemaViolation};

/// A compiled JSON Schema document
pub struct JsonSchemaValidator {
    document: Value,
    compiled: JSONSchema,
}

impl JsonSchemaValidator {
    pub fn compile(document: Value) -> Result<Self> {
        let compiled = JSONSchema::compile(&document)
            .map_err(|e| FormError::InvalidSchema(e.to_string()))?;
        Ok(Self { document, compiled })
    }

    /// The schema as written
    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn safe_parse(&self, value: &Value) -> std::result::Result<(), SchemaViolation> {
        self.compiled.validate(value).map_err(|errors| {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            SchemaViolation {
                message: (!messages.is_empty()).then(|| messages.join("; ")),
            }
        })
    }
}

impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaValidator")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

/// Accepts strings matching a regular expression.
///
/// Null passes so that optional fields stay optional; required-ness is checked
/// separately.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    pattern: Regex,
    message: Option<String>,
}

impl PatternValidator {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| FormError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            pattern,
            message: None,
        })
    }

    /// Message reported on mismatch instead of the generic one
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl SchemaValidator for PatternValidator {
    fn safe_parse(&self, value: &Value) -> std::result::Result<(), SchemaViolation> {
        match value {
            Value::Null => Ok(()),
            Value::String(s) if self.pattern.is_match(s) => Ok(()),
            _ => Err(SchemaViolation {
                message: self.message.clone(),
            }),
        }
    }
}

/// Compile the `schema` key of a declaration as a JSON Schema document
pub(crate) fn deserialize_json_schema<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Arc<dyn SchemaValidator>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(document) => {
            let validator =
                JsonSchemaValidator::compile(document).map_err(serde::de::Error::custom)?;
            Ok(Some(Arc::new(validator)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldConfig;
    use serde_json::json;

    #[test]
    fn test_json_schema_reports_violations() {
        let schema = JsonSchemaValidator::compile(json!({
            "type": "integer",
            "minimum": 0
        }))
        .unwrap();

        assert!(schema.safe_parse(&json!(3)).is_ok());
        let violation = schema.safe_parse(&json!(-2)).unwrap_err();
        assert!(violation.message.unwrap().contains("minimum"));
    }

    #[test]
    fn test_invalid_schema_document_is_rejected() {
        let result = JsonSchemaValidator::compile(json!({ "type": 12 }));
        assert!(matches!(result, Err(FormError::InvalidSchema(_))));
    }

    #[test]
    fn test_pattern_validator() {
        let slug = PatternValidator::new(r"^[a-z0-9-]+$")
            .unwrap()
            .with_message("Use lowercase letters, digits and dashes");

        assert!(slug.safe_parse(&json!("hello-world")).is_ok());
        assert!(slug.safe_parse(&Value::Null).is_ok());
        assert_eq!(
            slug.safe_parse(&json!("Hello World")).unwrap_err().message.as_deref(),
            Some("Use lowercase letters, digits and dashes")
        );
        assert!(slug.safe_parse(&json!(42)).is_err());
        assert!(PatternValidator::new("(").is_err());
    }

    #[test]
    fn test_declaration_schema_key_is_compiled() {
        let config: FieldConfig = serde_json::from_value(json!({
            "name": "email",
            "type": "text",
            "schema": { "type": "string", "maxLength": 5 }
        }))
        .unwrap();

        let schema = config.schema.expect("schema compiled");
        assert!(schema.safe_parse(&json!("a@b")).is_ok());
        assert!(schema.safe_parse(&json!("toolong@example.com")).is_err());
    }

    #[test]
    fn test_declaration_with_broken_schema_fails() {
        let result: std::result::Result<FieldConfig, _> = serde_json::from_value(json!({
            "name": "email",
            "type": "text",
            "schema": { "type": "nonsense" }
        }));
        assert!(result.is_err());
    }
}
