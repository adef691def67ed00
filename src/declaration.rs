//! Form declarations
//!
//! A declaration file lists the top-level fields of a form:
//!
//! ```json
//! {
//!   "fields": [
//!     { "name": "title", "type": "text", "required": true },
//!     { "name": "tags", "type": "repeater", "minRows": 1,
//!       "fields": [{ "name": "label", "type": "text" }] }
//!   ]
//! }
//! ```
//!
//! The same structure is accepted as TOML (`[[fields]]` tables).

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::{FieldConfig, FieldRegistry};
use crate::form::Form;
use crate::config::Messages;

/// A serializable form declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormDeclaration {
    /// Optional human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl FormDeclaration {
    pub fn new(fields: Vec<FieldConfig>) -> Self {
        Self {
            title: None,
            fields,
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load a declaration, choosing the format from the file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let declaration = if is_toml {
            Self::from_toml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };
        tracing::debug!(path = %path.display(), fields = declaration.fields.len(), "declaration loaded");
        Ok(declaration)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Instantiate a live form
    pub fn into_form(self, registry: Arc<FieldRegistry>) -> Result<Form> {
        Form::new(self.fields, registry)
    }

    pub fn into_form_with_messages(
        self,
        registry: Arc<FieldRegistry>,
        messages: Messages,
    ) -> Result<Form> {
        Form::with_messages(self.fields, registry, messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormError;
    use serde_json::json;
    use tempfile::tempdir;

    const TOML_DECLARATION: &str = r#"
title = "Article"

[[fields]]
name = "title"
type = "text"
required = true

[[fields]]
name = "tags"
type = "repeater"
minRows = 2

[[fields.fields]]
name = "label"
type = "text"
"#;

    #[test]
    fn test_toml_declaration_builds_form() {
        let declaration = FormDeclaration::from_toml_str(TOML_DECLARATION).unwrap();
        assert_eq!(declaration.title.as_deref(), Some("Article"));

        let form = declaration
            .into_form(Arc::new(FieldRegistry::with_builtins()))
            .unwrap();
        assert_eq!(form.row_count("tags").unwrap(), 2);
    }

    #[test]
    fn test_load_picks_format_from_extension() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("form.json");
        std::fs::write(
            &json_path,
            json!({ "fields": [{ "name": "age", "type": "number", "defaultValue": 30 }] })
                .to_string(),
        )
        .unwrap();
        let toml_path = dir.path().join("form.toml");
        std::fs::write(&toml_path, TOML_DECLARATION).unwrap();

        assert_eq!(FormDeclaration::load(&json_path).unwrap().fields.len(), 1);
        assert_eq!(FormDeclaration::load(&toml_path).unwrap().fields.len(), 2);
    }

    #[test]
    fn test_unregistered_type_fails_before_construction() {
        let declaration = FormDeclaration::from_json_str(
            r#"{ "fields": [{ "name": "clip", "type": "video" }] }"#,
        )
        .unwrap();
        let err = declaration
            .into_form(Arc::new(FieldRegistry::with_builtins()))
            .unwrap_err();
        assert!(matches!(err, FormError::FieldTypeNotRegistered(t) if t == "video"));
    }

    #[test]
    fn test_malformed_declaration() {
        assert!(matches!(
            FormDeclaration::from_json_str("{ \"fields\": 3 }"),
            Err(FormError::Json(_))
        ));
        assert!(matches!(
            FormDeclaration::from_toml_str("fields = 3"),
            Err(FormError::Toml(_))
        ));
    }
}
