//! Field declarations
//!
//! A [`FieldConfig`] is the authorable description of one field. It can be
//! deserialized from JSON or TOML (camelCase keys, as written by form authors)
//! or assembled in code with the `with_*` builders. Predicates, validators and
//! loaders are closures and only exist on the code side.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BoxError;
use crate::validation::{SchemaValidator, ValidatorResult, Verdict};

use super::{
    FIELD_TYPE_BOOLEAN, FIELD_TYPE_DATE, FIELD_TYPE_FLEXIBLE, FIELD_TYPE_GROUP,
    FIELD_TYPE_NUMBER, FIELD_TYPE_REPEATER, FIELD_TYPE_TEXT, FIELD_TYPE_TEXTAREA,
};

/// A value record keyed by field name
pub type Values = serde_json::Map<String, Value>;

/// Custom validator: `(value, owning form values) -> verdict`
pub type ValidateFn = Arc<dyn Fn(&Value, &Values) -> Verdict + Send + Sync>;

/// Visibility / enablement predicate over the owning form's values
pub type Condition = Arc<dyn Fn(&Values) -> bool + Send + Sync>;

/// Loads selectable options for a search string
pub type OptionsLoader =
    Arc<dyn Fn(String, Values) -> BoxFuture<'static, Result<Vec<Value>, BoxError>> + Send + Sync>;

/// Resolves a full value from an identifier (relationship / autocomplete fields)
pub type ValueFetcher =
    Arc<dyn Fn(Value, Values) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// Declaration of a single field
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    /// Unique name within the owning form
    pub name: String,

    /// Registry key of the field type
    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    /// Initial value; `None` means the field starts empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    /// Child template (group, repeater)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldConfig>,

    /// Layout templates (flexible)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layouts: Vec<FlexibleLayout>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rows: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,

    /// Schema validator; a `schema` key in a declaration is compiled as JSON Schema
    #[serde(
        default,
        skip_serializing,
        deserialize_with = "crate::schema::deserialize_json_schema"
    )]
    pub schema: Option<Arc<dyn SchemaValidator>>,

    #[serde(skip)]
    pub validate: Option<ValidateFn>,

    #[serde(skip)]
    pub visible_if: Option<Condition>,

    #[serde(skip)]
    pub enabled_if: Option<Condition>,

    #[serde(skip)]
    pub async_options: Option<OptionsLoader>,

    #[serde(skip)]
    pub fetch_value: Option<ValueFetcher>,

    /// Keys not understood by the engine, kept for plugins
    #[serde(flatten)]
    pub extra: Values,
}

impl FieldConfig {
    /// Create a declaration of any registered type
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            label: None,
            description: None,
            required: false,
            default_value: None,
            fields: Vec::new(),
            layouts: Vec::new(),
            min_rows: None,
            max_rows: None,
            schema: None,
            validate: None,
            visible_if: None,
            enabled_if: None,
            async_options: None,
            fetch_value: None,
            extra: Values::new(),
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FIELD_TYPE_TEXT)
    }

    pub fn textarea(name: impl Into<String>) -> Self {
        Self::new(name, FIELD_TYPE_TEXTAREA)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FIELD_TYPE_NUMBER)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FIELD_TYPE_BOOLEAN)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FIELD_TYPE_DATE)
    }

    /// A group wrapping a fixed child field list
    pub fn group(name: impl Into<String>, fields: Vec<FieldConfig>) -> Self {
        Self {
            fields,
            ..Self::new(name, FIELD_TYPE_GROUP)
        }
    }

    /// A repeater whose rows all use `fields` as template
    pub fn repeater(name: impl Into<String>, fields: Vec<FieldConfig>) -> Self {
        Self {
            fields,
            ..Self::new(name, FIELD_TYPE_REPEATER)
        }
    }

    /// A flexible field whose items each pick one of `layouts`
    pub fn flexible(name: impl Into<String>, layouts: Vec<FlexibleLayout>) -> Self {
        Self {
            layouts,
            ..Self::new(name, FIELD_TYPE_FLEXIBLE)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_min_rows(mut self, min: usize) -> Self {
        self.min_rows = Some(min);
        self
    }

    pub fn with_max_rows(mut self, max: usize) -> Self {
        self.max_rows = Some(max);
        self
    }

    pub fn with_schema(mut self, schema: impl SchemaValidator + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Synchronous validator returning an error message or `None`
    pub fn with_validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Value, &Values) -> Option<String> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(move |value: &Value, values: &Values| {
            Verdict::Ready(Ok(validate(value, values)))
        }));
        self
    }

    /// Synchronous validator that may itself fail
    pub fn with_fallible_validator<F, E>(mut self, validate: F) -> Self
    where
        F: Fn(&Value, &Values) -> Result<Option<String>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.validate = Some(Arc::new(move |value: &Value, values: &Values| {
            Verdict::Ready(validate(value, values).map_err(Into::into))
        }));
        self
    }

    /// Asynchronous validator; the sync validation pass treats it as pending
    pub fn with_async_validator<F, Fut>(mut self, validate: F) -> Self
    where
        F: Fn(Value, Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ValidatorResult> + Send + 'static,
    {
        self.validate = Some(Arc::new(move |value: &Value, values: &Values| {
            Verdict::Pending(validate(value.clone(), values.clone()).boxed())
        }));
        self
    }

    pub fn visible_if<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Values) -> bool + Send + Sync + 'static,
    {
        self.visible_if = Some(Arc::new(condition));
        self
    }

    pub fn enabled_if<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Values) -> bool + Send + Sync + 'static,
    {
        self.enabled_if = Some(Arc::new(condition));
        self
    }

    pub fn with_async_options<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn(String, Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Value>, BoxError>> + Send + 'static,
    {
        self.async_options = Some(Arc::new(move |search: String, values: Values| {
            loader(search, values).boxed()
        }));
        self
    }

    pub fn with_fetch_value<F, Fut>(mut self, fetcher: F) -> Self
    where
        F: Fn(Value, Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        self.fetch_value = Some(Arc::new(move |id: Value, values: Values| {
            fetcher(id, values).boxed()
        }));
        self
    }

    /// Attach a plugin-specific key
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Find a layout by name
    pub fn layout(&self, name: &str) -> Option<&FlexibleLayout> {
        self.layouts.iter().find(|l| l.name == name)
    }
}

impl fmt::Debug for FieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldConfig")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("label", &self.label)
            .field("required", &self.required)
            .field("default_value", &self.default_value)
            .field("fields", &self.fields)
            .field("layouts", &self.layouts)
            .field("min_rows", &self.min_rows)
            .field("max_rows", &self.max_rows)
            .field("has_schema", &self.schema.is_some())
            .field("has_validator", &self.validate.is_some())
            .field("has_visible_if", &self.visible_if.is_some())
            .field("has_enabled_if", &self.enabled_if.is_some())
            .finish_non_exhaustive()
    }
}

/// A named field-list template selectable per flexible item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlexibleLayout {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl FlexibleLayout {
    pub fn new(name: impl Into<String>, fields: Vec<FieldConfig>) -> Self {
        Self {
            name: name.into(),
            label: None,
            fields,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Value of one flexible item: `{ "layout": ..., "values": {...} }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexibleItemValue {
    pub layout: String,
    #[serde(default)]
    pub values: Values,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_camel_case_declaration() {
        let config: FieldConfig = serde_json::from_value(json!({
            "name": "tags",
            "type": "repeater",
            "label": "Tags",
            "minRows": 1,
            "maxRows": 3,
            "defaultValue": [{ "label": "rust" }],
            "fields": [{ "name": "label", "type": "text", "required": true }],
            "placeholder": "Add a tag"
        }))
        .unwrap();

        assert_eq!(config.field_type, "repeater");
        assert_eq!(config.min_rows, Some(1));
        assert_eq!(config.max_rows, Some(3));
        assert_eq!(config.fields.len(), 1);
        assert!(config.fields[0].required);
        assert_eq!(config.extra.get("placeholder"), Some(&json!("Add a tag")));
        assert!(config.validate.is_none());
    }

    #[test]
    fn test_serialize_skips_closures_and_empty_templates() {
        let config = FieldConfig::text("title")
            .with_required(true)
            .with_validator(|_, _| None);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({ "name": "title", "type": "text", "required": true })
        );
    }

    #[test]
    fn test_layout_lookup() {
        let config = FieldConfig::flexible(
            "blocks",
            vec![
                FlexibleLayout::new("textBlock", vec![FieldConfig::textarea("body")]),
                FlexibleLayout::new("imageBlock", vec![FieldConfig::text("url")]),
            ],
        );

        assert!(config.layout("imageBlock").is_some());
        assert!(config.layout("videoBlock").is_none());
    }
}
