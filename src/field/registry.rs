//! Field Type Registry
//!
//! Maps a type name to the factory that builds a [`Field`] from its
//! declaration. A registry is a plain value handed to each form, so two forms
//! can run with different sets of types and nothing is process-wide.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{FormError, Result};
use crate::form::composite::{check_row_limits, parse_items, parse_record, parse_rows};
use crate::form::{FormArena, FormId, ParentLink};

use super::{
    Field, FieldConfig, FlexibleItem, FlexibleItemValue, Values, FIELD_TYPE_BOOLEAN,
    FIELD_TYPE_DATE, FIELD_TYPE_FLEXIBLE, FIELD_TYPE_GROUP, FIELD_TYPE_NUMBER,
    FIELD_TYPE_REPEATER, FIELD_TYPE_TEXT, FIELD_TYPE_TEXTAREA,
};

/// Builds a field from its declaration
pub type FieldFactory =
    Arc<dyn Fn(FieldConfig, &mut FieldBuilder<'_>) -> Result<Field> + Send + Sync>;

/// What happens when a type name is registered twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverridePolicy {
    /// Last writer wins; the replaced factory is handed back
    #[default]
    Replace,
    /// Re-registration fails with [`FormError::DuplicateFieldType`]
    Reject,
}

/// The field type registry
#[derive(Clone, Default)]
pub struct FieldRegistry {
    factories: BTreeMap<String, FieldFactory>,
    policy: OverridePolicy,
}

impl FieldRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: OverridePolicy) -> Self {
        Self {
            factories: BTreeMap::new(),
            policy,
        }
    }

    /// A registry holding every built-in field type
    pub fn with_builtins() -> Self {
        Self::with_builtins_and_policy(OverridePolicy::Replace)
    }

    pub fn with_builtins_and_policy(policy: OverridePolicy) -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry.policy = policy;
        registry
    }

    pub fn policy(&self) -> OverridePolicy {
        self.policy
    }

    /// Register the built-in primitives and composites, replacing existing entries
    pub fn register_builtins(&mut self) {
        for primitive in [
            FIELD_TYPE_TEXT,
            FIELD_TYPE_TEXTAREA,
            FIELD_TYPE_NUMBER,
            FIELD_TYPE_BOOLEAN,
            FIELD_TYPE_DATE,
        ] {
            self.insert(primitive, Arc::new(build_primitive));
        }
        self.insert(FIELD_TYPE_GROUP, Arc::new(build_group));
        self.insert(FIELD_TYPE_REPEATER, Arc::new(build_repeater));
        self.insert(FIELD_TYPE_FLEXIBLE, Arc::new(build_flexible));
    }

    /// Register a field type.
    ///
    /// Returns the factory previously registered under the same name, if any.
    pub fn register<F>(&mut self, field_type: impl Into<String>, factory: F) -> Result<Option<FieldFactory>>
    where
        F: Fn(FieldConfig, &mut FieldBuilder<'_>) -> Result<Field> + Send + Sync + 'static,
    {
        let field_type = field_type.into();
        if self.policy == OverridePolicy::Reject && self.factories.contains_key(&field_type) {
            return Err(FormError::DuplicateFieldType(field_type));
        }
        let previous = self.insert(&field_type, Arc::new(factory));
        if previous.is_some() {
            tracing::warn!(field_type = %field_type, "field type factory replaced");
        }
        Ok(previous)
    }

    pub fn unregister(&mut self, field_type: &str) -> Option<FieldFactory> {
        self.factories.remove(field_type)
    }

    /// Build a field through the factory registered for `field_type`
    pub fn create(
        &self,
        field_type: &str,
        config: FieldConfig,
        builder: &mut FieldBuilder<'_>,
    ) -> Result<Field> {
        let factory = self
            .factories
            .get(field_type)
            .ok_or_else(|| FormError::FieldTypeNotRegistered(field_type.to_string()))?;
        factory(config, builder)
    }

    pub fn contains(&self, field_type: &str) -> bool {
        self.factories.contains_key(field_type)
    }

    /// Registered type names, sorted
    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Check that every type in a declaration tree is registered
    pub fn check_declarations(&self, fields: &[FieldConfig]) -> Result<()> {
        for field in fields {
            if !self.contains(&field.field_type) {
                return Err(FormError::FieldTypeNotRegistered(field.field_type.clone()));
            }
            self.check_declarations(&field.fields)?;
            for layout in &field.layouts {
                self.check_declarations(&layout.fields)?;
            }
        }
        Ok(())
    }

    fn insert(&mut self, field_type: &str, factory: FieldFactory) -> Option<FieldFactory> {
        self.factories.insert(field_type.to_string(), factory)
    }
}

impl fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("types", &self.list())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Handed to factories so composite fields can build the child forms they own
pub struct FieldBuilder<'a> {
    arena: &'a mut FormArena,
    registry: &'a FieldRegistry,
    parent: ParentLink,
}

impl<'a> FieldBuilder<'a> {
    pub(crate) fn new(arena: &'a mut FormArena, registry: &'a FieldRegistry, parent: ParentLink) -> Self {
        Self {
            arena,
            registry,
            parent,
        }
    }

    pub fn registry(&self) -> &FieldRegistry {
        self.registry
    }

    /// Build one child form, seeding child defaults from `seed`
    pub fn child_form(&mut self, template: &[FieldConfig], seed: Option<&Values>) -> Result<FormId> {
        self.arena
            .build_form(self.registry, template, seed, Some(self.parent.clone()))
    }

    /// Build one child form per seed; nothing is left behind on failure
    pub fn child_forms(&mut self, template: &[FieldConfig], seeds: &[Values]) -> Result<Vec<FormId>> {
        self.arena
            .build_rows(self.registry, template, seeds, &self.parent)
    }

    /// Build flexible items, resolving each layout against `config`
    pub fn flexible_items(
        &mut self,
        config: &FieldConfig,
        items: &[FlexibleItemValue],
    ) -> Result<Vec<FlexibleItem>> {
        self.arena
            .build_items(self.registry, config, items, &self.parent)
    }

    /// Apply minRows / maxRows to a freshly built repeater or flexible field
    pub fn enforce_row_limits(&mut self, field: &mut Field) -> Result<bool> {
        self.arena
            .enforce_limits(self.registry, field, &self.parent)
    }

    /// Drop child forms built by this builder
    pub fn discard(&mut self, forms: &[FormId]) {
        for form in forms {
            self.arena.remove(*form);
        }
    }
}

fn build_primitive(config: FieldConfig, _builder: &mut FieldBuilder<'_>) -> Result<Field> {
    Ok(Field::primitive(config))
}

fn build_group(config: FieldConfig, builder: &mut FieldBuilder<'_>) -> Result<Field> {
    let seed = match &config.default_value {
        Some(value) => parse_record(&config.name, value)?,
        None => None,
    };
    let form = builder.child_form(&config.fields, seed.as_ref())?;
    Ok(Field::group(config, form))
}

fn build_repeater(config: FieldConfig, builder: &mut FieldBuilder<'_>) -> Result<Field> {
    check_row_limits(&config)?;
    let rows = match &config.default_value {
        Some(value) => parse_rows(&config.name, value)?,
        None => Vec::new(),
    };
    let forms = builder.child_forms(&config.fields, &rows)?;
    let mut field = Field::repeater(config, forms);
    if let Err(err) = builder.enforce_row_limits(&mut field) {
        builder.discard(&field.kind().child_forms());
        return Err(err);
    }
    Ok(field)
}

fn build_flexible(config: FieldConfig, builder: &mut FieldBuilder<'_>) -> Result<Field> {
    check_row_limits(&config)?;
    if config.min_rows.unwrap_or(0) > 0 && config.layouts.is_empty() {
        return Err(FormError::InvalidConfig(format!(
            "{} requires rows but declares no layouts",
            config.name
        )));
    }
    let items = match &config.default_value {
        Some(value) => parse_items(&config.name, value)?,
        None => Vec::new(),
    };
    let items = builder.flexible_items(&config, &items)?;
    let mut field = Field::flexible(config, items);
    if let Err(err) = builder.enforce_row_limits(&mut field) {
        builder.discard(&field.kind().child_forms());
        return Err(err);
    }
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_listed_sorted() {
        let registry = FieldRegistry::with_builtins();
        assert_eq!(
            registry.list(),
            vec!["boolean", "date", "flexible", "group", "number", "repeater", "text", "textarea"]
        );
    }

    #[test]
    fn test_register_replaces_and_returns_previous() {
        let mut registry = FieldRegistry::with_builtins();
        let previous = registry
            .register("text", |config, _| Ok(Field::primitive(config)))
            .unwrap();
        assert!(previous.is_some());

        let fresh = registry
            .register("slug", |config, _| Ok(Field::primitive(config)))
            .unwrap();
        assert!(fresh.is_none());
        assert!(registry.contains("slug"));
    }

    #[test]
    fn test_reject_policy_refuses_duplicates() {
        let mut registry = FieldRegistry::with_builtins_and_policy(OverridePolicy::Reject);
        let result = registry.register("text", |config, _| Ok(Field::primitive(config)));
        assert!(matches!(result, Err(FormError::DuplicateFieldType(t)) if t == "text"));
    }

    #[test]
    fn test_check_declarations_walks_nested_templates() {
        let registry = FieldRegistry::with_builtins();
        let fields = vec![FieldConfig::flexible(
            "blocks",
            vec![crate::field::FlexibleLayout::new(
                "embed",
                vec![FieldConfig::new("player", "video")],
            )],
        )];

        let err = registry.check_declarations(&fields).unwrap_err();
        assert!(matches!(err, FormError::FieldTypeNotRegistered(t) if t == "video"));
    }
}
