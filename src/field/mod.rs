//! Runtime fields
//!
//! A [`Field`] binds one [`FieldConfig`] to live state. Kind-specific state is a
//! tagged union: primitives hold their value directly, composite kinds hold
//! handles of the child forms they exclusively own inside the form arena.

mod config;
mod options;
mod registry;

use std::sync::Arc;

use serde_json::Value;

use crate::events::{EventEmitter, FieldEvent};
use crate::form::FormId;

pub use config::{
    Condition, FieldConfig, FlexibleItemValue, FlexibleLayout, OptionsLoader, ValidateFn,
    ValueFetcher, Values,
};
pub use options::OptionsState;
pub use registry::{FieldBuilder, FieldFactory, FieldRegistry, OverridePolicy};

pub const FIELD_TYPE_TEXT: &str = "text";
pub const FIELD_TYPE_TEXTAREA: &str = "textarea";
pub const FIELD_TYPE_NUMBER: &str = "number";
pub const FIELD_TYPE_BOOLEAN: &str = "boolean";
pub const FIELD_TYPE_DATE: &str = "date";
pub const FIELD_TYPE_GROUP: &str = "group";
pub const FIELD_TYPE_REPEATER: &str = "repeater";
pub const FIELD_TYPE_FLEXIBLE: &str = "flexible";

/// One item of a flexible field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexibleItem {
    pub layout: String,
    pub form: FormId,
}

/// Kind-specific field state
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Primitive { value: Value },
    Group { form: FormId },
    Repeater { rows: Vec<FormId> },
    Flexible { items: Vec<FlexibleItem> },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Primitive { .. } => "primitive",
            FieldKind::Group { .. } => "group",
            FieldKind::Repeater { .. } => "repeater",
            FieldKind::Flexible { .. } => "flexible",
        }
    }

    pub fn is_composite(&self) -> bool {
        !matches!(self, FieldKind::Primitive { .. })
    }

    /// Handles of every child form owned by this field, in order
    pub fn child_forms(&self) -> Vec<FormId> {
        match self {
            FieldKind::Primitive { .. } => Vec::new(),
            FieldKind::Group { form } => vec![*form],
            FieldKind::Repeater { rows } => rows.clone(),
            FieldKind::Flexible { items } => items.iter().map(|item| item.form).collect(),
        }
    }

    /// Number of rows (repeater) or items (flexible)
    pub fn row_count(&self) -> Option<usize> {
        match self {
            FieldKind::Repeater { rows } => Some(rows.len()),
            FieldKind::Flexible { items } => Some(items.len()),
            _ => None,
        }
    }
}

/// A field instance inside a form
#[derive(Debug)]
pub struct Field {
    config: Arc<FieldConfig>,
    kind: FieldKind,
    pub(crate) events: EventEmitter<FieldEvent>,
    pub(crate) options: OptionsState,
}

impl Field {
    fn with_kind(config: FieldConfig, kind: FieldKind) -> Self {
        Self {
            config: Arc::new(config),
            kind,
            events: EventEmitter::new(),
            options: OptionsState::default(),
        }
    }

    /// A scalar field starting at its declared default (or null)
    pub fn primitive(config: FieldConfig) -> Self {
        let value = config.default_value.clone().unwrap_or(Value::Null);
        Self::with_kind(config, FieldKind::Primitive { value })
    }

    pub fn group(config: FieldConfig, form: FormId) -> Self {
        Self::with_kind(config, FieldKind::Group { form })
    }

    pub fn repeater(config: FieldConfig, rows: Vec<FormId>) -> Self {
        Self::with_kind(config, FieldKind::Repeater { rows })
    }

    pub fn flexible(config: FieldConfig, items: Vec<FlexibleItem>) -> Self {
        Self::with_kind(config, FieldKind::Flexible { items })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub(crate) fn shared_config(&self) -> Arc<FieldConfig> {
        self.config.clone()
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut FieldKind {
        &mut self.kind
    }

    pub fn options(&self) -> &OptionsState {
        &self.options
    }
}
