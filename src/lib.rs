//! Familiar Forms
//!
//! A declarative form model: given a tree of field declarations it keeps
//! live values, applies validation rules and evaluates visibility and
//! enablement predicates against the current values.
//!
//! ## Features
//!
//! - **Field types**: text, textarea, number, boolean and date primitives, plus
//!   composite group, repeater and flexible fields that own nested forms
//! - **Pluggable registry**: field types are factories in an explicit
//!   [`FieldRegistry`] handed to each form
//! - **Validation**: required-ness, custom sync/async validators and schema
//!   validators (JSON Schema, regex patterns)
//! - **Change notification**: per-field and per-form subscriptions; changes in
//!   nested forms bubble up to every ancestor
//! - **Declarations**: forms can be described in JSON or TOML
//!
//! ## Architecture
//!
//! ```text
//! Form
//! └── FormArena
//!     ├── root node ── title (text)
//!     │             ├── profile (group) ─────► node: website, location
//!     │             ├── tags (repeater) ─────► row nodes: label
//!     │             └── blocks (flexible) ───► item nodes: layout-specific fields
//!     └── ...
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use familiar_forms::{FieldConfig, FieldRegistry, Form};
//! use serde_json::json;
//!
//! let registry = Arc::new(FieldRegistry::with_builtins());
//! let mut form = Form::new(
//!     vec![
//!         FieldConfig::text("username").with_required(true),
//!         FieldConfig::repeater("tags", vec![FieldConfig::text("label")]).with_min_rows(1),
//!     ],
//!     registry,
//! )
//! .unwrap();
//!
//! assert!(!form.validate());
//! assert_eq!(form.errors()["username"], "Field is required");
//!
//! form.set_value("username", json!("ada")).unwrap();
//! form.set_value("tags[0].label", json!("rust")).unwrap();
//! assert!(form.validate());
//! assert_eq!(form.get_values()["tags"], json!([{ "label": "rust" }]));
//! ```

pub mod config;
pub mod declaration;
pub mod error;
pub mod events;
pub mod field;
pub mod form;
pub mod plugin;
pub mod schema;
pub mod validation;

pub use config::{FormsConfig, Messages, RegistryConfig};
pub use declaration::FormDeclaration;
pub use error::{BoxError, FormError, Result};
pub use events::{
    Event, EventEmitter, FieldEvent, FieldEventKind, FormEvent, FormEventKind, SubId,
};
pub use field::{
    Field, FieldBuilder, FieldConfig, FieldFactory, FieldKind, FieldRegistry, FlexibleItem,
    FlexibleItemValue, FlexibleLayout, OptionsState, OverridePolicy, Values,
};
pub use form::{FieldPath, Form, FormId, PathSegment};
pub use plugin::{Plugin, PluginHost};
pub use schema::{JsonSchemaValidator, PatternValidator};
pub use validation::{SchemaValidator, SchemaViolation, Verdict};
