//! Forms
//!
//! A [`Form`] owns a tree of form nodes built from a declaration. The root
//! node holds the top-level fields; group, repeater and flexible fields own
//! further nodes in the same [`FormArena`]. Everything is addressed by
//! [field paths](FieldPath) such as `profile.website` or `blocks[1].body`.
//!
//! Values are computed on read and errors on validation; neither is cached
//! beyond the last validation pass.

mod arena;
pub(crate) mod composite;
mod path;

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{join_all, FutureExt};
use serde_json::Value;

use crate::config::Messages;
use crate::error::{FormError, Result};
use crate::events::{FieldEvent, FieldEventKind, FormEvent, FormEventKind, SubId};
use crate::field::{Condition, Field, FieldConfig, FieldKind, FieldRegistry, OptionsState, Values};
use crate::validation;

pub use arena::{FormArena, FormId, FormNode, ParentLink};
pub use path::{FieldPath, PathSegment};

use arena::missing_node;

/// Where a path walk ended
#[derive(Debug, Clone, Copy)]
enum Cursor {
    Form(FormId),
    Field(FormId, usize),
}

/// One field scheduled for validation
struct Target {
    form: FormId,
    config: Arc<FieldConfig>,
    value: Value,
    values: Arc<Values>,
}

/// Fields to check and forms whose error maps get replaced
#[derive(Default)]
struct ValidationPlan {
    targets: Vec<Target>,
    visited: Vec<FormId>,
    hidden: Vec<FormId>,
}

/// A live form built from field declarations
#[derive(Debug)]
pub struct Form {
    arena: FormArena,
    root: FormId,
    registry: Arc<FieldRegistry>,
    messages: Arc<Messages>,
}

impl Form {
    /// Build a form with the default validation messages
    pub fn new(fields: Vec<FieldConfig>, registry: Arc<FieldRegistry>) -> Result<Self> {
        Self::with_messages(fields, registry, Messages::default())
    }

    /// Build a form reporting validation failures with `messages`.
    ///
    /// Every type in the declaration tree is checked against the registry
    /// before any field is created.
    pub fn with_messages(
        fields: Vec<FieldConfig>,
        registry: Arc<FieldRegistry>,
        messages: Messages,
    ) -> Result<Self> {
        registry.check_declarations(&fields)?;

        let mut arena = FormArena::new();
        let root = arena.build_form(&registry, &fields, None, None)?;
        tracing::debug!(fields = fields.len(), forms = arena.len(), "form constructed");

        Ok(Self {
            arena,
            root,
            registry,
            messages: Arc::new(messages),
        })
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    /// Read access to every form node of this tree
    pub fn arena(&self) -> &FormArena {
        &self.arena
    }

    pub fn root(&self) -> FormId {
        self.root
    }

    /// Number of form nodes, the root included
    pub fn form_count(&self) -> usize {
        self.arena.len()
    }

    /// Names of the top-level fields, in declaration order
    pub fn field_names(&self) -> Vec<&str> {
        self.arena
            .node(self.root)
            .map(|node| node.fields().iter().map(Field::name).collect())
            .unwrap_or_default()
    }

    pub fn field(&self, path: &str) -> Result<&Field> {
        let (form, index) = self.locate(path)?;
        self.field_at(form, index)
    }

    pub fn field_config(&self, path: &str) -> Result<&FieldConfig> {
        Ok(self.field(path)?.config())
    }

    pub fn field_kind(&self, path: &str) -> Result<&FieldKind> {
        Ok(self.field(path)?.kind())
    }

    // ---------------------------------------------------------------------
    // Values
    // ---------------------------------------------------------------------

    pub fn get_value(&self, path: &str) -> Result<Value> {
        let field = self.field(path)?;
        Ok(self.arena.field_value(field))
    }

    /// Replace the value of a field and notify subscribers up to the root
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<()> {
        let (form, index) = self.locate(path)?;
        self.arena.assign(&self.registry, form, index, value)?;
        self.arena.notify_change(form, index);
        Ok(())
    }

    /// Fresh value record of the whole tree
    pub fn get_values(&self) -> Values {
        self.arena.values(self.root)
    }

    /// Value record of the form at `form_path` (`""` for the root)
    pub fn values_at(&self, form_path: &str) -> Result<Values> {
        let form = self.locate_form(form_path)?;
        Ok(self.arena.values(form))
    }

    // ---------------------------------------------------------------------
    // Visibility
    // ---------------------------------------------------------------------

    /// Unknown fields are reported as hidden
    pub fn is_field_visible(&self, path: &str) -> bool {
        self.condition_holds(path, |config| config.visible_if.as_ref())
    }

    /// Unknown fields are reported as disabled
    pub fn is_field_enabled(&self, path: &str) -> bool {
        self.condition_holds(path, |config| config.enabled_if.as_ref())
    }

    fn condition_holds(&self, path: &str, pick: impl Fn(&FieldConfig) -> Option<&Condition>) -> bool {
        let Ok((form, index)) = self.locate(path) else {
            return false;
        };
        let Ok(field) = self.field_at(form, index) else {
            return false;
        };
        match pick(field.config()) {
            Some(condition) => condition(&self.arena.values(form)),
            None => true,
        }
    }

    // ---------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------

    /// Validate every visible field, descending into visible composite fields.
    ///
    /// Each visited form's error map is replaced; forms below hidden fields are
    /// cleared. Pending async validators count as passing. Returns true when no
    /// visited form recorded an error, so the root map can be empty while a
    /// nested row still fails.
    pub fn validate(&mut self) -> bool {
        let plan = self.plan();
        let results: Vec<_> = plan
            .targets
            .iter()
            .map(|t| validation::validate_field(&t.config, &t.value, &t.values, &self.messages))
            .collect();
        self.apply(plan, results)
    }

    /// Like [`validate`](Self::validate), awaiting async validators concurrently.
    /// The result covers the whole tree, not only the root map.
    pub async fn validate_async(&mut self) -> bool {
        let plan = self.plan();
        let checks = plan.targets.iter().map(|t| {
            validation::validate_field_async(
                t.config.clone(),
                t.value.clone(),
                (*t.values).clone(),
                self.messages.clone(),
            )
        });
        let results = join_all(checks).await;
        self.apply(plan, results)
    }

    /// Check one field against the current values, leaving error maps untouched
    pub fn validate_field(&self, path: &str) -> Result<Option<String>> {
        let (form, index) = self.locate(path)?;
        let field = self.field_at(form, index)?;
        let values = self.arena.values(form);
        let value = self.arena.field_value(field);
        Ok(validation::validate_field(field.config(), &value, &values, &self.messages))
    }

    pub async fn validate_field_async(&self, path: &str) -> Result<Option<String>> {
        let (form, index) = self.locate(path)?;
        let field = self.field_at(form, index)?;
        let values = self.arena.values(form);
        let value = self.arena.field_value(field);
        let check = validation::validate_field_async(
            field.shared_config(),
            value,
            values,
            self.messages.clone(),
        );
        Ok(check.await)
    }

    /// Error map of the root form from the last validation pass
    pub fn errors(&self) -> &BTreeMap<String, String> {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        self.arena
            .node(self.root)
            .map(FormNode::errors)
            .unwrap_or(&EMPTY)
    }

    /// Last computed error of one field
    pub fn field_error(&self, path: &str) -> Option<&str> {
        let (form, index) = self.locate(path).ok()?;
        let node = self.arena.node(form)?;
        let name = node.fields().get(index)?.name();
        node.errors().get(name).map(String::as_str)
    }

    /// Every stored error in the tree, keyed by field path
    pub fn all_errors(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        self.collect_errors(self.root, &FieldPath::root(), &mut errors);
        errors
    }

    fn collect_errors(&self, form: FormId, prefix: &FieldPath, out: &mut BTreeMap<String, String>) {
        let Some(node) = self.arena.node(form) else {
            return;
        };
        for field in node.fields() {
            let path = prefix.clone().field(field.name());
            if let Some(error) = node.errors().get(field.name()) {
                out.insert(path.to_string(), error.clone());
            }
            match field.kind() {
                FieldKind::Primitive { .. } => {}
                FieldKind::Group { form } => self.collect_errors(*form, &path, out),
                FieldKind::Repeater { .. } | FieldKind::Flexible { .. } => {
                    for (i, child) in field.kind().child_forms().into_iter().enumerate() {
                        self.collect_errors(child, &path.clone().index(i), out);
                    }
                }
            }
        }
    }

    fn plan(&self) -> ValidationPlan {
        let mut plan = ValidationPlan::default();
        self.plan_form(self.root, &mut plan);
        plan
    }

    fn plan_form(&self, form: FormId, plan: &mut ValidationPlan) {
        let Some(node) = self.arena.node(form) else {
            return;
        };
        plan.visited.push(form);
        let values = Arc::new(self.arena.values(form));

        for field in node.fields() {
            let visible = field
                .config()
                .visible_if
                .as_ref()
                .map_or(true, |condition| condition(values.as_ref()));
            if !visible {
                for child in field.kind().child_forms() {
                    self.plan_hidden(child, plan);
                }
                continue;
            }

            plan.targets.push(Target {
                form,
                config: field.shared_config(),
                value: values.get(field.name()).cloned().unwrap_or(Value::Null),
                values: values.clone(),
            });
            for child in field.kind().child_forms() {
                self.plan_form(child, plan);
            }
        }
    }

    fn plan_hidden(&self, form: FormId, plan: &mut ValidationPlan) {
        let Some(node) = self.arena.node(form) else {
            return;
        };
        plan.hidden.push(form);
        for field in node.fields() {
            for child in field.kind().child_forms() {
                self.plan_hidden(child, plan);
            }
        }
    }

    fn apply(&mut self, plan: ValidationPlan, results: Vec<Option<String>>) -> bool {
        let mut maps: Vec<(FormId, BTreeMap<String, String>)> = plan
            .visited
            .iter()
            .chain(&plan.hidden)
            .map(|form| (*form, BTreeMap::new()))
            .collect();
        let slots: HashMap<FormId, usize> = maps
            .iter()
            .enumerate()
            .map(|(i, (form, _))| (*form, i))
            .collect();

        let mut valid = true;
        for (target, result) in plan.targets.iter().zip(results) {
            let Some(message) = result else {
                continue;
            };
            valid = false;
            if let Some(slot) = slots.get(&target.form) {
                maps[*slot].1.insert(target.config.name.clone(), message);
            }
        }

        for (form, errors) in maps {
            self.replace_errors(form, errors);
        }
        tracing::debug!(valid, fields = plan.targets.len(), "validation pass finished");
        valid
    }

    /// Swap in a new error map and announce every entry that changed
    fn replace_errors(&mut self, form: FormId, errors: BTreeMap<String, String>) {
        let Some(node) = self.arena.node_mut(form) else {
            return;
        };
        let previous = std::mem::replace(&mut node.errors, errors);

        let mut changed: Vec<(String, Option<String>)> = node
            .errors
            .iter()
            .filter(|(name, error)| previous.get(*name) != Some(*error))
            .map(|(name, error)| (name.clone(), Some(error.clone())))
            .collect();
        changed.extend(
            previous
                .into_keys()
                .filter(|name| !node.errors.contains_key(name))
                .map(|name| (name, None)),
        );

        for (name, error) in changed {
            node.events.emit(&FormEvent::FieldError { name, error });
        }
    }

    // ---------------------------------------------------------------------
    // Rows and items
    // ---------------------------------------------------------------------

    /// Append a row to a repeater, seeding it from `seed`
    pub fn add_row(&mut self, path: &str, seed: Option<&Values>) -> Result<()> {
        let (form, index) = self.locate(path)?;
        self.arena.add_row(&self.registry, form, index, seed)?;
        self.arena.notify_change(form, index);
        Ok(())
    }

    pub fn remove_row(&mut self, path: &str, row: usize) -> Result<()> {
        let (form, index) = self.locate(path)?;
        self.arena.remove_row(&self.registry, form, index, row)?;
        self.arena.notify_change(form, index);
        Ok(())
    }

    /// Append an item using the named layout of a flexible field
    pub fn add_item(&mut self, path: &str, layout: &str, seed: Option<&Values>) -> Result<()> {
        let (form, index) = self.locate(path)?;
        self.arena.add_item(&self.registry, form, index, layout, seed)?;
        self.arena.notify_change(form, index);
        Ok(())
    }

    pub fn remove_item(&mut self, path: &str, item: usize) -> Result<()> {
        let (form, index) = self.locate(path)?;
        self.arena.remove_item(&self.registry, form, index, item)?;
        self.arena.notify_change(form, index);
        Ok(())
    }

    /// Rows of a repeater or items of a flexible field
    pub fn row_count(&self, path: &str) -> Result<usize> {
        let field = self.field(path)?;
        field.kind().row_count().ok_or_else(|| FormError::KindMismatch {
            field: path.to_string(),
            expected: "repeater or flexible",
            found: field.kind().name(),
        })
    }

    /// Re-apply row limits; returns whether rows were added or dropped
    pub fn enforce_row_limits(&mut self, path: &str) -> Result<bool> {
        let (form, index) = self.locate(path)?;
        let changed = self.arena.enforce_stored(&self.registry, form, index)?;
        if changed {
            self.arena.notify_change(form, index);
        }
        Ok(changed)
    }

    // ---------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------

    /// Subscribe to events of the form at `form_path` (`""` for the root)
    pub fn on(
        &mut self,
        form_path: &str,
        kind: FormEventKind,
        callback: impl FnMut(&FormEvent) + Send + 'static,
    ) -> Result<SubId> {
        let form = self.locate_form(form_path)?;
        let node = self.arena.node_mut(form).ok_or_else(missing_node)?;
        Ok(node.events.on(kind, callback))
    }

    pub fn once(
        &mut self,
        form_path: &str,
        kind: FormEventKind,
        callback: impl FnMut(&FormEvent) + Send + 'static,
    ) -> Result<SubId> {
        let form = self.locate_form(form_path)?;
        let node = self.arena.node_mut(form).ok_or_else(missing_node)?;
        Ok(node.events.once(kind, callback))
    }

    pub fn off(&mut self, form_path: &str, id: SubId) -> Result<bool> {
        let form = self.locate_form(form_path)?;
        let node = self.arena.node_mut(form).ok_or_else(missing_node)?;
        Ok(node.events.off(id))
    }

    /// Subscribe to value changes of one field
    pub fn on_field_change(
        &mut self,
        path: &str,
        mut callback: impl FnMut(&Value) + Send + 'static,
    ) -> Result<SubId> {
        let field = self.field_mut(path)?;
        Ok(field.events.on(FieldEventKind::Change, move |event| match event {
            FieldEvent::Change { value } => callback(value),
        }))
    }

    pub fn off_field_change(&mut self, path: &str, id: SubId) -> Result<bool> {
        Ok(self.field_mut(path)?.events.off(id))
    }

    // ---------------------------------------------------------------------
    // Options
    // ---------------------------------------------------------------------

    /// Run the field's option loader with the owning form's values.
    ///
    /// A failing loader yields no options and leaves its message in
    /// [`OptionsState::load_error`]; previously loaded options are kept.
    pub async fn fetch_options(&mut self, path: &str, search: &str) -> Result<Vec<Value>> {
        let (form, index) = self.locate(path)?;
        let Some(loader) = self.field_at(form, index)?.config().async_options.clone() else {
            return Ok(Vec::new());
        };
        let values = self.arena.values(form);
        self.field_at_mut(form, index)?.options.begin();

        let outcome = AssertUnwindSafe(loader(search.to_string(), values))
            .catch_unwind()
            .await;
        let settled = match outcome {
            Ok(Ok(options)) => Ok(options),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err("option loader panicked".to_string()),
        };
        if let Err(message) = &settled {
            tracing::warn!(field = %path, error = %message, "loading options failed");
        }

        Ok(self.field_at_mut(form, index)?.options.finish(settled))
    }

    pub fn options(&self, path: &str) -> Result<&OptionsState> {
        Ok(self.field(path)?.options())
    }

    /// Resolve a full value from an identifier; `None` when no fetcher is declared
    pub async fn fetch_value(&self, path: &str, id: Value) -> Result<Option<Value>> {
        let (form, index) = self.locate(path)?;
        let Some(fetcher) = self.field_at(form, index)?.config().fetch_value.clone() else {
            return Ok(None);
        };
        let values = self.arena.values(form);
        fetcher(id, values)
            .await
            .map(Some)
            .map_err(|err| FormError::FetchFailed {
                field: path.to_string(),
                message: err.to_string(),
            })
    }

    // ---------------------------------------------------------------------
    // Path resolution
    // ---------------------------------------------------------------------

    fn field_at(&self, form: FormId, index: usize) -> Result<&Field> {
        self.arena
            .node(form)
            .and_then(|node| node.fields().get(index))
            .ok_or_else(missing_node)
    }

    fn field_at_mut(&mut self, form: FormId, index: usize) -> Result<&mut Field> {
        self.arena
            .node_mut(form)
            .and_then(|node| node.fields.get_mut(index))
            .ok_or_else(missing_node)
    }

    fn field_mut(&mut self, path: &str) -> Result<&mut Field> {
        let (form, index) = self.locate(path)?;
        self.field_at_mut(form, index)
    }

    /// Resolve a path to the form owning the field and the field's position
    fn locate(&self, path: &str) -> Result<(FormId, usize)> {
        let parsed = FieldPath::parse(path)?;
        if parsed.is_root() {
            return Err(invalid_path(path, "empty path"));
        }
        match self.walk(&parsed, path)? {
            Cursor::Field(form, index) => Ok((form, index)),
            Cursor::Form(_) => Err(invalid_path(path, "path addresses a form, not a field")),
        }
    }

    /// Resolve a path to a form: the root, a group's form, a row or an item
    fn locate_form(&self, path: &str) -> Result<FormId> {
        let parsed = FieldPath::parse(path)?;
        match self.walk(&parsed, path)? {
            Cursor::Form(form) => Ok(form),
            Cursor::Field(form, index) => match self.field_at(form, index)?.kind() {
                FieldKind::Group { form } => Ok(*form),
                _ => Err(invalid_path(path, "path addresses a field, not a form")),
            },
        }
    }

    fn walk(&self, parsed: &FieldPath, path: &str) -> Result<Cursor> {
        let mut cursor = Cursor::Form(self.root);
        for segment in parsed.segments() {
            cursor = match (cursor, segment) {
                (Cursor::Form(form), PathSegment::Field(name)) => self.lookup(form, name, path)?,
                (Cursor::Field(form, index), PathSegment::Field(name)) => {
                    match self.field_at(form, index)?.kind() {
                        FieldKind::Group { form } => self.lookup(*form, name, path)?,
                        FieldKind::Repeater { .. } | FieldKind::Flexible { .. } => {
                            return Err(invalid_path(path, "row index required"));
                        }
                        FieldKind::Primitive { .. } => {
                            return Err(invalid_path(path, "primitive fields have no children"));
                        }
                    }
                }
                (Cursor::Field(form, index), PathSegment::Index(row)) => {
                    let field = self.field_at(form, index)?;
                    if field.kind().row_count().is_none() {
                        return Err(FormError::KindMismatch {
                            field: field.name().to_string(),
                            expected: "repeater or flexible",
                            found: field.kind().name(),
                        });
                    }
                    let rows = field.kind().child_forms();
                    let child = rows.get(*row).ok_or_else(|| FormError::RowOutOfRange {
                        field: field.name().to_string(),
                        index: *row,
                        len: rows.len(),
                    })?;
                    Cursor::Form(*child)
                }
                (Cursor::Form(_), PathSegment::Index(_)) => {
                    return Err(invalid_path(
                        path,
                        "row index must follow a repeater or flexible field",
                    ));
                }
            };
        }
        Ok(cursor)
    }

    fn lookup(&self, form: FormId, name: &str, path: &str) -> Result<Cursor> {
        let node = self.arena.node(form).ok_or_else(missing_node)?;
        node.position(name)
            .map(|index| Cursor::Field(form, index))
            .ok_or_else(|| FormError::UnknownField(path.to_string()))
    }
}

fn invalid_path(path: &str, reason: &str) -> FormError {
    FormError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(fields: Vec<FieldConfig>) -> Form {
        Form::new(fields, Arc::new(FieldRegistry::with_builtins())).unwrap()
    }

    #[test]
    fn test_paths_resolve_through_composites() {
        let form = form(vec![
            FieldConfig::group("profile", vec![FieldConfig::text("website")]),
            FieldConfig::repeater("tags", vec![FieldConfig::text("label")])
                .with_default(json!([{ "label": "a" }, { "label": "b" }])),
        ]);

        assert_eq!(form.get_value("tags[1].label").unwrap(), json!("b"));
        assert_eq!(form.get_value("profile.website").unwrap(), Value::Null);
        assert!(matches!(
            form.get_value("tags[5].label"),
            Err(FormError::RowOutOfRange { index: 5, len: 2, .. })
        ));
        assert!(matches!(
            form.get_value("tags.label"),
            Err(FormError::InvalidPath { .. })
        ));
        assert!(matches!(
            form.get_value("profile[0]"),
            Err(FormError::KindMismatch { .. })
        ));
        assert!(matches!(
            form.get_value("tags[0]"),
            Err(FormError::InvalidPath { .. })
        ));
        assert!(matches!(
            form.get_value("profile.nope"),
            Err(FormError::UnknownField(p)) if p == "profile.nope"
        ));
    }

    #[test]
    fn test_values_at_addresses_nested_forms() {
        let form = form(vec![FieldConfig::repeater("tags", vec![FieldConfig::text("label")])
            .with_default(json!([{ "label": "x" }]))]);

        assert_eq!(
            Value::Object(form.values_at("tags[0]").unwrap()),
            json!({ "label": "x" })
        );
        assert_eq!(
            Value::Object(form.values_at("").unwrap()),
            json!({ "tags": [{ "label": "x" }] })
        );
        assert!(form.values_at("tags").is_err());
    }

    #[test]
    fn test_field_names_and_kinds() {
        let form = form(vec![
            FieldConfig::text("title"),
            FieldConfig::flexible("blocks", vec![]),
        ]);
        assert_eq!(form.field_names(), vec!["title", "blocks"]);
        assert_eq!(form.field_kind("blocks").unwrap().name(), "flexible");
        assert_eq!(form.row_count("blocks").unwrap(), 0);
        assert!(matches!(
            form.row_count("title"),
            Err(FormError::KindMismatch { .. })
        ));
    }
}
