//! Form node storage
//!
//! Every form of one tree (the root, group children, repeater rows, flexible
//! items) lives in a [`FormArena`] and is addressed by a [`FormId`]. Composite
//! fields hold the handles of the nodes they own; each child node keeps a
//! [`ParentLink`] back to the composite field so changes can bubble upwards.
//! Slots are recycled, and a generation counter keeps stale handles from
//! resolving to a recycled node.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{json, Value};

use crate::error::{FormError, Result};
use crate::events::{EventEmitter, FieldEvent, FormEvent};
use crate::field::{Field, FieldBuilder, FieldConfig, FieldKind, FieldRegistry, Values};

/// Handle of a form node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormId {
    index: usize,
    generation: u32,
}

/// Back-reference from a child form to the composite field owning it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub form: FormId,
    pub field: String,
}

/// One form: its fields, last computed errors and subscribers
#[derive(Debug)]
pub struct FormNode {
    pub(crate) fields: Vec<Field>,
    index: HashMap<String, usize>,
    pub(crate) errors: BTreeMap<String, String>,
    pub(crate) events: EventEmitter<FormEvent>,
    parent: Option<ParentLink>,
}

impl FormNode {
    fn new(parent: Option<ParentLink>) -> Self {
        Self {
            fields: Vec::new(),
            index: HashMap::new(),
            errors: BTreeMap::new(),
            events: EventEmitter::new(),
            parent,
        }
    }

    fn install(&mut self, fields: Vec<Field>) {
        self.index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().to_string(), i))
            .collect();
        self.fields = fields;
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.position(name).and_then(|i| self.fields.get(i))
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<FormNode>,
}

/// Storage for all form nodes of one tree
#[derive(Debug, Default)]
pub struct FormArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl FormArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live form nodes
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node(&self, id: FormId) -> Option<&FormNode> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn node_mut(&mut self, id: FormId) -> Option<&mut FormNode> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn insert(&mut self, node: FormNode) -> FormId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                FormId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                FormId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Free a form node and every form nested below it
    pub(crate) fn remove(&mut self, id: FormId) {
        let Some(slot) = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        let Some(node) = slot.node.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        for field in &node.fields {
            for child in field.kind().child_forms() {
                self.remove(child);
            }
        }
    }

    /// Build a form from a field template.
    ///
    /// A key present in `seed` replaces the declared default of the matching
    /// field; keys naming no field are rejected. On failure nothing built so far
    /// is left in the arena.
    pub(crate) fn build_form(
        &mut self,
        registry: &FieldRegistry,
        template: &[FieldConfig],
        seed: Option<&Values>,
        parent: Option<ParentLink>,
    ) -> Result<FormId> {
        check_names(template)?;
        if let Some(seed) = seed {
            if let Some(key) = seed
                .keys()
                .find(|key| !template.iter().any(|f| &f.name == *key))
            {
                return Err(FormError::UnknownField(key.clone()));
            }
        }

        let id = self.insert(FormNode::new(parent));
        let mut fields = Vec::with_capacity(template.len());
        for declared in template {
            let mut config = declared.clone();
            if let Some(value) = seed.and_then(|s| s.get(&config.name)) {
                config.default_value = Some(value.clone());
            }
            let field_type = config.field_type.clone();
            let link = ParentLink {
                form: id,
                field: config.name.clone(),
            };

            let built = {
                let mut builder = FieldBuilder::new(self, registry, link);
                registry.create(&field_type, config, &mut builder)
            };
            match built {
                Ok(field) => fields.push(field),
                Err(err) => {
                    for field in &fields {
                        for child in field.kind().child_forms() {
                            self.remove(child);
                        }
                    }
                    self.remove(id);
                    return Err(err);
                }
            }
        }

        if let Some(node) = self.node_mut(id) {
            node.install(fields);
        }
        Ok(id)
    }

    /// Fresh value record of one form, recursing into composite fields
    pub fn values(&self, id: FormId) -> Values {
        let mut values = Values::new();
        if let Some(node) = self.node(id) {
            for field in &node.fields {
                values.insert(field.name().to_string(), self.field_value(field));
            }
        }
        values
    }

    /// Current value of a field; composite values are derived from child forms
    pub fn field_value(&self, field: &Field) -> Value {
        match field.kind() {
            FieldKind::Primitive { value } => value.clone(),
            FieldKind::Group { form } => Value::Object(self.values(*form)),
            FieldKind::Repeater { rows } => Value::Array(
                rows.iter()
                    .map(|row| Value::Object(self.values(*row)))
                    .collect(),
            ),
            FieldKind::Flexible { items } => Value::Array(
                items
                    .iter()
                    .map(|item| json!({ "layout": item.layout, "values": self.values(item.form) }))
                    .collect(),
            ),
        }
    }

    /// Run `update` on the kind of one field while it is detached from the arena.
    ///
    /// The field reads as an empty primitive for the duration of the call.
    pub(crate) fn update_kind<R>(
        &mut self,
        form: FormId,
        index: usize,
        update: impl FnOnce(&mut Self, &FieldConfig, &mut FieldKind) -> Result<R>,
    ) -> Result<R> {
        let (config, mut kind) = {
            let field = self
                .node_mut(form)
                .and_then(|node| node.fields.get_mut(index))
                .ok_or_else(missing_node)?;
            let placeholder = FieldKind::Primitive { value: Value::Null };
            (field.shared_config(), std::mem::replace(field.kind_mut(), placeholder))
        };

        let result = update(self, &config, &mut kind);

        if let Some(field) = self.node_mut(form).and_then(|node| node.fields.get_mut(index)) {
            *field.kind_mut() = kind;
        }
        result
    }

    /// Emit change events for a field and every composite field above it
    pub(crate) fn notify_change(&mut self, form: FormId, index: usize) {
        let mut current = Some((form, index));
        while let Some((form, index)) = current {
            current = self.notify_local(form, index);
        }
    }

    /// Emit change events for one field only.
    ///
    /// Returns the position of the composite field owning `form`, if any.
    pub(crate) fn notify_local(&mut self, form: FormId, index: usize) -> Option<(FormId, usize)> {
        let field = self.node(form).and_then(|node| node.fields.get(index))?;
        let name = field.name().to_string();
        let value = self.field_value(field);

        let node = self.node_mut(form)?;
        if let Some(field) = node.fields.get_mut(index) {
            field.events.emit(&FieldEvent::Change {
                value: value.clone(),
            });
        }
        node.events.emit(&FormEvent::FieldChange { name, value });

        let link = node.parent.clone()?;
        let position = self.node(link.form)?.position(&link.field)?;
        Some((link.form, position))
    }
}

pub(crate) fn missing_node() -> FormError {
    FormError::InvalidConfig("form node no longer exists".into())
}

fn check_names(template: &[FieldConfig]) -> Result<()> {
    let mut seen = HashSet::with_capacity(template.len());
    for field in template {
        if field.name.is_empty() || field.name.contains(|c| matches!(c, '.' | '[' | ']')) {
            return Err(FormError::InvalidFieldName(field.name.clone()));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(FormError::DuplicateFieldName(field.name.clone()));
        }
    }
    Ok(())
}
