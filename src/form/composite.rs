//! Composite field operations
//!
//! Row and item bookkeeping for repeater and flexible fields, value
//! forwarding for groups, and the cardinality rule shared by both
//! multi-row kinds: after every mutation the row count is pulled back into
//! `minRows..=maxRows` by appending template rows or dropping the tail.

use serde_json::Value;

use crate::error::{FormError, Result};
use crate::field::{
    Field, FieldConfig, FieldKind, FieldRegistry, FlexibleItem, FlexibleItemValue, Values,
};

use super::arena::{missing_node, FormArena, FormId, ParentLink};

/// `minRows` must not exceed `maxRows`
pub(crate) fn check_row_limits(config: &FieldConfig) -> Result<()> {
    match (config.min_rows, config.max_rows) {
        (Some(min), Some(max)) if min > max => Err(FormError::InvalidRowLimits {
            field: config.name.clone(),
            min,
            max,
        }),
        _ => Ok(()),
    }
}

/// A group value: an object, or null for "no seed"
pub(crate) fn parse_record(field: &str, value: &Value) -> Result<Option<Values>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(record) => Ok(Some(record.clone())),
        _ => Err(FormError::TypeMismatch {
            field: field.to_string(),
            expected: "object",
        }),
    }
}

/// A repeater value: an array of row records
pub(crate) fn parse_rows(field: &str, value: &Value) -> Result<Vec<Values>> {
    let mismatch = || FormError::TypeMismatch {
        field: field.to_string(),
        expected: "array of objects",
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(rows) => rows
            .iter()
            .map(|row| match row {
                Value::Object(record) => Ok(record.clone()),
                Value::Null => Ok(Values::new()),
                _ => Err(mismatch()),
            })
            .collect(),
        _ => Err(mismatch()),
    }
}

/// A flexible value: an array of `{layout, values}` items
pub(crate) fn parse_items(field: &str, value: &Value) -> Result<Vec<FlexibleItemValue>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value.clone()).map_err(|_| FormError::TypeMismatch {
        field: field.to_string(),
        expected: "array of {layout, values} objects",
    })
}

fn kind_mismatch(config: &FieldConfig, expected: &'static str, kind: &FieldKind) -> FormError {
    FormError::KindMismatch {
        field: config.name.clone(),
        expected,
        found: kind.name(),
    }
}

fn unknown_layout(config: &FieldConfig, layout: &str) -> FormError {
    FormError::UnknownLayout {
        field: config.name.clone(),
        layout: layout.to_string(),
    }
}

impl FormArena {
    fn link(&self, form: FormId, index: usize) -> Result<ParentLink> {
        let field = self
            .node(form)
            .and_then(|node| node.fields.get(index))
            .ok_or_else(missing_node)?;
        Ok(ParentLink {
            form,
            field: field.name().to_string(),
        })
    }

    /// Build one row per seed, all or nothing
    pub(crate) fn build_rows(
        &mut self,
        registry: &FieldRegistry,
        template: &[FieldConfig],
        seeds: &[Values],
        parent: &ParentLink,
    ) -> Result<Vec<FormId>> {
        let mut rows = Vec::with_capacity(seeds.len());
        for seed in seeds {
            match self.build_form(registry, template, Some(seed), Some(parent.clone())) {
                Ok(row) => rows.push(row),
                Err(err) => {
                    for row in rows {
                        self.remove(row);
                    }
                    return Err(err);
                }
            }
        }
        Ok(rows)
    }

    /// Build flexible items; every layout is resolved before any form is built
    pub(crate) fn build_items(
        &mut self,
        registry: &FieldRegistry,
        config: &FieldConfig,
        items: &[FlexibleItemValue],
        parent: &ParentLink,
    ) -> Result<Vec<FlexibleItem>> {
        let layouts = items
            .iter()
            .map(|item| {
                config
                    .layout(&item.layout)
                    .ok_or_else(|| unknown_layout(config, &item.layout))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut built = Vec::with_capacity(items.len());
        for (item, layout) in items.iter().zip(layouts) {
            match self.build_form(registry, &layout.fields, Some(&item.values), Some(parent.clone())) {
                Ok(form) => built.push(FlexibleItem {
                    layout: layout.name.clone(),
                    form,
                }),
                Err(err) => {
                    for item in built {
                        self.remove(item.form);
                    }
                    return Err(err);
                }
            }
        }
        Ok(built)
    }

    /// Apply row limits to a field that is not stored in the arena yet
    pub(crate) fn enforce_limits(
        &mut self,
        registry: &FieldRegistry,
        field: &mut Field,
        parent: &ParentLink,
    ) -> Result<bool> {
        let config = field.shared_config();
        self.enforce_kind(registry, &config, field.kind_mut(), parent)
    }

    /// Pull the row count into `minRows..=maxRows`. Returns whether anything changed.
    pub(crate) fn enforce_kind(
        &mut self,
        registry: &FieldRegistry,
        config: &FieldConfig,
        kind: &mut FieldKind,
        parent: &ParentLink,
    ) -> Result<bool> {
        let min = config.min_rows.unwrap_or(0);
        let mut changed = false;

        match kind {
            FieldKind::Repeater { rows } => {
                while rows.len() < min {
                    let row = self.build_form(registry, &config.fields, None, Some(parent.clone()))?;
                    rows.push(row);
                    changed = true;
                }
                if let Some(max) = config.max_rows.filter(|max| rows.len() > *max) {
                    for row in rows.drain(max..) {
                        self.remove(row);
                    }
                    changed = true;
                }
            }
            FieldKind::Flexible { items } => {
                if items.len() < min {
                    let layout = config.layouts.first().ok_or_else(|| {
                        FormError::InvalidConfig(format!(
                            "{} requires rows but declares no layouts",
                            config.name
                        ))
                    })?;
                    while items.len() < min {
                        let form =
                            self.build_form(registry, &layout.fields, None, Some(parent.clone()))?;
                        items.push(FlexibleItem {
                            layout: layout.name.clone(),
                            form,
                        });
                        changed = true;
                    }
                }
                if let Some(max) = config.max_rows.filter(|max| items.len() > *max) {
                    for item in items.drain(max..) {
                        self.remove(item.form);
                    }
                    changed = true;
                }
            }
            FieldKind::Primitive { .. } | FieldKind::Group { .. } => {}
        }

        if changed {
            tracing::debug!(field = %config.name, rows = ?kind.row_count(), "row limits enforced");
        }
        Ok(changed)
    }

    /// Re-apply row limits to a stored field
    pub(crate) fn enforce_stored(
        &mut self,
        registry: &FieldRegistry,
        form: FormId,
        index: usize,
    ) -> Result<bool> {
        let link = self.link(form, index)?;
        self.update_kind(form, index, |arena, config, kind| {
            if !matches!(kind, FieldKind::Repeater { .. } | FieldKind::Flexible { .. }) {
                return Err(kind_mismatch(config, "repeater or flexible", kind));
            }
            arena.enforce_kind(registry, config, kind, &link)
        })
    }

    pub(crate) fn add_row(
        &mut self,
        registry: &FieldRegistry,
        form: FormId,
        index: usize,
        seed: Option<&Values>,
    ) -> Result<()> {
        let link = self.link(form, index)?;
        self.update_kind(form, index, |arena, config, kind| {
            if !matches!(kind, FieldKind::Repeater { .. }) {
                return Err(kind_mismatch(config, "repeater", kind));
            }
            let row = arena.build_form(registry, &config.fields, seed, Some(link.clone()))?;
            if let FieldKind::Repeater { rows } = kind {
                rows.push(row);
            }
            arena.enforce_kind(registry, config, kind, &link)?;
            tracing::debug!(field = %config.name, rows = ?kind.row_count(), "row added");
            Ok(())
        })
    }

    pub(crate) fn remove_row(
        &mut self,
        registry: &FieldRegistry,
        form: FormId,
        index: usize,
        row: usize,
    ) -> Result<()> {
        let link = self.link(form, index)?;
        self.update_kind(form, index, |arena, config, kind| {
            let len = match &*kind {
                FieldKind::Repeater { rows } => rows.len(),
                other => return Err(kind_mismatch(config, "repeater", other)),
            };
            if row >= len {
                return Err(FormError::RowOutOfRange {
                    field: config.name.clone(),
                    index: row,
                    len,
                });
            }
            if let FieldKind::Repeater { rows } = kind {
                arena.remove(rows.remove(row));
            }
            arena.enforce_kind(registry, config, kind, &link)?;
            tracing::debug!(field = %config.name, row, "row removed");
            Ok(())
        })
    }

    pub(crate) fn add_item(
        &mut self,
        registry: &FieldRegistry,
        form: FormId,
        index: usize,
        layout: &str,
        seed: Option<&Values>,
    ) -> Result<()> {
        let link = self.link(form, index)?;
        self.update_kind(form, index, |arena, config, kind| {
            if !matches!(kind, FieldKind::Flexible { .. }) {
                return Err(kind_mismatch(config, "flexible", kind));
            }
            let template = config
                .layout(layout)
                .ok_or_else(|| unknown_layout(config, layout))?;
            let child = arena.build_form(registry, &template.fields, seed, Some(link.clone()))?;
            if let FieldKind::Flexible { items } = kind {
                items.push(FlexibleItem {
                    layout: template.name.clone(),
                    form: child,
                });
            }
            arena.enforce_kind(registry, config, kind, &link)?;
            tracing::debug!(field = %config.name, layout, "item added");
            Ok(())
        })
    }

    pub(crate) fn remove_item(
        &mut self,
        registry: &FieldRegistry,
        form: FormId,
        index: usize,
        item: usize,
    ) -> Result<()> {
        let link = self.link(form, index)?;
        self.update_kind(form, index, |arena, config, kind| {
            let len = match &*kind {
                FieldKind::Flexible { items } => items.len(),
                other => return Err(kind_mismatch(config, "flexible", other)),
            };
            if item >= len {
                return Err(FormError::RowOutOfRange {
                    field: config.name.clone(),
                    index: item,
                    len,
                });
            }
            if let FieldKind::Flexible { items } = kind {
                arena.remove(items.remove(item).form);
            }
            arena.enforce_kind(registry, config, kind, &link)?;
            tracing::debug!(field = %config.name, item, "item removed");
            Ok(())
        })
    }

    /// Store a new value in a field without emitting events.
    ///
    /// Repeater and flexible values are replaced atomically: the new rows are
    /// built and limited first, the old rows are freed only on success. Group
    /// values are forwarded key by key to the child form.
    pub(crate) fn assign(
        &mut self,
        registry: &FieldRegistry,
        form: FormId,
        index: usize,
        value: Value,
    ) -> Result<()> {
        let link = self.link(form, index)?;
        self.update_kind(form, index, |arena, config, kind| {
            let mut replacement = match &*kind {
                FieldKind::Primitive { .. } => FieldKind::Primitive { value },
                FieldKind::Group { form: child } => {
                    return arena.assign_record(registry, *child, &config.name, value);
                }
                FieldKind::Repeater { .. } => {
                    let seeds = parse_rows(&config.name, &value)?;
                    let rows = arena.build_rows(registry, &config.fields, &seeds, &link)?;
                    FieldKind::Repeater { rows }
                }
                FieldKind::Flexible { .. } => {
                    let items = parse_items(&config.name, &value)?;
                    let items = arena.build_items(registry, config, &items, &link)?;
                    FieldKind::Flexible { items }
                }
            };

            if let Err(err) = arena.enforce_kind(registry, config, &mut replacement, &link) {
                for child in replacement.child_forms() {
                    arena.remove(child);
                }
                return Err(err);
            }
            for old in kind.child_forms() {
                arena.remove(old);
            }
            *kind = replacement;
            Ok(())
        })
    }

    /// Forward a record to the fields of a group's child form.
    ///
    /// Every key is resolved before anything is written.
    fn assign_record(
        &mut self,
        registry: &FieldRegistry,
        child: FormId,
        group: &str,
        value: Value,
    ) -> Result<()> {
        let Value::Object(record) = value else {
            return Err(FormError::TypeMismatch {
                field: group.to_string(),
                expected: "object",
            });
        };
        let node = self
            .node(child)
            .ok_or_else(missing_node)?;
        let targets = record
            .into_iter()
            .map(|(key, value)| match node.position(&key) {
                Some(index) => Ok((index, value)),
                None => Err(FormError::UnknownField(format!("{}.{}", group, key))),
            })
            .collect::<Result<Vec<_>>>()?;

        for (index, value) in targets {
            self.assign(registry, child, index, value)?;
            self.notify_local(child, index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_limit_check() {
        let bad = FieldConfig::repeater("tags", vec![]).with_min_rows(3).with_max_rows(1);
        assert!(matches!(
            check_row_limits(&bad),
            Err(FormError::InvalidRowLimits { min: 3, max: 1, .. })
        ));
        let ok = FieldConfig::repeater("tags", vec![]).with_min_rows(1).with_max_rows(1);
        assert!(check_row_limits(&ok).is_ok());
    }

    #[test]
    fn test_parse_rows_accepts_null_rows() {
        let rows = parse_rows("tags", &json!([{ "label": "a" }, null])).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].is_empty());

        assert!(parse_rows("tags", &json!(null)).unwrap().is_empty());
        assert!(matches!(
            parse_rows("tags", &json!("nope")),
            Err(FormError::TypeMismatch { .. })
        ));
        assert!(matches!(
            parse_rows("tags", &json!([1, 2])),
            Err(FormError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_items() {
        let items = parse_items(
            "blocks",
            &json!([{ "layout": "textBlock", "values": { "body": "hi" } }, { "layout": "imageBlock" }]),
        )
        .unwrap();
        assert_eq!(items[0].layout, "textBlock");
        assert!(items[1].values.is_empty());

        assert!(matches!(
            parse_items("blocks", &json!([{ "values": {} }])),
            Err(FormError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_record() {
        assert_eq!(parse_record("profile", &json!(null)).unwrap(), None);
        assert!(parse_record("profile", &json!({ "a": 1 })).unwrap().is_some());
        assert!(parse_record("profile", &json!([1])).is_err());
    }

    #[test]
    fn test_enforce_kind_is_idempotent() {
        let registry = FieldRegistry::with_builtins();
        let mut arena = FormArena::new();
        let config = FieldConfig::repeater("tags", vec![FieldConfig::text("label")])
            .with_min_rows(2)
            .with_max_rows(3);
        let root = arena.build_form(&registry, &[], None, None).unwrap();
        let link = ParentLink {
            form: root,
            field: "tags".into(),
        };

        let mut kind = FieldKind::Repeater { rows: Vec::new() };
        assert!(arena.enforce_kind(&registry, &config, &mut kind, &link).unwrap());
        assert_eq!(kind.row_count(), Some(2));
        assert!(!arena.enforce_kind(&registry, &config, &mut kind, &link).unwrap());
        assert_eq!(kind.row_count(), Some(2));
        assert_eq!(arena.len(), 3);
    }
}
