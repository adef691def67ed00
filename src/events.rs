//! Change notification primitives
//!
//! A small publish/subscribe channel keyed by event kind. Every form node and
//! every field owns its own emitter; nothing here knows about UI bindings.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde_json::Value;

/// Identifier returned by [`EventEmitter::on`], used to unsubscribe.
pub type SubId = u64;

/// An event that can be routed by kind.
pub trait Event {
    type Kind: Copy + Eq + Hash + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

type Callback<E> = Box<dyn FnMut(&E) + Send>;

struct Listener<E> {
    id: SubId,
    once: bool,
    callback: Callback<E>,
}

/// Listener registry for one event source.
pub struct EventEmitter<E: Event> {
    next_id: SubId,
    listeners: HashMap<E::Kind, Vec<Listener<E>>>,
}

impl<E: Event> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            listeners: HashMap::new(),
        }
    }

    /// Subscribe to every event of `kind`.
    pub fn on(&mut self, kind: E::Kind, callback: impl FnMut(&E) + Send + 'static) -> SubId {
        self.push(kind, false, Box::new(callback))
    }

    /// Subscribe to the next event of `kind` only.
    pub fn once(&mut self, kind: E::Kind, callback: impl FnMut(&E) + Send + 'static) -> SubId {
        self.push(kind, true, Box::new(callback))
    }

    /// Remove a listener. Returns false if the id was unknown.
    pub fn off(&mut self, id: SubId) -> bool {
        for listeners in self.listeners.values_mut() {
            if let Some(pos) = listeners.iter().position(|l| l.id == id) {
                listeners.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver `event` to its listeners, synchronously and in subscription order.
    pub fn emit(&mut self, event: &E) {
        let Some(listeners) = self.listeners.get_mut(&event.kind()) else {
            return;
        };
        for listener in listeners.iter_mut() {
            (listener.callback)(event);
        }
        listeners.retain(|l| !l.once);
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    fn push(&mut self, kind: E::Kind, once: bool, callback: Callback<E>) -> SubId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners
            .entry(kind)
            .or_default()
            .push(Listener { id, once, callback });
        id
    }
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self
            .listeners
            .iter()
            .map(|(kind, l)| (*kind, l.len()))
            .collect();
        f.debug_struct("EventEmitter").field("listeners", &counts).finish()
    }
}

/// Kinds of form-level events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormEventKind {
    /// `field:change`
    FieldChange,
    /// `field:error`
    FieldError,
}

/// Events published by a form node
#[derive(Debug, Clone, PartialEq)]
pub enum FormEvent {
    FieldChange { name: String, value: Value },
    FieldError { name: String, error: Option<String> },
}

impl Event for FormEvent {
    type Kind = FormEventKind;

    fn kind(&self) -> FormEventKind {
        match self {
            FormEvent::FieldChange { .. } => FormEventKind::FieldChange,
            FormEvent::FieldError { .. } => FormEventKind::FieldError,
        }
    }
}

/// Kinds of field-level events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldEventKind {
    Change,
}

/// Events published by a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    Change { value: Value },
}

impl Event for FieldEvent {
    type Kind = FieldEventKind;

    fn kind(&self) -> FieldEventKind {
        match self {
            FieldEvent::Change { .. } => FieldEventKind::Change,
        }
    }
}
