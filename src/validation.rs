//! Validation engine
//!
//! Pure functions computing the error message of one field from its
//! declaration and current value. The order of checks is fixed: required-ness
//! first (short-circuits), then the custom validator if one is declared,
//! otherwise the schema validator. Validation failures are plain strings; a
//! validator that errors or panics is reported with the generic
//! validation-error message.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::config::Messages;
use crate::error::BoxError;
use crate::field::{FieldConfig, Values};

/// Outcome of a custom validator once settled
pub type ValidatorResult = Result<Option<String>, BoxError>;

/// What a custom validator hands back
pub enum Verdict {
    /// Settled synchronously
    Ready(ValidatorResult),
    /// Still running; only the async pass waits for it
    Pending(BoxFuture<'static, ValidatorResult>),
}

impl fmt::Debug for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Verdict::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// A schema rejection, optionally carrying a message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaViolation {
    pub message: Option<String>,
}

impl SchemaViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// Anything that can parse a value and report whether it conforms
pub trait SchemaValidator: Send + Sync {
    fn safe_parse(&self, value: &Value) -> Result<(), SchemaViolation>;
}

/// Null and the empty string count as missing
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Synchronous check of one field.
///
/// A validator that is still pending counts as "no error yet". The schema is
/// only consulted for fields without a custom validator.
pub fn validate_field(
    config: &FieldConfig,
    value: &Value,
    values: &Values,
    messages: &Messages,
) -> Option<String> {
    if config.required && is_empty_value(value) {
        return Some(messages.required.clone());
    }

    let Some(validate) = &config.validate else {
        return check_schema(config, value, messages);
    };
    match catch_unwind(AssertUnwindSafe(|| validate(value, values))) {
        Ok(Verdict::Ready(Ok(message))) => message,
        Ok(Verdict::Pending(_)) => None,
        Ok(Verdict::Ready(Err(err))) => {
            tracing::warn!(field = %config.name, error = %err, "validator failed");
            Some(messages.validation_error.clone())
        }
        Err(_) => {
            tracing::warn!(field = %config.name, "validator panicked");
            Some(messages.validation_error.clone())
        }
    }
}

/// Asynchronous check of one field.
///
/// Takes owned inputs so the returned future can run alongside the checks of
/// other fields.
pub fn validate_field_async(
    config: Arc<FieldConfig>,
    value: Value,
    values: Values,
    messages: Arc<Messages>,
) -> BoxFuture<'static, Option<String>> {
    async move {
        if config.required && is_empty_value(&value) {
            return Some(messages.required.clone());
        }

        let Some(validate) = &config.validate else {
            return check_schema(&config, &value, &messages);
        };
        let verdict = catch_unwind(AssertUnwindSafe(|| validate(&value, &values)));
        let settled = match verdict {
            Ok(Verdict::Ready(result)) => Ok(result),
            Ok(Verdict::Pending(pending)) => AssertUnwindSafe(pending).catch_unwind().await,
            Err(panic) => Err(panic),
        };
        match settled {
            Ok(Ok(message)) => message,
            Ok(Err(err)) => {
                tracing::warn!(field = %config.name, error = %err, "async validator failed");
                Some(messages.validation_error.clone())
            }
            Err(_) => {
                tracing::warn!(field = %config.name, "async validator panicked");
                Some(messages.validation_error.clone())
            }
        }
    }
    .boxed()
}

fn check_schema(config: &FieldConfig, value: &Value, messages: &Messages) -> Option<String> {
    let schema = config.schema.as_ref()?;
    match schema.safe_parse(value) {
        Ok(()) => None,
        Err(violation) => Some(
            violation
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| messages.invalid_value.clone()),
        ),
    }
}
