//! Async option loading state

use serde_json::Value;

/// Options fetched through a field's `asyncOptions` loader
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsState {
    /// Result of the last successful load
    pub options: Vec<Value>,
    /// True while a load is in flight
    pub loading: bool,
    /// Message of the last failed load
    pub load_error: Option<String>,
}

impl OptionsState {
    pub(crate) fn begin(&mut self) {
        self.loading = true;
        self.load_error = None;
    }

    pub(crate) fn finish(&mut self, result: Result<Vec<Value>, String>) -> Vec<Value> {
        self.loading = false;
        match result {
            Ok(options) => {
                self.options = options.clone();
                options
            }
            Err(message) => {
                self.load_error = Some(message);
                Vec::new()
            }
        }
    }
}
