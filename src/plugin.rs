//! Plugins
//!
//! A plugin can contribute field types to a registry and hook into a live
//! form (typically by subscribing to its events). Plugins are tracked by a
//! [`PluginHost`] owned by the caller; there is no global plugin list.

use std::fmt;

use crate::error::{FormError, Result};
use crate::field::FieldRegistry;
use crate::form::Form;

/// Extension contract; every hook is optional
pub trait Plugin: Send {
    /// Unique name within a host
    fn name(&self) -> &str;

    /// Register the field types this plugin provides
    fn register_types(&self, _registry: &mut FieldRegistry) -> Result<()> {
        Ok(())
    }

    /// Attach to a form
    fn install(&mut self, _form: &mut Form) -> Result<()> {
        Ok(())
    }

    /// Detach from a form
    fn uninstall(&mut self, _form: &mut Form) {}
}

/// The set of plugins registered by one application
#[derive(Default)]
pub struct PluginHost {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin: contribute its field types, then install it into
    /// `form` when one is given.
    pub fn register(
        &mut self,
        mut plugin: Box<dyn Plugin>,
        registry: &mut FieldRegistry,
        form: Option<&mut Form>,
    ) -> Result<()> {
        if self.get(plugin.name()).is_some() {
            return Err(FormError::DuplicatePlugin(plugin.name().to_string()));
        }
        plugin.register_types(registry)?;
        if let Some(form) = form {
            plugin.install(form)?;
        }
        tracing::debug!(plugin = plugin.name(), "plugin registered");
        self.plugins.push(plugin);
        Ok(())
    }

    /// Install every registered plugin into a form, in registration order
    pub fn install_all(&mut self, form: &mut Form) -> Result<()> {
        for plugin in &mut self.plugins {
            plugin.install(form)?;
        }
        Ok(())
    }

    /// Remove a plugin, uninstalling it from `form` when one is given
    pub fn unregister(&mut self, name: &str, form: Option<&mut Form>) -> Option<Box<dyn Plugin>> {
        let position = self.plugins.iter().position(|p| p.name() == name)?;
        let mut plugin = self.plugins.remove(position);
        if let Some(form) = form {
            plugin.uninstall(form);
        }
        tracing::debug!(plugin = name, "plugin unregistered");
        Some(plugin)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| &**p)
    }

    /// Names of the registered plugins, in registration order
    pub fn plugins(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHost")
            .field("plugins", &self.plugins())
            .finish()
    }
}
