//! Configuration management for the form engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (forms.toml)
//! - Environment variables (FORMS__*)
//!
//! ## Example config file (forms.toml):
//! ```toml
//! [messages]
//! required = "Field is required"
//! validation_error = "Validation error"
//! invalid_value = "Invalid value"
//!
//! [registry]
//! builtins = true
//! allow_override = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::field::{FieldRegistry, OverridePolicy};

/// Main configuration for the form engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormsConfig {
    /// Messages reported by the validation engine
    #[serde(default)]
    pub messages: Messages,

    /// Field type registry settings
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// User-facing validation messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    /// Reported for a required field that is empty
    #[serde(default = "default_required")]
    pub required: String,

    /// Reported when a custom validator fails instead of answering
    #[serde(default = "default_validation_error")]
    pub validation_error: String,

    /// Reported when a schema rejects a value without a message
    #[serde(default = "default_invalid_value")]
    pub invalid_value: String,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Register the built-in field types
    #[serde(default = "default_true")]
    pub builtins: bool,

    /// Let a later registration replace an existing field type
    #[serde(default = "default_true")]
    pub allow_override: bool,
}

/// Project-relative files consulted before the per-user one
const PROJECT_FILES: [&str; 3] = ["forms.toml", ".forms.toml", "config/forms.toml"];

fn default_true() -> bool {
    true
}

fn default_required() -> String {
    "Field is required".to_string()
}

fn default_validation_error() -> String {
    "Validation error".to_string()
}

fn default_invalid_value() -> String {
    "Invalid value".to_string()
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            required: default_required(),
            validation_error: default_validation_error(),
            invalid_value: default_invalid_value(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            builtins: true,
            allow_override: true,
        }
    }
}

impl FormsConfig {
    /// Resolve the engine configuration from the usual places
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Resolve the engine configuration, layering `config_path` (which must
    /// exist) over the optional project and user files.
    ///
    /// Precedence, lowest first: built-in defaults, `forms.toml`,
    /// `.forms.toml`, `config/forms.toml`, the per-user `forms.toml`,
    /// `config_path`, then `FORMS__SECTION__KEY` variables.
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for candidate in PROJECT_FILES {
            builder = builder.add_source(File::with_name(candidate).required(false));
        }

        let user_file = directories::ProjectDirs::from("dev", "familiar", "forms")
            .map(|dirs| dirs.config_dir().join("forms.toml"))
            .filter(|path| path.exists());
        if let Some(user_file) = user_file {
            builder = builder.add_source(File::from(user_file).required(false));
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix("FORMS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Write this configuration as TOML
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, rendered)
    }

    /// Build a field registry honoring the `[registry]` section
    pub fn build_registry(&self) -> FieldRegistry {
        let policy = if self.registry.allow_override {
            OverridePolicy::Replace
        } else {
            OverridePolicy::Reject
        };
        if self.registry.builtins {
            FieldRegistry::with_builtins_and_policy(policy)
        } else {
            FieldRegistry::with_policy(policy)
        }
    }
}
