//! Form Check CLI
//!
//! Loads a form declaration, applies a values file and reports validation
//! results.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use familiar_forms::{FormDeclaration, FormsConfig};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "form-check")]
#[command(about = "Validate form values against a form declaration")]
struct Cli {
    /// Engine configuration file (defaults to forms.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply values to a declaration and validate them
    Check {
        /// Declaration file (.json or .toml)
        declaration: PathBuf,

        /// JSON object of values keyed by top-level field name
        #[arg(short, long)]
        values: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
        format: Format,

        /// Await async validators
        #[arg(long = "async")]
        wait: bool,
    },

    /// List the registered field types
    Types,

    /// Write the default engine configuration
    InitConfig {
        /// Output file
        #[arg(default_value = "forms.toml")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Pretty,
    Compact,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

/// Returns whether the checked values were valid
fn run(cli: Cli) -> anyhow::Result<bool> {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    let config = FormsConfig::load_from(config_path.as_deref())
        .context("loading engine configuration")?;

    match cli.command {
        Commands::Check {
            declaration,
            values,
            format,
            wait,
        } => {
            let declaration = FormDeclaration::load(&declaration)
                .with_context(|| format!("loading declaration {}", declaration.display()))?;
            let registry = Arc::new(config.build_registry());
            let mut form = declaration.into_form_with_messages(registry, config.messages.clone())?;

            if let Some(path) = values {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading values {}", path.display()))?;
                let Value::Object(values) = serde_json::from_str::<Value>(&content)? else {
                    bail!("values file must contain a JSON object");
                };
                for (name, value) in values {
                    form.set_value(&name, value)
                        .with_context(|| format!("setting {}", name))?;
                }
            }

            let valid = if wait {
                futures::executor::block_on(form.validate_async())
            } else {
                form.validate()
            };

            let report = json!({
                "valid": valid,
                "values": form.get_values(),
                "errors": form.all_errors(),
            });
            let rendered = match format {
                Format::Pretty => serde_json::to_string_pretty(&report)?,
                Format::Compact => serde_json::to_string(&report)?,
            };
            println!("{}", rendered);
            Ok(valid)
        }

        Commands::Types => {
            let registry = config.build_registry();
            for field_type in registry.list() {
                println!("{}", field_type);
            }
            Ok(true)
        }

        Commands::InitConfig { output } => {
            if output.exists() {
                bail!("{} already exists", output.display());
            }
            config.save(&output.to_string_lossy())?;
            println!("✅ Configuration written to {}", output.display());
            Ok(true)
        }
    }
}
