//! CLI command implementations for hbs-script.
//!
//! Each module corresponds to a subcommand (`hbs-script <command>`).

pub mod check;
pub mod helpers;
pub mod info;
pub mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use hbs_script_core::config::ScriptConfig;
use hbs_script_core::engine::HandlebarsScriptEngine;
use hbs_script_core::registry::TemplateRegistry;

/// Resolved global options shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub conf_dir: PathBuf,
    pub config: ScriptConfig,
}

impl Settings {
    /// Load the config file if it exists, otherwise fall back to defaults.
    ///
    /// The host config directory defaults to the directory holding the config file.
    pub fn load(config_path: &Path, conf_dir: Option<&Path>) -> Result<Self> {
        let config = if config_path.is_file() {
            ScriptConfig::load(config_path)?
        } else {
            tracing::info!(
                path = %config_path.display(),
                "config file not found, using defaults"
            );
            ScriptConfig::default()
        };

        let conf_dir = match conf_dir {
            Some(dir) => dir.to_path_buf(),
            None => config_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf(),
        };

        Ok(Self {
            config_path: config_path.to_path_buf(),
            conf_dir,
            config,
        })
    }

    /// Initialize the registry (loading every helper script) and wrap it as a script engine.
    pub fn engine(&self) -> Result<HandlebarsScriptEngine> {
        let registry = TemplateRegistry::initialize(self.config.clone(), &self.conf_dir)
            .context("failed to initialize the handlebars script engine")?;
        Ok(HandlebarsScriptEngine::new(Arc::new(registry)))
    }
}
