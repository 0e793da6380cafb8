//! Script engine configuration and its JSON file I/O.
//!
//! The configuration lives in `hbs-script.config.json` next to the host's other config
//! files. Every key is optional; a missing key takes its default:
//!
//! ```json
//! {
//!   "template_base_dir": "/etc/search/helpers",
//!   "template_file_suffix": ".rhai",
//!   "escape": "json",
//!   "strict_mode": false,
//!   "flush_policy": "best_effort",
//!   "buffer": { "initial_capacity": 4096, "max_retained_capacity": 1048576 },
//!   "helper_limits": { "max_operations": 100000 }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HbsScriptError, Result};

/// Default config file name looked up by the CLI.
pub const CONFIG_FILE: &str = "hbs-script.config.json";

/// Helper directory name under the host config directory when none is configured.
pub const DEFAULT_HELPER_DIR: &str = "helpers";

/// Default helper script suffix.
pub const DEFAULT_SUFFIX: &str = ".rhai";

/// How rendered expression values are escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapeMode {
    /// Handlebars' default HTML escaping.
    #[default]
    Html,
    /// JSON string-content escaping, for values placed inside `"..."` in a query body.
    Json,
    /// No escaping; `{{x}}` behaves like `{{{x}}}`.
    None,
}

/// What to do when rendered output cannot be written or flushed into its sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Log the failure and hand back whatever was produced.
    #[default]
    BestEffort,
    /// Surface the failure as [`HbsScriptError::EncodingFlush`].
    FailLoud,
}

/// Sizing of the per-thread scratch buffer templates render into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Capacity reserved on first use.
    pub initial_capacity: usize,
    /// A buffer that grew past this is shrunk back to `initial_capacity` after the render.
    pub max_retained_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 4 * 1024,
            max_retained_capacity: 1024 * 1024,
        }
    }
}

/// Resource limits applied to every helper script call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for HelperLimits {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
            max_call_levels: 32,
            max_string_size: 1024 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

/// Configuration of the handlebars script engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Directory scanned for helper scripts. Defaults to `<conf_dir>/helpers`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_base_dir: Option<PathBuf>,
    /// Only files whose names end with this suffix are loaded as helper scripts.
    pub template_file_suffix: String,
    pub escape: EscapeMode,
    /// When true, a `{{variable}}` missing from the variables is a render error
    /// instead of rendering as empty.
    pub strict_mode: bool,
    pub flush_policy: FlushPolicy,
    pub buffer: BufferConfig,
    pub helper_limits: HelperLimits,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            template_base_dir: None,
            template_file_suffix: DEFAULT_SUFFIX.into(),
            escape: EscapeMode::default(),
            strict_mode: false,
            flush_policy: FlushPolicy::default(),
            buffer: BufferConfig::default(),
            helper_limits: HelperLimits::default(),
        }
    }
}

impl ScriptConfig {
    /// Load a config file. Keys missing from the file take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| HbsScriptError::ConfigNotFound {
                path: path.to_path_buf(),
                source: e,
            })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| HbsScriptError::ConfigParse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| HbsScriptError::ConfigParse {
                path: path.to_path_buf(),
                source: e,
            })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.template_file_suffix.is_empty() {
            return Err(HbsScriptError::InvalidConfig(
                "template_file_suffix must not be empty".into(),
            ));
        }
        if self.buffer.initial_capacity == 0 {
            return Err(HbsScriptError::InvalidConfig(
                "buffer.initial_capacity must be greater than zero".into(),
            ));
        }
        if self.buffer.max_retained_capacity < self.buffer.initial_capacity {
            return Err(HbsScriptError::InvalidConfig(format!(
                "buffer.max_retained_capacity ({}) is below buffer.initial_capacity ({})",
                self.buffer.max_retained_capacity, self.buffer.initial_capacity
            )));
        }
        Ok(())
    }

    /// The helper directory: the configured one, or `<conf_dir>/helpers`.
    pub fn helper_dir(&self, conf_dir: &Path) -> PathBuf {
        match &self.template_base_dir {
            Some(dir) => dir.clone(),
            None => conf_dir.join(DEFAULT_HELPER_DIR),
        }
    }
}
