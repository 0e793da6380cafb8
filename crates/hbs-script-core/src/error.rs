//! Unified error types for hbs-script.

use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur while loading, compiling or executing templates.
#[derive(Error, Debug)]
pub enum HbsScriptError {
    // --- Configuration ---

    /// The configuration file (`hbs-script.config.json`) was not found.
    #[error("config file not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file exists but contains invalid JSON.
    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration parsed but holds a value the engine cannot run with.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    // --- Initialization ---

    /// The helper directory exists but could not be listed.
    #[error("failed to scan helper directory {path}")]
    HelperScan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A helper script matched the suffix but could not be read or parsed.
    /// Fatal: a broken helper set would miscompile every template after it.
    #[error("failed to register helpers from {path}: {reason}")]
    HelperRegistration { path: PathBuf, reason: String },

    // --- Compile ---

    /// The template source is not valid Handlebars, or names a helper or partial
    /// that is not registered.
    #[error("failed to compile template `{preview}`: {reason}")]
    Compile {
        preview: String,
        reason: String,
        #[source]
        source: Option<Box<handlebars::TemplateError>>,
    },

    // --- Execution ---

    /// Rendering failed: unknown helper, helper error, strict-mode miss, etc.
    #[error("template execution failed")]
    Execution(#[source] handlebars::RenderError),

    /// Writing or flushing rendered output into the caller's sink failed.
    /// Only returned under the `fail_loud` flush policy.
    #[error("failed to flush rendered template output")]
    EncodingFlush(#[source] std::io::Error),

    // --- Script engine contract ---

    /// The operation is not part of what this script language supports.
    #[error("operation not supported by the handlebars script engine: {0}")]
    Unsupported(&'static str),

    /// No script engine answers to this language type or file extension.
    #[error("unknown script language: {0}")]
    UnknownLanguage(String),

    // --- General ---

    /// A filesystem I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A catch-all for errors from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Alias for `Result<T, HbsScriptError>`.
pub type Result<T> = std::result::Result<T, HbsScriptError>;
