//! The script-engine contract a host script service plugs languages into, and the
//! Handlebars implementation of it.
//!
//! A host resolves an engine by language type (`"handlebars"`) or by the extension of
//! a script file (`"hbs"`), compiles the script once, caches the handle, and executes
//! it per request:
//!
//! ```ignore
//! let engines = ScriptEngines::new().with(Arc::new(HandlebarsScriptEngine::new(registry)));
//! let engine = engines.for_extension("hbs")?;
//! let template = engine.compile(&source)?;
//! let body = engine.execute(&template, Some(&params))?;
//! ```

use std::sync::Arc;

use crate::error::{HbsScriptError, Result};
use crate::executable::ExecutableTemplate;
use crate::registry::{CompiledTemplate, TemplateRegistry};
use crate::Variables;

/// Every script language must implement this trait.
pub trait ScriptEngine: Send + Sync {
    /// Language identifiers scripts name in their `lang` field.
    fn types(&self) -> &'static [&'static str];

    /// File extensions (without the dot) of script files in this language.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether scripts run without ambient system access.
    fn sandboxed(&self) -> bool;

    /// Compile script source into a reusable handle.
    fn compile(&self, source: &str) -> Result<CompiledTemplate>;

    /// Bind a compiled handle to an owned variable map for repeated runs.
    fn executable(
        &self,
        template: &CompiledTemplate,
        vars: Option<Variables>,
    ) -> ExecutableTemplate;

    /// Execute once against `vars` and return the rendered bytes.
    fn execute(&self, template: &CompiledTemplate, vars: Option<&Variables>) -> Result<Vec<u8>>;

    /// A script bound to per-document search context.
    fn search(
        &self,
        _template: &CompiledTemplate,
        _vars: Option<Variables>,
    ) -> Result<ExecutableTemplate> {
        Err(HbsScriptError::Unsupported("search"))
    }

    /// Called when the host evicts a compiled script from its cache.
    fn script_removed(&self, _template: &CompiledTemplate) {}

    /// Called once when the host shuts the script service down.
    fn close(&self) {}
}

/// Handlebars as a script language.
#[derive(Debug, Clone)]
pub struct HandlebarsScriptEngine {
    registry: Arc<TemplateRegistry>,
}

impl HandlebarsScriptEngine {
    pub const TYPES: &'static [&'static str] = &["handlebars"];
    pub const EXTENSIONS: &'static [&'static str] = &["handlebars", "hbs"];

    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }
}

impl ScriptEngine for HandlebarsScriptEngine {
    fn types(&self) -> &'static [&'static str] {
        Self::TYPES
    }

    fn extensions(&self) -> &'static [&'static str] {
        Self::EXTENSIONS
    }

    fn sandboxed(&self) -> bool {
        true
    }

    fn compile(&self, source: &str) -> Result<CompiledTemplate> {
        self.registry.compile(source)
    }

    fn executable(
        &self,
        template: &CompiledTemplate,
        vars: Option<Variables>,
    ) -> ExecutableTemplate {
        ExecutableTemplate::new(Arc::clone(&self.registry), template.clone(), vars)
    }

    fn execute(&self, template: &CompiledTemplate, vars: Option<&Variables>) -> Result<Vec<u8>> {
        self.registry.execute(template, vars)
    }
}

/// Engines a host knows about, looked up by language type or file extension.
#[derive(Default, Clone)]
pub struct ScriptEngines {
    engines: Vec<Arc<dyn ScriptEngine>>,
}

impl ScriptEngines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an engine. Earlier engines win when two claim the same name.
    pub fn with(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    /// Resolve an engine by language type, e.g. `"handlebars"`.
    pub fn for_type(&self, lang: &str) -> Result<Arc<dyn ScriptEngine>> {
        self.engines
            .iter()
            .find(|e| e.types().iter().any(|t| *t == lang))
            .cloned()
            .ok_or_else(|| HbsScriptError::UnknownLanguage(lang.to_string()))
    }

    /// Resolve an engine by script file extension, with or without the leading dot.
    pub fn for_extension(&self, ext: &str) -> Result<Arc<dyn ScriptEngine>> {
        let ext = ext.trim_start_matches('.');
        self.engines
            .iter()
            .find(|e| e.extensions().iter().any(|x| *x == ext))
            .cloned()
            .ok_or_else(|| HbsScriptError::UnknownLanguage(ext.to_string()))
    }

    /// Notify every engine that the host is shutting down.
    pub fn close(&self) {
        for engine in &self.engines {
            engine.close();
        }
    }
}
