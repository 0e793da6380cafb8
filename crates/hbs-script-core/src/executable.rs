//! A compiled template bound to its own variable map.
//!
//! Hosts that build variables up incrementally (for example injecting a per-document
//! value right before each render) keep an [`ExecutableTemplate`] instead of passing a
//! fresh map to [`TemplateRegistry::execute`] every time. Variables set on it persist
//! across runs; each [`run`](ExecutableTemplate::run) sees every `set_variable` made so far.

use std::io::Write;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::registry::{CompiledTemplate, TemplateRegistry};
use crate::Variables;

/// A compiled template plus an owned, mutable variable map.
///
/// Not meant to be run from several threads at once; mutation and rendering take
/// `&mut self`/`&self` on one owner. Clone it to hand a copy to another worker.
#[derive(Debug, Clone)]
pub struct ExecutableTemplate {
    registry: Arc<TemplateRegistry>,
    template: CompiledTemplate,
    vars: Variables,
}

impl ExecutableTemplate {
    /// Bind `template` to `vars`; `None` starts from an empty map.
    pub fn new(
        registry: Arc<TemplateRegistry>,
        template: CompiledTemplate,
        vars: Option<Variables>,
    ) -> Self {
        Self {
            registry,
            template,
            vars: vars.unwrap_or_default(),
        }
    }

    /// Insert or replace one variable.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn variables(&self) -> &Variables {
        &self.vars
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.vars
    }

    pub fn template(&self) -> &CompiledTemplate {
        &self.template
    }

    /// Render with the current variables.
    pub fn run(&self) -> Result<Vec<u8>> {
        self.registry.execute(&self.template, Some(&self.vars))
    }

    /// Render with the current variables into `sink`.
    pub fn run_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<()> {
        self.registry
            .execute_to(&self.template, Some(&self.vars), sink)
    }
}
