//! Helper scripts: discovery on disk and registration into the Handlebars registry.
//!
//! Helpers extend the template expression vocabulary. They are written in
//! [Rhai](https://rhai.rs) and loaded once at startup from the helper directory:
//!
//! ```rhai
//! // helpers/strings.rhai
//! fn upper(value) { value.to_upper() }
//! fn field(name, opts) { if opts.keyword { name + ".keyword" } else { name } }
//! private fn unused_here() { () }
//! ```
//!
//! Every public function becomes a helper named after the function, so one file may
//! define many helpers and the file name carries no meaning. `private` functions stay
//! internal to their script.
//!
//! A function may be defined with several arities; a call picks the exact one, or the
//! largest one below the number of arguments given and ignores the rest. Calling with
//! fewer arguments than any definition takes is a render error.

pub mod discovery;
pub mod script;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use handlebars::Handlebars;

use crate::config::HelperLimits;
use crate::error::{HbsScriptError, Result};

pub use discovery::discover;
pub use script::{HelperScript, ScriptHelper};

/// What a helper directory scan registered.
#[derive(Debug, Clone, Default)]
pub struct HelperSet {
    /// Helper script files, in load order.
    pub files: Vec<PathBuf>,
    /// Registered helper names, sorted.
    pub names: Vec<String>,
}

impl HelperSet {
    /// Note a registered helper name, warning when it replaces an earlier definition.
    pub fn record(&mut self, name: &str, origin: &str) {
        if self.names.iter().any(|n| n == name) {
            tracing::warn!(
                helper = %name,
                origin,
                "helper redefined, replacing earlier definition"
            );
        } else {
            self.names.push(name.to_string());
        }
    }
}

/// Build the Rhai engine every helper script runs on.
///
/// Scripts get no I/O (Rhai has none by default); `print`/`debug` go to tracing, and
/// the configured limits bound what a single helper call may consume.
pub fn script_engine(limits: &HelperLimits) -> rhai::Engine {
    let mut engine = rhai::Engine::new();
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.disable_symbol("eval");
    engine.on_print(|text| tracing::debug!(target: "hbs_script::helper", "{text}"));
    engine.on_debug(|text, source, pos| {
        tracing::debug!(target: "hbs_script::helper", ?source, %pos, "{text}");
    });
    engine
}

/// Load every helper script in `dir` ending with `suffix` and register its functions.
///
/// A missing `dir` registers nothing. Any file that fails to load aborts the whole scan.
pub fn register_dir(
    hbs: &mut Handlebars<'static>,
    engine: &Arc<rhai::Engine>,
    dir: &Path,
    suffix: &str,
) -> Result<HelperSet> {
    let files = discover(dir, suffix)?;
    let mut set = HelperSet::default();

    for path in files {
        let script = HelperScript::load(engine, &path)?;
        if script.is_empty() {
            tracing::warn!(path = %path.display(), "helper script defines no public functions");
        }
        for helper in script.helpers(engine) {
            let name = helper.name().to_string();
            set.record(&name, &path.display().to_string());
            tracing::debug!(helper = %name, arities = ?helper.arities(), "registering helper");
            hbs.register_helper(&name, Box::new(helper));
        }
        set.files.push(path);
    }

    set.names.sort();
    Ok(set)
}

/// Register a single helper script file, regardless of its suffix.
pub fn register_file(
    hbs: &mut Handlebars<'static>,
    engine: &Arc<rhai::Engine>,
    path: &Path,
) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(HbsScriptError::HelperRegistration {
            path: path.to_path_buf(),
            reason: "not a file".into(),
        });
    }
    let script = HelperScript::load(engine, path)?;
    let mut names = Vec::new();
    for helper in script.helpers(engine) {
        let name = helper.name().to_string();
        hbs.register_helper(&name, Box::new(helper));
        names.push(name);
    }
    Ok(names)
}
