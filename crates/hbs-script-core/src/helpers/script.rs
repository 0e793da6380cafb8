use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, RenderErrorReason,
    ScopedJson,
};
use rhai::{CallFnOptions, Dynamic, FnAccess, Scope, AST};
use serde_json::Value;

use crate::error::{HbsScriptError, Result};

/// A parsed helper script and the public functions it defines.
#[derive(Debug, Clone)]
pub struct HelperScript {
    path: PathBuf,
    ast: Arc<AST>,
    /// Function name to the argument counts it is defined with.
    functions: BTreeMap<String, BTreeSet<usize>>,
}

impl HelperScript {
    /// Read and parse a helper script.
    pub fn load(engine: &Arc<rhai::Engine>, path: &Path) -> Result<Self> {
        let source =
            std::fs::read_to_string(path).map_err(|e| HbsScriptError::HelperRegistration {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let mut script = Self::parse(engine, &source).map_err(|reason| {
            HbsScriptError::HelperRegistration {
                path: path.to_path_buf(),
                reason,
            }
        })?;
        script.path = path.to_path_buf();
        tracing::debug!(
            path = %path.display(),
            helpers = script.functions.len(),
            "loaded helper script"
        );
        Ok(script)
    }

    fn parse(engine: &Arc<rhai::Engine>, source: &str) -> std::result::Result<Self, String> {
        let ast = engine.compile(source).map_err(|e| e.to_string())?;

        let mut functions: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        for f in ast.iter_functions() {
            if matches!(f.access, FnAccess::Private) {
                continue;
            }
            functions
                .entry(f.name.to_string())
                .or_default()
                .insert(f.params.len());
        }

        Ok(Self {
            path: PathBuf::new(),
            ast: Arc::new(ast),
            functions,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// One Handlebars helper per public function name.
    pub fn helpers(&self, engine: &Arc<rhai::Engine>) -> Vec<ScriptHelper> {
        self.functions
            .iter()
            .map(|(name, arities)| ScriptHelper {
                engine: Arc::clone(engine),
                ast: Arc::clone(&self.ast),
                name: name.clone(),
                arities: arities.clone(),
            })
            .collect()
    }
}

/// A Handlebars helper backed by a Rhai script function.
///
/// Positional params are passed as function arguments in order. When the call carries
/// hash arguments (`{{fmt value precision=2}}`) they are passed as one extra trailing
/// object-map argument. The function is then chosen by argument count; a call with
/// more arguments than any definition takes falls back to the largest definition that
/// fits and drops the extra arguments, so `{{valueHelper this}}` calls `fn valueHelper()`.
#[derive(Clone)]
pub struct ScriptHelper {
    engine: Arc<rhai::Engine>,
    ast: Arc<AST>,
    name: String,
    arities: BTreeSet<usize>,
}

impl std::fmt::Debug for ScriptHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHelper")
            .field("name", &self.name)
            .field("arities", &self.arities)
            .finish()
    }
}

impl ScriptHelper {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arities(&self) -> &BTreeSet<usize> {
        &self.arities
    }

    /// The arity a call with `given` arguments dispatches to: an exact match, otherwise
    /// the largest defined arity below `given` (extra arguments are dropped).
    fn dispatch_arity(&self, given: usize) -> Option<usize> {
        if self.arities.contains(&given) {
            return Some(given);
        }
        self.arities.range(..given).next_back().copied()
    }

    fn invoke(&self, mut args: Vec<Dynamic>) -> std::result::Result<Value, RenderError> {
        let Some(arity) = self.dispatch_arity(args.len()) else {
            return Err(self.fail(format!(
                "called with {} argument(s), defined for {:?}",
                args.len(),
                self.arities
            )));
        };
        args.truncate(arity);

        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result: Dynamic = self
            .engine
            .call_fn_with_options(options, &mut Scope::new(), &self.ast, &self.name, args)
            .map_err(|e| self.fail(e.to_string()))?;

        rhai::serde::from_dynamic::<Value>(&result).map_err(|e| self.fail(e.to_string()))
    }

    fn fail(&self, reason: String) -> RenderError {
        RenderErrorReason::Other(format!("helper '{}' failed: {reason}", self.name)).into()
    }
}

impl HelperDef for ScriptHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> std::result::Result<ScopedJson<'rc>, RenderError> {
        let mut args = Vec::with_capacity(h.params().len() + 1);
        for param in h.params() {
            args.push(to_dynamic(param.value()).map_err(|e| self.fail(e))?);
        }
        if !h.hash().is_empty() {
            let hash: serde_json::Map<String, Value> = h
                .hash()
                .iter()
                .map(|(key, value)| ((*key).to_string(), value.value().clone()))
                .collect();
            args.push(to_dynamic(&Value::Object(hash)).map_err(|e| self.fail(e))?);
        }

        let value = self.invoke(args)?;
        Ok(ScopedJson::Derived(value))
    }
}

fn to_dynamic(value: &Value) -> std::result::Result<Dynamic, String> {
    rhai::serde::to_dynamic(value).map_err(|e| e.to_string())
}
