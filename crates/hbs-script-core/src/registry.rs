//! Template registry: the initialized Handlebars instance, its helper set, and the
//! compile/execute operations every script call goes through.
//!
//! A [`TemplateRegistry`] only exists once initialization has finished, so helper
//! loading always completes before the first compile:
//!
//! ```ignore
//! use std::sync::Arc;
//! use hbs_script_core::config::ScriptConfig;
//! use hbs_script_core::registry::TemplateRegistry;
//!
//! let registry = Arc::new(TemplateRegistry::initialize(ScriptConfig::default(), conf_dir)?);
//! let template = registry.compile(r#"{"query":{"match":{"{{field}}":"{{value}}"}}}"#)?;
//! let body: Vec<u8> = registry.execute(&template, Some(&params))?;
//! ```
//!
//! After initialization the registry is read-only and `Send + Sync`; share it with
//! `Arc` and call `compile`/`execute` from any number of threads.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use handlebars::{Context, Handlebars, HelperDef, RenderContext, Renderable, Template};

use crate::buffer::{self, BufferOutput};
use crate::config::{FlushPolicy, ScriptConfig};
use crate::error::{HbsScriptError, Result};
use crate::helpers::{self, HelperSet};
use crate::{escape, references, Variables};

/// Longest template prefix quoted in compile errors.
const PREVIEW_CHARS: usize = 64;

/// A parsed template, ready to render. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    template: Arc<Template>,
}

impl CompiledTemplate {
    fn new(template: Template) -> Self {
        Self {
            template: Arc::new(template),
        }
    }

    pub(crate) fn template(&self) -> &Template {
        &self.template
    }
}

/// Collects helpers before the registry is built.
///
/// Helper registration is only possible here; the built [`TemplateRegistry`] has no
/// way to add or remove helpers.
pub struct RegistryBuilder {
    config: ScriptConfig,
    helper_dir: PathBuf,
    helper_files: Vec<PathBuf>,
    native: Vec<(String, Box<dyn HelperDef + Send + Sync + 'static>)>,
}

impl RegistryBuilder {
    /// Start a builder; the helper directory defaults to `<conf_dir>/helpers`.
    pub fn new(config: ScriptConfig, conf_dir: &Path) -> Self {
        let helper_dir = config.helper_dir(conf_dir);
        Self {
            config,
            helper_dir,
            helper_files: Vec::new(),
            native: Vec::new(),
        }
    }

    /// Also load this helper script, whatever its suffix. Loaded after the directory scan.
    pub fn helper_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.helper_files.push(path.into());
        self
    }

    /// Register a helper implemented in Rust. Applied after all script helpers.
    pub fn helper(mut self, name: &str, def: Box<dyn HelperDef + Send + Sync + 'static>) -> Self {
        self.native.push((name.to_string(), def));
        self
    }

    /// Scan and register helpers, then freeze the registry.
    pub fn build(self) -> Result<TemplateRegistry> {
        self.config.validate()?;

        let mut hbs = Handlebars::new();
        hbs.set_strict_mode(self.config.strict_mode);
        escape::apply(&mut hbs, self.config.escape);

        let engine = Arc::new(helpers::script_engine(&self.config.helper_limits));
        let mut helpers = helpers::register_dir(
            &mut hbs,
            &engine,
            &self.helper_dir,
            &self.config.template_file_suffix,
        )?;

        for path in self.helper_files {
            let origin = path.display().to_string();
            for name in helpers::register_file(&mut hbs, &engine, &path)? {
                helpers.record(&name, &origin);
            }
            helpers.files.push(path);
        }
        for (name, def) in self.native {
            hbs.register_helper(&name, def);
            helpers.record(&name, "native");
        }
        helpers.names.sort();

        tracing::info!(
            helper_dir = %self.helper_dir.display(),
            files = helpers.files.len(),
            helpers = helpers.names.len(),
            "handlebars script engine initialized"
        );

        Ok(TemplateRegistry {
            hbs,
            config: self.config,
            helper_dir: self.helper_dir,
            helpers,
        })
    }
}

/// The initialized template engine: compiles and renders templates.
pub struct TemplateRegistry {
    hbs: Handlebars<'static>,
    config: ScriptConfig,
    helper_dir: PathBuf,
    helpers: HelperSet,
}

impl std::fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("helper_dir", &self.helper_dir)
            .field("helpers", &self.helpers.names)
            .finish()
    }
}

impl TemplateRegistry {
    /// Load helpers from the configured directory and build the registry.
    pub fn initialize(config: ScriptConfig, conf_dir: &Path) -> Result<Self> {
        RegistryBuilder::new(config, conf_dir).build()
    }

    pub fn builder(config: ScriptConfig, conf_dir: &Path) -> RegistryBuilder {
        RegistryBuilder::new(config, conf_dir)
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Directory helper scripts were scanned from.
    pub fn helper_dir(&self) -> &Path {
        &self.helper_dir
    }

    /// Helper files and names registered during initialization.
    pub fn helpers(&self) -> &HelperSet {
        &self.helpers
    }

    /// Parse `source` as an inline template.
    ///
    /// Fails on invalid syntax and on helper or partial references nothing registered
    /// can resolve (see [`references`](crate::references) for which ones are checked).
    pub fn compile(&self, source: &str) -> Result<CompiledTemplate> {
        let template = Template::compile(source).map_err(|e| HbsScriptError::Compile {
            preview: preview(source),
            reason: e.reason().to_string(),
            source: Some(Box::new(e)),
        })?;
        let unresolved = references::find_unresolved(&template, &self.helpers.names, &self.hbs);
        if let Some(missing) = unresolved {
            return Err(HbsScriptError::Compile {
                preview: preview(source),
                reason: missing.to_string(),
                source: None,
            });
        }
        Ok(CompiledTemplate::new(template))
    }

    /// Render `template` against `vars` into an owned byte vector.
    ///
    /// `None` renders against an empty map.
    pub fn execute(
        &self,
        template: &CompiledTemplate,
        vars: Option<&Variables>,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.execute_to(template, vars, &mut out)?;
        Ok(out)
    }

    /// Render `template` against `vars`, then write and flush the result into `sink`.
    ///
    /// Render failures are always returned. A failure writing into `sink` is returned
    /// under [`FlushPolicy::FailLoud`]; under [`FlushPolicy::BestEffort`] it is logged and
    /// the call succeeds with whatever reached the sink.
    pub fn execute_to<W: Write + ?Sized>(
        &self,
        template: &CompiledTemplate,
        vars: Option<&Variables>,
        sink: &mut W,
    ) -> Result<()> {
        let ctx = match vars {
            Some(vars) => Context::wraps(vars).map_err(HbsScriptError::Execution)?,
            None => Context::from(serde_json::Value::Object(Variables::new())),
        };

        buffer::with_scratch(&self.config.buffer, |scratch| {
            self.render_into(template, &ctx, scratch)?;
            match sink.write_all(scratch.as_slice()).and_then(|()| sink.flush()) {
                Ok(()) => Ok(()),
                Err(e) => match self.config.flush_policy {
                    FlushPolicy::FailLoud => Err(HbsScriptError::EncodingFlush(e)),
                    FlushPolicy::BestEffort => {
                        tracing::error!(
                            error = %e,
                            "could not execute query template (failed to flush output)"
                        );
                        Ok(())
                    }
                },
            }
        })
    }

    fn render_into(
        &self,
        template: &CompiledTemplate,
        ctx: &Context,
        scratch: &mut Vec<u8>,
    ) -> Result<()> {
        let mut rc = RenderContext::new(None);
        let mut out = BufferOutput::new(scratch);
        template
            .template()
            .render(&self.hbs, ctx, &mut rc, &mut out)
            .map_err(HbsScriptError::Execution)
    }
}

fn preview(source: &str) -> String {
    let mut chars = source.chars();
    let mut preview: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EscapeMode;
    use handlebars::{Helper, JsonRender, Output, RenderError};
    use serde_json::json;

    fn vars(value: serde_json::Value) -> Variables {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("vars must be an object"),
        }
    }

    fn bare() -> TemplateRegistry {
        let dir = tempfile::tempdir().unwrap();
        TemplateRegistry::initialize(ScriptConfig::default(), dir.path()).unwrap()
    }

    fn render(registry: &TemplateRegistry, source: &str, v: Option<&Variables>) -> String {
        let template = registry.compile(source).unwrap();
        String::from_utf8(registry.execute(&template, v).unwrap()).unwrap()
    }

    #[test]
    fn test_initialize_without_helper_dir() {
        let registry = bare();
        assert!(registry.helpers().files.is_empty());
        assert!(registry.helpers().names.is_empty());
        assert!(registry.helper_dir().ends_with("helpers"));
    }

    #[test]
    fn test_empty_template_renders_empty() {
        let registry = bare();
        let template = registry.compile("").unwrap();
        assert!(registry.execute(&template, None).unwrap().is_empty());
        let v = vars(json!({ "a": 1 }));
        assert!(registry.execute(&template, Some(&v)).unwrap().is_empty());
    }

    #[test]
    fn test_unclosed_expression_fails_to_compile() {
        let registry = bare();
        let err = registry.compile("{{unclosed").unwrap_err();
        match err {
            HbsScriptError::Compile { preview, .. } => assert_eq!(preview, "{{unclosed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_compile_error_preview_is_bounded() {
        let registry = bare();
        let source = format!("{}{{{{#if}}", "x".repeat(200));
        match registry.compile(&source) {
            Err(HbsScriptError::Compile { preview, .. }) => {
                assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
                assert!(preview.ends_with("..."));
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_template_renders_itself() {
        let registry = bare();
        let source = r#"{"query":{"match_all":{}}}"#;
        assert_eq!(render(&registry, source, None), source);
        let v = vars(json!({ "unused": "x" }));
        assert_eq!(render(&registry, source, Some(&v)), source);
    }

    #[test]
    fn test_query_template_substitution() {
        let registry = bare();
        let v = vars(json!({ "my_field": "category", "my_value": "1", "my_size": "50" }));
        assert_eq!(
            render(
                &registry,
                r#"{"query":{"match":{"{{my_field}}":"{{my_value}}"}},"size":"{{my_size}}"}"#,
                Some(&v)
            ),
            r#"{"query":{"match":{"category":"1"}},"size":"50"}"#
        );
    }

    #[test]
    fn test_execute_is_deterministic() {
        let registry = bare();
        let template = registry
            .compile("{{#each tags}}{{this}},{{/each}}{{user.name}}")
            .unwrap();
        let v = vars(json!({ "tags": ["a", "b"], "user": { "name": "n" } }));
        let first = registry.execute(&template, Some(&v)).unwrap();
        let second = registry.execute(&template, Some(&v)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, b"a,b,n");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let registry = bare();
        assert_eq!(render(&registry, "[{{missing}}]", None), "[]");
    }

    #[test]
    fn test_strict_mode_rejects_missing_variable() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScriptConfig {
            strict_mode: true,
            ..ScriptConfig::default()
        };
        let registry = TemplateRegistry::initialize(config, dir.path()).unwrap();
        let template = registry.compile("{{missing}}").unwrap();
        assert!(matches!(
            registry.execute(&template, None),
            Err(HbsScriptError::Execution(_))
        ));
    }

    #[test]
    fn test_helper_dir_upper() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("helpers")).unwrap();
        std::fs::write(
            dir.path().join("helpers/strings.rhai"),
            "fn upper(value) { value.to_upper() }",
        )
        .unwrap();

        let registry = TemplateRegistry::initialize(ScriptConfig::default(), dir.path()).unwrap();
        assert_eq!(registry.helpers().names, vec!["upper".to_string()]);
        let v = vars(json!({ "name": "abc" }));
        assert_eq!(render(&registry, "{{upper name}}", Some(&v)), "ABC");
    }

    #[test]
    fn test_configured_base_dir_and_suffix() {
        let helpers = tempfile::tempdir().unwrap();
        std::fs::write(helpers.path().join("valueHelper.js"), r#"fn valueHelper() { "1" }"#)
            .unwrap();
        std::fs::write(helpers.path().join("ignored.rhai"), "fn ignored() { 0 }").unwrap();

        let config = ScriptConfig {
            template_base_dir: Some(helpers.path().to_path_buf()),
            template_file_suffix: ".js".into(),
            ..ScriptConfig::default()
        };
        let conf = tempfile::tempdir().unwrap();
        let registry = TemplateRegistry::initialize(config, conf.path()).unwrap();
        assert_eq!(registry.helpers().names, vec!["valueHelper".to_string()]);
        assert_eq!(render(&registry, "{{valueHelper}}", None), "1");
    }

    #[test]
    fn test_broken_helper_aborts_initialization() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("helpers")).unwrap();
        std::fs::write(dir.path().join("helpers/bad.rhai"), "fn bad( {").unwrap();

        let result = TemplateRegistry::initialize(ScriptConfig::default(), dir.path());
        assert!(matches!(
            result,
            Err(HbsScriptError::HelperRegistration { .. })
        ));
    }

    #[test]
    fn test_unknown_helper_fails_to_compile() {
        let registry = bare();
        match registry.compile("{{nohelper name}}") {
            Err(HbsScriptError::Compile { reason, source, .. }) => {
                assert_eq!(reason, "could not find helper 'nohelper'");
                assert!(source.is_none());
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_partial_fails_to_compile() {
        let registry = bare();
        match registry.compile(r#"{"query":{{> missing}} }"#) {
            Err(HbsScriptError::Compile { reason, .. }) => {
                assert_eq!(reason, "could not find partial 'missing'");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_registered_helpers_resolve_at_compile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("helpers")).unwrap();
        std::fs::write(dir.path().join("helpers/h.rhai"), "fn upper(v) { v.to_upper() }").unwrap();
        let registry = TemplateRegistry::initialize(ScriptConfig::default(), dir.path()).unwrap();
        assert!(registry.compile("{{upper (lookup doc \"title\")}}").is_ok());
        assert!(matches!(
            registry.compile("{{upper (lower name)}}"),
            Err(HbsScriptError::Compile { .. })
        ));
    }

    #[test]
    fn test_zero_argument_reference_resolves_at_render() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScriptConfig {
            strict_mode: true,
            ..ScriptConfig::default()
        };
        let registry = TemplateRegistry::initialize(config, dir.path()).unwrap();
        let template = registry.compile("{{nohelper}}").unwrap();
        assert!(matches!(
            registry.execute(&template, None),
            Err(HbsScriptError::Execution(_))
        ));
    }

    struct Shout;

    impl HelperDef for Shout {
        fn call<'reg: 'rc, 'rc>(
            &self,
            h: &Helper<'rc>,
            _: &'reg Handlebars<'reg>,
            _: &'rc Context,
            _: &mut RenderContext<'reg, 'rc>,
            out: &mut dyn Output,
        ) -> std::result::Result<(), RenderError> {
            let value = h.param(0).map(|p| p.value().render()).unwrap_or_default();
            out.write(&format!("{value}!"))?;
            Ok(())
        }
    }

    #[test]
    fn test_builder_native_helper_and_extra_file() {
        let dir = tempfile::tempdir().unwrap();
        let extra = dir.path().join("extra.script");
        std::fs::write(&extra, "fn twice(v) { v + v }").unwrap();

        let registry = TemplateRegistry::builder(ScriptConfig::default(), dir.path())
            .helper_file(&extra)
            .helper("shout", Box::new(Shout))
            .build()
            .unwrap();
        assert_eq!(
            registry.helpers().names,
            vec!["shout".to_string(), "twice".to_string()]
        );
        let v = vars(json!({ "w": "ab" }));
        assert_eq!(render(&registry, "{{shout (twice w)}}", Some(&v)), "abab!");
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_later_helper_sources_replace_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("helpers")).unwrap();
        std::fs::write(dir.path().join("helpers/a.rhai"), r#"fn shout(v) { "dir" }"#).unwrap();
        let extra = dir.path().join("extra.script");
        std::fs::write(&extra, r#"fn shout(v) { "file" }"#).unwrap();

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let registry = tracing::subscriber::with_default(subscriber, || {
            TemplateRegistry::builder(ScriptConfig::default(), dir.path())
                .helper_file(&extra)
                .helper("shout", Box::new(Shout))
                .build()
                .unwrap()
        });

        assert_eq!(registry.helpers().names, vec!["shout".to_string()]);
        let v = vars(json!({ "w": "hi" }));
        assert_eq!(render(&registry, "{{shout w}}", Some(&v)), "hi!");

        let logs = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(logs.matches("helper redefined").count(), 2);
        assert!(logs.contains("extra.script"));
        assert!(logs.contains("native"));
    }

    #[test]
    fn test_json_escape_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScriptConfig {
            escape: EscapeMode::Json,
            ..ScriptConfig::default()
        };
        let registry = TemplateRegistry::initialize(config, dir.path()).unwrap();
        let v = vars(json!({ "q": "say \"hi\"" }));
        let body = render(&registry, r#"{"query":"{{q}}"}"#, Some(&v));
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["query"], "say \"hi\"");
    }

    struct FailingSink {
        written: Vec<u8>,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("downstream closed"))
        }
    }

    #[test]
    fn test_best_effort_swallows_flush_failure() {
        let registry = bare();
        let template = registry.compile("partial").unwrap();
        let mut sink = FailingSink {
            written: Vec::new(),
        };
        registry.execute_to(&template, None, &mut sink).unwrap();
        assert_eq!(sink.written, b"partial");
    }

    #[test]
    fn test_fail_loud_surfaces_flush_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScriptConfig {
            flush_policy: FlushPolicy::FailLoud,
            ..ScriptConfig::default()
        };
        let registry = TemplateRegistry::initialize(config, dir.path()).unwrap();
        let template = registry.compile("partial").unwrap();
        let mut sink = FailingSink {
            written: Vec::new(),
        };
        assert!(matches!(
            registry.execute_to(&template, None, &mut sink),
            Err(HbsScriptError::EncodingFlush(_))
        ));
    }

    #[test]
    fn test_concurrent_compile_and_execute() {
        let registry = Arc::new(bare());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for round in 0..50 {
                        let source = format!("w{worker}-r{round}-{{{{value}}}}");
                        let template = registry.compile(&source).unwrap();
                        let v = vars(json!({ "value": worker * 1000 + round }));
                        let out = registry.execute(&template, Some(&v)).unwrap();
                        assert_eq!(
                            String::from_utf8(out).unwrap(),
                            format!("w{worker}-r{round}-{}", worker * 1000 + round)
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_registry_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TemplateRegistry>();
        assert_send_sync::<CompiledTemplate>();
    }
}
