//! Core library for hbs-script.
//!
//! Exposes [Handlebars](https://handlebarsjs.com/) as a search-request script language:
//! templates are compiled once into a [`registry::CompiledTemplate`] and rendered against
//! request parameters into UTF-8 query bodies.
//!
//! The pieces:
//! - [`registry::TemplateRegistry`]: owns the Handlebars registry and the helper set loaded
//!   from Rhai scripts at startup; compiles and executes templates
//! - [`executable::ExecutableTemplate`]: a compiled template bound to an owned, mutable
//!   variable map, for hosts that inject variables between runs
//! - [`engine::HandlebarsScriptEngine`]: the [`engine::ScriptEngine`] contract a host
//!   script service plugs in
//!
//! Template parsing and rendering are delegated to the `handlebars` crate; helper scripts
//! run on the `rhai` engine.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod escape;
pub mod executable;
pub mod helpers;
pub mod references;
pub mod registry;

/// Variables a template renders against: string keys to arbitrary JSON values.
pub type Variables = serde_json::Map<String, serde_json::Value>;
