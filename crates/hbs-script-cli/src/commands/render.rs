use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;

use hbs_script_core::engine::ScriptEngine;
use hbs_script_core::Variables;

use super::Settings;
use crate::output;

/// Render a template against each params file and write the bodies to stdout.
///
/// Every params file renders on its own blocking worker against the same compiled
/// template; bodies are written in the order the files were given.
pub async fn run(
    settings: &Settings,
    template: &str,
    inline: bool,
    params: &[PathBuf],
    set: &[String],
    pretty: bool,
) -> Result<()> {
    let source = if inline {
        template.to_string()
    } else {
        tokio::fs::read_to_string(template)
            .await
            .with_context(|| format!("failed to read template {template}"))?
    };

    let assignments = set
        .iter()
        .map(|s| parse_assignment(s))
        .collect::<Result<Vec<_>>>()?;

    let mut inputs = Vec::with_capacity(params.len());
    for path in params {
        inputs.push(Some(load_params(path).await?));
    }
    if inputs.is_empty() {
        inputs.push(None);
    }

    let loader = settings.clone();
    let engine = tokio::task::spawn_blocking(move || loader.engine()).await??;
    let compiled = engine.compile(&source)?;

    tracing::info!(renders = inputs.len(), "rendering template");

    let mut handles = Vec::with_capacity(inputs.len());
    for vars in inputs {
        let engine = engine.clone();
        let compiled = compiled.clone();
        let assignments = assignments.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            if assignments.is_empty() {
                return engine.execute(&compiled, vars.as_ref());
            }
            let mut exec = engine.executable(&compiled, vars);
            for (name, value) in assignments {
                exec.set_variable(name, value);
            }
            exec.run()
        }));
    }

    let mut bodies = Vec::with_capacity(handles.len());
    for handle in handles {
        let body = handle.await??;
        bodies.push(if pretty { prettify(body) } else { body });
    }

    let mut stdout = std::io::stdout().lock();
    for body in bodies {
        stdout.write_all(&body)?;
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;

    Ok(())
}

/// Parse `KEY=VALUE`. VALUE is taken as JSON when it parses, otherwise as a plain string.
fn parse_assignment(s: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = s.split_once('=') else {
        bail!("invalid --set '{s}': expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("invalid --set '{s}': empty key");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

async fn load_params(path: &Path) -> Result<Variables> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read params {}", path.display()))?;
    match serde_json::from_str(&content)
        .with_context(|| format!("failed to parse params {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("params {} must be a JSON object", path.display()),
    }
}

fn prettify(body: Vec<u8>) -> Vec<u8> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => serde_json::to_vec_pretty(&value).unwrap_or(body),
        Err(e) => {
            output::print_warning(&format!("rendered body is not JSON ({e}), printing as is"));
            body
        }
    }
}
