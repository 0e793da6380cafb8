use std::path::PathBuf;

use anyhow::{bail, Result};

use hbs_script_core::engine::ScriptEngine;

use super::Settings;
use crate::output;

/// Compile every template file and report which ones fail.
///
/// Compilation checks syntax plus any helper called with arguments and any `{{> partial}}`;
/// bare `{{name}}` references are resolved at render time.
pub async fn run(settings: &Settings, templates: &[PathBuf]) -> Result<()> {
    output::print_header("hbs-script check");

    let loader = settings.clone();
    let engine = tokio::task::spawn_blocking(move || loader.engine()).await??;

    let mut failed = 0usize;
    for path in templates {
        let label = path.display().to_string();
        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(e) => {
                output::print_error(&format!("{label}: {e}"));
                failed += 1;
                continue;
            }
        };
        match engine.compile(&source) {
            Ok(_) => output::print_success(&label),
            Err(e) => {
                output::print_error(&format!("{label}: {e}"));
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} templates failed to compile", templates.len());
    }
    Ok(())
}
