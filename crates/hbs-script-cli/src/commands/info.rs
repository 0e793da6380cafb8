use anyhow::Result;

use hbs_script_core::engine::ScriptEngine;

use super::Settings;
use crate::output;

/// Print the engine identity a host would see, plus the resolved configuration.
pub fn run(settings: &Settings) -> Result<()> {
    output::print_header("hbs-script info");

    let engine = settings.engine()?;

    output::print_key_value("Types", &engine.types().join(", "));
    output::print_key_value("Extensions", &engine.extensions().join(", "));
    output::print_key_value("Sandboxed", &engine.sandboxed().to_string());
    output::print_key_value("Config file", &settings.config_path.display().to_string());
    output::print_key_value("Config dir", &settings.conf_dir.display().to_string());
    output::print_key_value(
        "Helper dir",
        &engine.registry().helper_dir().display().to_string(),
    );

    println!("{}", serde_json::to_string_pretty(engine.registry().config())?);

    engine.close();
    Ok(())
}
