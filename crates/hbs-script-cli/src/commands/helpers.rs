use anyhow::Result;

use super::Settings;
use crate::output;

/// Load the helper directory the way the engine does and list what got registered.
pub fn run(settings: &Settings) -> Result<()> {
    output::print_header("hbs-script helpers");

    let engine = settings.engine()?;
    let registry = engine.registry();
    let helpers = registry.helpers();

    output::print_key_value("Directory", &registry.helper_dir().display().to_string());
    output::print_key_value("Suffix", &registry.config().template_file_suffix);
    output::print_key_value("Files", &helpers.files.len().to_string());
    for file in &helpers.files {
        eprintln!("    {}", file.display());
    }

    if helpers.names.is_empty() {
        output::print_warning("no helpers registered");
        return Ok(());
    }

    output::print_key_value("Helpers", &helpers.names.len().to_string());
    for name in &helpers.names {
        println!("{name}");
    }

    Ok(())
}
