//! Escape functions for `{{expression}}` output.

use handlebars::Handlebars;

use crate::config::EscapeMode;

/// Install the escape function matching `mode` on a registry.
pub fn apply(hbs: &mut Handlebars<'static>, mode: EscapeMode) {
    match mode {
        EscapeMode::Html => hbs.register_escape_fn(handlebars::html_escape),
        EscapeMode::Json => hbs.register_escape_fn(json_escape),
        EscapeMode::None => hbs.register_escape_fn(handlebars::no_escape),
    }
}

/// Escape `data` so it can sit between the quotes of a JSON string literal.
///
/// Uses serde_json's string encoding with the surrounding quotes removed.
pub fn json_escape(data: &str) -> String {
    let quoted = serde_json::Value::from(data).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
