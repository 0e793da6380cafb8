//! Terminal output formatting for the hbs-script CLI.
//!
//! Status lines go to stderr so rendered bodies on stdout stay pipeable.

use console::style;

/// Print a bold cyan header with an underline separator.
pub fn print_header(text: &str) {
    eprintln!("\n{}", style(text).bold().cyan());
    eprintln!("{}", style("=".repeat(text.len())).dim());
}

/// Print a success message prefixed with green `[OK]`.
pub fn print_success(text: &str) {
    eprintln!("{} {}", style("[OK]").green().bold(), text);
}

/// Print a warning message prefixed with yellow `[WARN]`.
pub fn print_warning(text: &str) {
    eprintln!("{} {}", style("[WARN]").yellow().bold(), text);
}

/// Print an error message prefixed with red `[ERROR]`.
pub fn print_error(text: &str) {
    eprintln!("{} {}", style("[ERROR]").red().bold(), text);
}

/// Print a key-value pair with dimmed key formatting.
pub fn print_key_value(key: &str, value: &str) {
    eprintln!("  {}: {}", style(key).dim(), value);
}
