//! hbs-script CLI: compile and render Handlebars query templates.
//!
//! Provides four commands: `render`, `check`, `helpers`, and `info`.
//!
//! Every command initializes the same [`hbs_script_core::registry::TemplateRegistry`] a
//! search host would, so helper scripts and templates can be tried out before deploying
//! them to the host's config directory.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hbs-script",
    about = "Handlebars query templates for search requests",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to hbs-script.config.json (defaults apply when the file is absent)
    #[arg(long, global = true, default_value = "hbs-script.config.json")]
    config: PathBuf,

    /// Host config directory; helpers load from <conf-dir>/helpers unless configured
    #[arg(long, global = true, env = "HBS_SCRIPT_CONF_DIR")]
    conf_dir: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template against one or more params files
    Render {
        /// Template file (or template source with --inline)
        template: String,

        /// Treat TEMPLATE as template source instead of a file path
        #[arg(long)]
        inline: bool,

        /// JSON object file with template variables; repeat to render several
        #[arg(long, short)]
        params: Vec<PathBuf>,

        /// Set one variable (KEY=VALUE; VALUE parsed as JSON, else taken as a string)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Parse each rendered body as JSON and pretty-print it
        #[arg(long)]
        pretty: bool,
    },

    /// Compile template files and report syntax errors
    Check {
        /// Template files to compile
        #[arg(required = true)]
        templates: Vec<PathBuf>,
    },

    /// List helper scripts and the helpers they register
    Helpers,

    /// Show the script engine's identity and resolved configuration
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = commands::Settings::load(&cli.config, cli.conf_dir.as_deref())?;

    match cli.command {
        Commands::Render {
            template,
            inline,
            params,
            set,
            pretty,
        } => {
            commands::render::run(&settings, &template, inline, &params, &set, pretty).await?;
        }
        Commands::Check { templates } => {
            commands::check::run(&settings, &templates).await?;
        }
        Commands::Helpers => {
            commands::helpers::run(&settings)?;
        }
        Commands::Info => {
            commands::info::run(&settings)?;
        }
    }

    Ok(())
}
