use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

pub mod commands;
pub mod tui;
pub mod ui;

use crate::catalog::DEFAULT_CATALOG_FILE;
use crate::diagnostics::DEFAULT_EXPORT_FILE;
use crate::error::AppError;
use crate::schema::{SchemaAuthority, DEFAULT_AUTHORITY_BIN};

#[derive(Parser, Debug)]
#[command(
    name = "chi-tui",
    version,
    about = "Configure chi-llm providers and write the activation file",
    long_about = "Terminal UI for managing chi-llm provider configurations: edit providers from the schema chi-llm publishes, test connectivity, pick a default and write .chi_llm.json.\n\nRun without arguments to open the UI."
)]
pub struct Cli {
    /// Draw in the main screen instead of the alternate screen
    #[arg(long, global = true)]
    pub no_alt: bool,

    /// Render one frame and exit
    #[arg(long, global = true)]
    pub once: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Provider catalog (scratch) file
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CATALOG_FILE)]
    pub catalog: PathBuf,

    /// chi-llm binary used as the schema authority
    #[arg(
        long,
        global = true,
        value_name = "BIN",
        env = "CHI_LLM_BIN",
        default_value = DEFAULT_AUTHORITY_BIN
    )]
    pub authority: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Open the terminal UI (default)
    Ui,

    /// Print the provider catalog
    Providers {
        /// Run a connectivity test for every provider
        #[arg(long)]
        test: bool,
    },

    /// Write the activation file for the default (or given) provider
    Write {
        /// Write ~/.cache/chi_llm/model_config.json instead of ./.chi_llm.json
        #[arg(long)]
        global: bool,

        /// Provider id to activate instead of the catalog default
        #[arg(long, value_name = "ID")]
        provider: Option<String>,
    },

    /// Show the diagnostics snapshot
    Diagnostics {
        /// Also export it as JSON
        #[arg(
            long,
            value_name = "PATH",
            num_args = 0..=1,
            default_missing_value = DEFAULT_EXPORT_FILE
        )]
        export: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Generate shell completions
pub fn generate_completions(shell: Shell) {
    use clap::CommandFactory;
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}

pub fn current_dir() -> Result<PathBuf, AppError> {
    std::env::current_dir().map_err(|e| AppError::IoContext {
        context: "failed to read working directory".to_string(),
        source: e,
    })
}

/// Verifies the schema authority answers, then runs the UI until quit.
pub fn run_tui(cli: &Cli) -> Result<(), AppError> {
    let authority = SchemaAuthority::new(cli.authority.clone());
    authority.check_available()?;
    log::debug!("schema authority '{}' is available", authority.bin());

    let mut opts = tui::TuiOptions::new(cli.catalog.clone(), current_dir()?, authority);
    opts.use_alt = !cli.no_alt;
    opts.once = cli.once;
    tui::run(opts)
}
