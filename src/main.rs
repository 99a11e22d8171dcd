use chi_tui_lib::cli::{commands, current_dir, generate_completions, run_tui, Cli, Commands};
use chi_tui_lib::AppError;
use clap::Parser;
use std::process;

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; keep them quiet unless asked so the UI stays clean.
    let log_level = if cli.verbose { "debug" } else { "error" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    match &cli.command {
        None | Some(Commands::Ui) => run_tui(cli),
        Some(Commands::Providers { test }) => commands::providers::execute(&cli.catalog, *test),
        Some(Commands::Write { global, provider }) => {
            let cwd = current_dir()?;
            commands::write::execute(&cli.catalog, &cwd, *global, provider.as_deref())
        }
        Some(Commands::Diagnostics { export }) => {
            let cwd = current_dir()?;
            commands::diagnostics::execute(&cli.catalog, &cwd, export.as_deref())
        }
        Some(Commands::Completions { shell }) => {
            generate_completions(*shell);
            Ok(())
        }
    }
}
