use std::path::Path;

use crate::catalog::Catalog;
use crate::cli::ui::{highlight, success, warning};
use crate::diagnostics::{self, Diagnostics};
use crate::error::AppError;

/// `chi-tui diagnostics [--export [path]]`
pub fn execute(catalog_path: &Path, cwd: &Path, export: Option<&Path>) -> Result<(), AppError> {
    let catalog = match Catalog::load(catalog_path) {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            println!("{}", warning(&format!("⚠ {e}")));
            None
        }
    };
    let diag = diagnostics::collect(cwd, catalog.as_ref());
    print_summary(&diag);

    if let Some(path) = export {
        let written = diagnostics::export(&diag, Some(path), cwd)?;
        println!(
            "\n{}",
            success(&format!("✓ Exported diagnostics to {}", written.display()))
        );
    }
    Ok(())
}

fn print_summary(diag: &Diagnostics) {
    println!("{}", highlight("Diagnostics"));
    println!("{}", "═".repeat(60));
    for line in diag.summary_lines() {
        println!("  {line}");
    }
    println!("{}", "─".repeat(60));
}
