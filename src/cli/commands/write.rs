use std::path::Path;

use crate::activation::{self, resolve_active, Target};
use crate::catalog::Catalog;
use crate::cli::ui::{highlight, info, success};
use crate::error::AppError;

/// `chi-tui write [--global] [--provider <id>]`
pub fn execute(
    catalog_path: &Path,
    cwd: &Path,
    global: bool,
    provider: Option<&str>,
) -> Result<(), AppError> {
    let catalog = Catalog::load(catalog_path)?;
    let target = if global { Target::Global } else { Target::Project };
    let path = activation::write(&catalog, provider, target, cwd)?;
    let active = resolve_active(&catalog, provider)?;

    println!(
        "{}",
        success(&format!("✓ Wrote {} config to {}", target.label(), path.display()))
    );
    println!(
        "{} Provider: {} ({})",
        info("→"),
        highlight(&active.name),
        active.provider_type
    );
    Ok(())
}
