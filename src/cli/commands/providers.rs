use std::path::Path;
use std::time::Duration;

use comfy_table::Table;

use crate::catalog::{Catalog, Provider};
use crate::cli::ui::{create_table, error, highlight, info, success};
use crate::error::AppError;
use crate::probe::{self, ProbeResult, DEFAULT_PROBE_TIMEOUT};
use crate::rules::MODEL_FIELD;

/// `chi-tui providers [--test]`
pub fn execute(catalog_path: &Path, test: bool) -> Result<(), AppError> {
    let catalog = Catalog::load(catalog_path)?;
    if catalog.is_empty() {
        println!("{}", info("No providers found."));
        println!("Run 'chi-tui' and press 'a' on the Providers page to add one.");
        return Ok(());
    }

    let results = if test {
        Some(probe_all(&catalog, DEFAULT_PROBE_TIMEOUT)?)
    } else {
        None
    };

    println!("{}", provider_table(&catalog, results.as_deref()));
    match catalog.default_provider() {
        Some(p) => println!("{} Default: {}", info("→"), highlight(&p.name)),
        None => println!("{} No default provider selected", info("ℹ")),
    }
    Ok(())
}

/// Probes providers one after another on a single-threaded runtime.
fn probe_all(catalog: &Catalog, timeout: Duration) -> Result<Vec<ProbeResult>, AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::IoContext {
            context: "failed to start async runtime".to_string(),
            source: e,
        })?;

    Ok(catalog
        .providers()
        .iter()
        .map(|p| {
            runtime
                .block_on(probe::probe(p, None, timeout))
                .unwrap_or_else(refused)
        })
        .collect())
}

fn refused(err: AppError) -> ProbeResult {
    ProbeResult {
        ok: false,
        status: None,
        latency: None,
        message: err.to_string(),
    }
}

fn model_cell(provider: &Provider) -> String {
    provider
        .config_display(MODEL_FIELD)
        .unwrap_or_else(|| "-".to_string())
}

fn test_cell(result: &ProbeResult) -> String {
    if result.ok {
        success(&format!("✓ {}", result.summary()))
    } else {
        error(&format!("✗ {}", result.summary()))
    }
}

pub(crate) fn provider_table(catalog: &Catalog, results: Option<&[ProbeResult]>) -> Table {
    let mut table = create_table();
    let mut header = vec!["", "ID", "Name", "Type", "Model", "Tags"];
    if results.is_some() {
        header.push("Test");
    }
    table.set_header(header);

    let default_id = catalog.default_id();
    for (idx, provider) in catalog.providers().iter().enumerate() {
        let marker = if Some(provider.id.as_str()) == default_id {
            "★"
        } else {
            ""
        };
        let mut row = vec![
            marker.to_string(),
            provider.id.clone(),
            provider.name.clone(),
            provider.provider_type.clone(),
            model_cell(provider),
            provider.tags.join(", "),
        ];
        if let Some(result) = results.and_then(|r| r.get(idx)) {
            row.push(test_cell(result));
        }
        table.add_row(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_marks_default_and_lists_model() {
        let mut catalog = Catalog::new();
        let a = catalog.add("ollama", None);
        catalog.update(&a, "model", json!("llama3.2")).expect("update");
        let b = catalog.add("openai", None);
        catalog.set_default(&b).expect("default");

        let rendered = provider_table(&catalog, None).to_string();
        assert!(rendered.contains("llama3.2"));
        assert!(rendered.contains("★"));
        assert!(!rendered.contains("Test"));
    }

    #[test]
    fn gated_probe_is_reported_not_raised() {
        let mut catalog = Catalog::new();
        catalog.add("openai", None);
        let results = probe_all(&catalog, Duration::from_millis(200)).expect("probe");
        assert_eq!(results.len(), 1);
        assert!(!results[0].ok);
    }
}
