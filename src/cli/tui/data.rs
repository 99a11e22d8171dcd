use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::catalog::{Catalog, Provider, DEFAULT_CATALOG_FILE};
use crate::diagnostics::Diagnostics;
use crate::error::AppError;
use crate::form::schema_for;
use crate::probe::ProbeResult;
use crate::schema::{ModelListing, ProviderTypeSchema, SchemaSet};

/// Lifecycle of a value fetched from the schema worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    NotRequested,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> Loadable<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Loadable::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Loading)
    }

    pub fn is_requested(&self) -> bool {
        !matches!(self, Loadable::NotRequested)
    }
}

#[derive(Debug, Clone)]
pub struct UiData {
    pub catalog: Catalog,
    pub catalog_path: PathBuf,
    pub cwd: PathBuf,
    pub schemas: Loadable<SchemaSet>,
    pub models: Loadable<ModelListing>,
    pub diagnostics: Option<Diagnostics>,
    pub last_export: Option<PathBuf>,
    pub last_write: Option<PathBuf>,
    pub probe_results: HashMap<String, ProbeResult>,
}

impl Default for UiData {
    fn default() -> Self {
        Self {
            catalog: Catalog::new(),
            catalog_path: PathBuf::from(DEFAULT_CATALOG_FILE),
            cwd: PathBuf::from("."),
            schemas: Loadable::NotRequested,
            models: Loadable::NotRequested,
            diagnostics: None,
            last_export: None,
            last_write: None,
            probe_results: HashMap::new(),
        }
    }
}

impl UiData {
    /// Loads the catalog. A malformed file degrades to an empty catalog and
    /// the parse error comes back as a warning for the caller to surface.
    pub fn load(catalog_path: &Path, cwd: &Path) -> Result<(Self, Option<String>), AppError> {
        let (catalog, warning) = match Catalog::load(catalog_path) {
            Ok(catalog) => (catalog, None),
            Err(err @ AppError::CatalogParse { .. }) => {
                log::warn!("{err}");
                (Catalog::new(), Some(format!("{err}; starting with an empty catalog")))
            }
            Err(err) => return Err(err),
        };
        Ok((
            Self {
                catalog,
                catalog_path: catalog_path.to_path_buf(),
                cwd: cwd.to_path_buf(),
                ..Self::default()
            },
            warning,
        ))
    }

    pub fn schema_set(&self) -> Option<&SchemaSet> {
        self.schemas.ready()
    }

    pub fn provider_schema(&self, provider: &Provider) -> ProviderTypeSchema {
        schema_for(provider, self.schema_set())
    }

    pub fn provider_at(&self, idx: usize) -> Option<&Provider> {
        self.catalog.providers().get(idx)
    }

    pub fn catalog_file_name(&self) -> String {
        self.catalog_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.catalog_path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_catalog_degrades_with_warning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CATALOG_FILE);
        std::fs::write(&path, "[broken").expect("seed");

        let (data, warning) = UiData::load(&path, dir.path()).expect("load");
        assert!(data.catalog.is_empty());
        assert!(warning.is_some_and(|w| w.contains("empty catalog")));
    }

    #[test]
    fn unknown_type_gets_text_schema_from_config() {
        let mut data = UiData::default();
        let id = data.catalog.add("mystery", None);
        data.catalog
            .update(&id, "endpoint", serde_json::json!("http://x"))
            .expect("update");
        let provider = data.catalog.get(&id).cloned().expect("provider");
        let schema = data.provider_schema(&provider);
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.fields[0].name, "endpoint");
    }
}
