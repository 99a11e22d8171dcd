//! Provider Catalog Store.
//!
//! Owns the configured-but-not-activated providers and the scratch file they
//! live in. Every mutation is in memory only; the file changes on `save`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::write_json_atomic;
use crate::error::AppError;
use crate::schema::{ProviderTypeSchema, SchemaSet};

pub const DEFAULT_CATALOG_FILE: &str = "chi.tmp.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub provider_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub config: IndexMap<String, Value>,
}

/// Null and blank strings count as "not set" everywhere in the engine.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

impl Provider {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider_type: provider_type.into(),
            tags: Vec::new(),
            config: IndexMap::new(),
        }
    }

    /// Non-blank string value of `field`.
    pub fn config_str(&self, field: &str) -> Option<&str> {
        match self.config.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Display form of `field`: strings verbatim, other scalars via JSON.
    pub fn config_display(&self, field: &str) -> Option<String> {
        let value = self.config.get(field)?;
        if is_empty_value(value) {
            return None;
        }
        Some(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn ordered_config(&self, schema: Option<&ProviderTypeSchema>) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        if let Some(schema) = schema {
            for field in &schema.fields {
                if let Some(value) = self.config.get(&field.name) {
                    if !is_empty_value(value) {
                        out.insert(field.name.clone(), value.clone());
                    }
                }
            }
        }
        for (key, value) in &self.config {
            if !out.contains_key(key) && !is_empty_value(value) {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }
}

/// Normalizes a tag list: trimmed, non-empty, first occurrence wins.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    providers: Vec<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_provider_id: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    providers: Vec<Provider>,
    default_provider_id: Option<String>,
    extra: Map<String, Value>,
    next_seq: u64,
    dirty: bool,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

fn id_seq(id: &str) -> Option<u64> {
    id.strip_prefix('p').and_then(|n| n.parse::<u64>().ok())
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            default_provider_id: None,
            extra: Map::new(),
            next_seq: 1,
            dirty: false,
        }
    }

    pub fn from_providers(providers: Vec<Provider>, default_provider_id: Option<String>) -> Self {
        let mut catalog = Self::new();
        for provider in providers {
            if provider.id.trim().is_empty() || catalog.get(&provider.id).is_some() {
                log::warn!("dropping provider with empty or duplicate id '{}'", provider.id);
                continue;
            }
            catalog.providers.push(provider);
        }
        catalog.default_provider_id =
            default_provider_id.filter(|id| catalog.get(id).is_some());
        catalog.next_seq = catalog
            .providers
            .iter()
            .filter_map(|p| id_seq(&p.id))
            .max()
            .unwrap_or(0)
            + 1;
        catalog
    }

    /// Loads the scratch file. A missing file is an empty catalog.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(AppError::io(path, e)),
        };

        let file: CatalogFile =
            serde_json::from_str(&content).map_err(|e| AppError::CatalogParse {
                path: path.display().to_string(),
                source: e,
            })?;

        let providers = file
            .providers
            .into_iter()
            .map(|mut p| {
                // Older scratch files repeated the type inside config.
                let legacy_type =
                    p.config.get("type").and_then(Value::as_str) == Some(p.provider_type.as_str());
                if legacy_type {
                    p.config.shift_remove("type");
                }
                if p.name.trim().is_empty() {
                    p.name = p.id.clone();
                }
                p.tags = normalize_tags(&p.tags);
                p
            })
            .collect();

        if let Some(id) = &file.default_provider_id {
            log::debug!("catalog default provider: {id}");
        }
        let mut catalog = Self::from_providers(providers, file.default_provider_id);
        catalog.extra = file.extra;
        Ok(catalog)
    }

    /// Serializes the catalog and writes it atomically to `path`.
    pub fn save(&mut self, path: &Path, schemas: Option<&SchemaSet>) -> Result<(), AppError> {
        let value = self.to_file_value(schemas);
        write_json_atomic(path, &value)?;
        self.dirty = false;
        log::info!(
            "saved {} providers to {}",
            self.providers.len(),
            path.display()
        );
        Ok(())
    }

    fn to_file_value(&self, schemas: Option<&SchemaSet>) -> CatalogFile {
        let providers = self
            .providers
            .iter()
            .map(|p| Provider {
                config: p.ordered_config(schemas.and_then(|s| s.get(&p.provider_type))),
                ..p.clone()
            })
            .collect();
        CatalogFile {
            providers,
            default_provider_id: self.default_provider_id.clone(),
            extra: self.extra.clone(),
        }
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.providers.iter().position(|p| p.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Provider, AppError> {
        self.providers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown provider id '{id}'")))
    }

    pub fn default_id(&self) -> Option<&str> {
        self.default_provider_id.as_deref()
    }

    pub fn default_provider(&self) -> Option<&Provider> {
        self.default_provider_id
            .as_deref()
            .and_then(|id| self.get(id))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn generate_id(&mut self) -> String {
        loop {
            let candidate = format!("p{}", self.next_seq);
            self.next_seq += 1;
            if self.get(&candidate).is_none() {
                return candidate;
            }
        }
    }

    fn unique_name(&self, base: &str) -> String {
        if !self.providers.iter().any(|p| p.name == base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !self.providers.iter().any(|p| &p.name == candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Appends a provider of `provider_type`, pre-filled with the schema's
    /// defaults, and returns its id.
    pub fn add(&mut self, provider_type: &str, schema: Option<&ProviderTypeSchema>) -> String {
        let id = self.generate_id();
        let mut provider = Provider::new(id.clone(), self.unique_name(provider_type), provider_type);
        if let Some(schema) = schema {
            provider.config = schema.defaults();
        }
        self.providers.push(provider);
        self.dirty = true;
        id
    }

    /// Sets one config field. An empty value removes the field.
    pub fn update(&mut self, id: &str, field: &str, value: Value) -> Result<(), AppError> {
        let provider = self.get_mut(id)?;
        if is_empty_value(&value) {
            provider.config.shift_remove(field);
        } else {
            provider.config.insert(field.to_string(), value);
        }
        self.dirty = true;
        Ok(())
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<(), AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
        self.get_mut(id)?.name = name.to_string();
        self.dirty = true;
        Ok(())
    }

    pub fn set_tags(&mut self, id: &str, tags: Vec<String>) -> Result<(), AppError> {
        self.get_mut(id)?.tags = normalize_tags(tags);
        self.dirty = true;
        Ok(())
    }

    /// Removes a provider; clears the default when it pointed at it.
    pub fn delete(&mut self, id: &str) -> Result<Provider, AppError> {
        let idx = self
            .position(id)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown provider id '{id}'")))?;
        let removed = self.providers.remove(idx);
        if self.default_provider_id.as_deref() == Some(id) {
            self.default_provider_id = None;
        }
        self.dirty = true;
        Ok(removed)
    }

    pub fn set_default(&mut self, id: &str) -> Result<(), AppError> {
        if self.get(id).is_none() {
            return Err(AppError::InvalidInput(format!("unknown provider id '{id}'")));
        }
        self.default_provider_id = Some(id.to_string());
        self.dirty = true;
        Ok(())
    }

    /// Number of required schema fields left empty across the catalog.
    pub fn missing_required(&self, schemas: &SchemaSet) -> usize {
        self.providers
            .iter()
            .map(|p| {
                schemas
                    .get(&p.provider_type)
                    .map(|schema| {
                        schema
                            .fields
                            .iter()
                            .filter(|f| f.required && p.config_display(&f.name).is_none())
                            .count()
                    })
                    .unwrap_or(0)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSchema};
    use serde_json::json;

    fn ollama_schema() -> ProviderTypeSchema {
        let mut port = FieldSchema::text("port");
        port.kind = FieldKind::Integer;
        port.default = Some(json!(11434));
        let mut host = FieldSchema::text("host");
        host.default = Some(json!("localhost"));
        ProviderTypeSchema {
            type_name: "ollama".to_string(),
            fields: vec![host, port, FieldSchema::text("model")],
        }
    }

    #[test]
    fn add_prefills_defaults_and_generates_ids() {
        let mut catalog = Catalog::new();
        let schema = ollama_schema();
        let first = catalog.add("ollama", Some(&schema));
        let second = catalog.add("ollama", Some(&schema));

        assert_eq!(first, "p1");
        assert_eq!(second, "p2");
        let p = catalog.get(&first).expect("first provider");
        assert_eq!(p.name, "ollama");
        assert_eq!(p.config.get("host"), Some(&json!("localhost")));
        assert_eq!(p.config.get("port"), Some(&json!(11434)));
        assert_eq!(catalog.get(&second).map(|p| p.name.as_str()), Some("ollama-2"));
        assert!(catalog.is_dirty());
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let mut catalog = Catalog::new();
        let a = catalog.add("local", None);
        let b = catalog.add("local", None);
        catalog.delete(&b).expect("delete b");
        let c = catalog.add("local", None);
        assert_eq!(a, "p1");
        assert_eq!(c, "p3", "deleted id p2 must not come back");
    }

    #[test]
    fn generated_ids_skip_ones_already_loaded() {
        let catalog = Catalog::from_providers(
            vec![
                Provider::new("p4", "a", "local"),
                Provider::new("custom", "b", "local"),
            ],
            None,
        );
        let mut catalog = catalog;
        assert_eq!(catalog.add("local", None), "p5");
    }

    #[test]
    fn deleting_default_clears_it() {
        let mut catalog = Catalog::new();
        let a = catalog.add("local", None);
        let b = catalog.add("ollama", None);
        catalog.set_default(&a).expect("set default");

        catalog.delete(&b).expect("delete non-default");
        assert_eq!(catalog.default_id(), Some(a.as_str()));

        catalog.delete(&a).expect("delete default");
        assert_eq!(catalog.default_id(), None);
    }

    #[test]
    fn set_default_rejects_unknown_id() {
        let mut catalog = Catalog::new();
        assert!(matches!(
            catalog.set_default("nope"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn update_with_empty_value_removes_field() {
        let mut catalog = Catalog::new();
        let id = catalog.add("ollama", Some(&ollama_schema()));
        catalog.update(&id, "host", json!("")).expect("clear host");
        catalog.update(&id, "model", json!("llama3")).expect("set model");
        let p = catalog.get(&id).expect("provider");
        assert!(p.config.get("host").is_none());
        assert_eq!(p.config_str("model"), Some("llama3"));
    }

    #[test]
    fn set_tags_normalizes() {
        let mut catalog = Catalog::new();
        let id = catalog.add("local", None);
        catalog
            .set_tags(
                &id,
                vec![" fast ".into(), "".into(), "fast".into(), "coding".into()],
            )
            .expect("set tags");
        assert_eq!(catalog.get(&id).map(|p| p.tags.clone()), Some(vec!["fast".to_string(), "coding".to_string()]));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = Catalog::load(&dir.path().join(DEFAULT_CATALOG_FILE)).expect("load");
        assert!(catalog.is_empty());
        assert!(!catalog.is_dirty());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CATALOG_FILE);
        fs::write(&path, "{ not json").expect("seed");
        assert!(matches!(
            Catalog::load(&path),
            Err(AppError::CatalogParse { .. })
        ));
    }

    #[test]
    fn load_drops_dangling_default_and_legacy_type_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CATALOG_FILE);
        fs::write(
            &path,
            serde_json::to_string(&json!({
                "providers": [
                    {"id": "p1", "type": "local", "config": {"type": "local", "model": "m"}}
                ],
                "default_provider_id": "gone"
            }))
            .expect("serialize"),
        )
        .expect("seed");

        let catalog = Catalog::load(&path).expect("load");
        assert_eq!(catalog.default_id(), None);
        let p = catalog.get("p1").expect("p1");
        assert_eq!(p.name, "p1");
        assert!(p.config.get("type").is_none());
        assert_eq!(p.config_str("model"), Some("m"));
    }

    #[test]
    fn config_field_named_type_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CATALOG_FILE);
        let mut provider = Provider::new("p1", "Chat", "openai");
        provider.config.insert("type".into(), json!("chat"));
        provider.config.insert("model".into(), json!("m"));
        let before = provider.config.clone();
        let mut catalog = Catalog::from_providers(vec![provider], None);
        catalog.save(&path, None).expect("save");

        let reloaded = Catalog::load(&path).expect("load");
        assert_eq!(reloaded.get("p1").expect("p1").config, before);
    }

    #[test]
    fn save_orders_fields_by_schema_and_omits_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CATALOG_FILE);
        let mut provider = Provider::new("p1", "Ollama", "ollama");
        provider.config.insert("extra".into(), json!("kept"));
        provider.config.insert("model".into(), json!("llama3"));
        provider.config.insert("port".into(), json!(11434));
        provider.config.insert("host".into(), json!(""));
        let mut catalog = Catalog::from_providers(vec![provider], None);

        let schemas = SchemaSet::new(vec![ollama_schema()]);
        catalog.save(&path, Some(&schemas)).expect("save");

        let saved: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        let keys: Vec<&String> = saved["providers"][0]["config"]
            .as_object()
            .expect("config object")
            .keys()
            .collect();
        assert_eq!(keys, vec!["port", "model", "extra"]);
        assert!(saved.get("default_provider_id").is_none());
        assert!(!catalog.is_dirty());
    }

    #[test]
    fn save_preserves_unknown_top_level_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CATALOG_FILE);
        fs::write(&path, r#"{"providers": [], "ui_hint": {"collapsed": true}}"#).expect("seed");

        let mut catalog = Catalog::load(&path).expect("load");
        catalog.add("local", None);
        catalog.save(&path, None).expect("save");

        let saved: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(saved["ui_hint"], json!({"collapsed": true}));
        assert_eq!(saved["providers"].as_array().map(|a| a.len()), Some(1));
    }

    #[test]
    fn missing_required_counts_empty_required_fields() {
        let mut key = FieldSchema::text("api_key");
        key.kind = FieldKind::Secret;
        key.required = true;
        let schemas = SchemaSet::new(vec![ProviderTypeSchema {
            type_name: "openai".into(),
            fields: vec![key],
        }]);
        let mut catalog = Catalog::new();
        catalog.add("openai", schemas.get("openai"));
        catalog.add("local", None);
        assert_eq!(catalog.missing_required(&schemas), 1);
    }
}
