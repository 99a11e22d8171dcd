//! Diagnostics Collector: a read-only snapshot of the activation file and the
//! environment around it. No network calls; credentials are only ever
//! reported as present or missing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activation::PROJECT_CONFIG_FILE;
use crate::catalog::Catalog;
use crate::config::write_json_atomic;
use crate::error::AppError;
use crate::rules::{self, EnvHint};

pub const DEFAULT_EXPORT_FILE: &str = "chi_llm_diagnostics.json";

/// Parent levels searched above the working directory.
const SEARCH_PARENTS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub providers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub timestamp: String,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_model: Option<String>,
    pub env: BTreeMap<String, String>,
    pub hints: Vec<String>,
    pub catalog: CatalogSummary,
}

/// Looks for the project activation file in `start` and up to three parents.
pub fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .take(SEARCH_PARENTS + 1)
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

fn read_provider(path: &Path) -> (Option<String>, Option<String>) {
    let parsed = std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok());
    let Some(provider) = parsed.as_ref().and_then(|v| v.get("provider")) else {
        log::warn!("could not read provider from {}", path.display());
        return (None, None);
    };
    let text = |key: &str| {
        provider
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    (
        text("type").map(|t| rules::canonical_type(&t).to_string()),
        text("model"),
    )
}

/// Where the collector reads the process environment from.
pub trait Environment {
    fn var(&self, name: &str) -> Option<String>;
    fn on_path(&self, bin: &str) -> bool;
}

pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn on_path(&self, bin: &str) -> bool {
        which::which(bin).is_ok()
    }
}

fn apply_hints(
    provider_type: &str,
    env: &dyn Environment,
    out: &mut BTreeMap<String, String>,
    hints: &mut Vec<String>,
) {
    let Some(rule) = rules::rule_for(provider_type) else {
        return;
    };
    for hint in rule.env {
        match *hint {
            EnvHint::Credential { var, hint } => {
                if env.var(var).is_some() {
                    out.insert(var.to_string(), "set".to_string());
                } else {
                    out.insert(var.to_string(), "missing".to_string());
                    hints.push(hint.to_string());
                }
            }
            EnvHint::Binary { bin, hint } => {
                if env.on_path(bin) {
                    out.insert(bin.to_string(), "found".to_string());
                } else {
                    out.insert(bin.to_string(), "not-found".to_string());
                    hints.push(hint.to_string());
                }
            }
            EnvHint::Informative { var, hint } => match env.var(var) {
                Some(value) => {
                    out.insert(var.to_string(), value);
                }
                None if !hint.is_empty() => hints.push(hint.to_string()),
                None => {}
            },
            EnvHint::Note(note) => hints.push(note.to_string()),
        }
    }
}

/// Builds a snapshot for `cwd` using `env` for variables and PATH lookups.
pub fn collect_with(cwd: &Path, catalog: Option<&Catalog>, env: &dyn Environment) -> Diagnostics {
    let config_path = find_project_config(cwd);
    let (provider_type, provider_model) = config_path
        .as_deref()
        .map(read_provider)
        .unwrap_or((None, None));

    let mut env_map = BTreeMap::new();
    let mut hints = Vec::new();
    // No activation file yet means the tool falls back to its local default.
    let effective = provider_type.as_deref().unwrap_or("local");
    apply_hints(effective, env, &mut env_map, &mut hints);

    Diagnostics {
        timestamp: chrono::Local::now().to_rfc3339(),
        cwd: cwd.display().to_string(),
        config_path: config_path.map(|p| p.display().to_string()),
        provider_type,
        provider_model,
        env: env_map,
        hints,
        catalog: catalog
            .map(|c| CatalogSummary {
                providers: c.len(),
                default_provider_id: c.default_id().map(str::to_string),
            })
            .unwrap_or_default(),
    }
}

pub fn collect(cwd: &Path, catalog: Option<&Catalog>) -> Diagnostics {
    collect_with(cwd, catalog, &SystemEnvironment)
}

impl Diagnostics {
    /// Human-readable lines for the Diagnostics page and CLI.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("cwd: {}", self.cwd)];
        match &self.config_path {
            Some(path) => lines.push(format!("config: {path}")),
            None => lines.push(format!("config: no {PROJECT_CONFIG_FILE} found")),
        }
        lines.push(format!(
            "provider: {}",
            self.provider_type.as_deref().unwrap_or("(default)")
        ));
        if let Some(model) = &self.provider_model {
            lines.push(format!("model: {model}"));
        }
        lines.push(format!(
            "catalog: {} providers, default {}",
            self.catalog.providers,
            self.catalog.default_provider_id.as_deref().unwrap_or("none")
        ));
        for (key, value) in &self.env {
            lines.push(format!("env {key}: {value}"));
        }
        lines.extend(self.hints.iter().map(|h| format!("hint: {h}")));
        lines
    }
}

/// Writes the snapshot as pretty JSON. A relative path resolves against `cwd`.
pub fn export(diag: &Diagnostics, path: Option<&Path>, cwd: &Path) -> Result<PathBuf, AppError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_EXPORT_FILE));
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    write_json_atomic(&path, diag)?;
    log::info!("exported diagnostics to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    #[derive(Default)]
    struct FakeEnv {
        vars: HashMap<&'static str, &'static str>,
        bins: Vec<&'static str>,
    }

    impl Environment for FakeEnv {
        fn var(&self, name: &str) -> Option<String> {
            self.vars.get(name).map(|v| v.to_string())
        }

        fn on_path(&self, bin: &str) -> bool {
            self.bins.contains(&bin)
        }
    }

    fn write_config(dir: &Path, provider: &str) {
        fs::write(dir.join(PROJECT_CONFIG_FILE), provider).expect("write config");
    }

    #[test]
    fn finds_config_up_to_three_parents() {
        let root = tempfile::tempdir().expect("tempdir");
        let deep = root.path().join("a").join("b").join("c");
        fs::create_dir_all(&deep).expect("mkdir");
        write_config(root.path(), r#"{"provider":{"type":"ollama"}}"#);
        assert_eq!(
            find_project_config(&deep),
            Some(root.path().join(PROJECT_CONFIG_FILE))
        );

        let deeper = deep.join("d");
        fs::create_dir_all(&deeper).expect("mkdir");
        assert_eq!(find_project_config(&deeper), None);
    }

    #[test]
    fn credential_is_reported_without_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_config(
            dir.path(),
            r#"{"provider":{"type":"openai","model":"gpt-4o-mini"}}"#,
        );
        let mut env = FakeEnv::default();
        env.vars.insert("OPENAI_API_KEY", "sk-very-secret");

        let diag = collect_with(dir.path(), None, &env);
        assert_eq!(diag.provider_type.as_deref(), Some("openai"));
        assert_eq!(diag.provider_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(diag.env.get("OPENAI_API_KEY").map(String::as_str), Some("set"));
        let json = serde_json::to_string(&diag).expect("serialize");
        assert!(!json.contains("sk-very-secret"));
    }

    #[test]
    fn missing_binary_and_alias_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_config(dir.path(), r#"{"provider":{"type":"ollama"}}"#);
        let diag = collect_with(dir.path(), None, &FakeEnv::default());
        assert_eq!(diag.env.get("ollama").map(String::as_str), Some("not-found"));
        assert!(diag.hints.iter().any(|h| h.contains("Install Ollama")));

        write_config(dir.path(), r#"{"provider":{"type":"llamacpp"}}"#);
        let diag = collect_with(dir.path(), None, &FakeEnv::default());
        assert_eq!(diag.provider_type.as_deref(), Some("local"));
        assert!(diag.hints.iter().any(|h| h.contains("no API keys")));
    }

    #[test]
    fn catalog_counts_are_included() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut catalog = Catalog::new();
        let id = catalog.add("local", None);
        catalog.set_default(&id).expect("default");
        let diag = collect_with(dir.path(), Some(&catalog), &FakeEnv::default());
        assert_eq!(diag.catalog.providers, 1);
        assert_eq!(diag.catalog.default_provider_id.as_deref(), Some("p1"));
        assert!(diag.config_path.is_none());
    }

    #[test]
    fn export_defaults_to_working_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let diag = collect_with(dir.path(), None, &FakeEnv::default());
        let path = export(&diag, None, dir.path()).expect("export");
        assert_eq!(path, dir.path().join(DEFAULT_EXPORT_FILE));
        let back: Diagnostics =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(back, diag);
    }
}
