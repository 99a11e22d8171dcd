//! Config Writer: turns the active provider into the activation file the
//! external tool reads.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::{is_empty_value, Catalog, Provider};
use crate::config::{home_dir, write_json_atomic};
use crate::error::AppError;
use crate::form::mask_secret;
use crate::rules::canonical_type;
use crate::schema::{FieldKind, ProviderTypeSchema};

pub const PROJECT_CONFIG_FILE: &str = ".chi_llm.json";

/// Provider keys carried into the activation file, in output order.
pub const ACTIVATION_FIELDS: &[&str] = &[
    "model", "host", "port", "api_key", "base_url", "org_id", "timeout",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    Project,
    Global,
}

impl Target {
    pub fn toggle(self) -> Self {
        match self {
            Target::Project => Target::Global,
            Target::Global => Target::Project,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Target::Project => "Project (.chi_llm.json)",
            Target::Global => "Global (~/.cache/chi_llm/model_config.json)",
        }
    }

    /// Destination file; project targets resolve against `cwd`.
    pub fn path(self, cwd: &Path) -> Result<PathBuf, AppError> {
        match self {
            Target::Project => Ok(cwd.join(PROJECT_CONFIG_FILE)),
            Target::Global => Ok(home_dir()?
                .join(".cache")
                .join("chi_llm")
                .join("model_config.json")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationConfig {
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
}

#[derive(Serialize)]
struct ActivationFile<'a> {
    provider: &'a ActivationConfig,
}

fn normalize_port(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<u64>() {
                Ok(n) => Some(Value::from(n)),
                Err(_) => Some(Value::String(s.to_string())),
            }
        }
        _ => None,
    }
}

fn normalize_timeout(value: &Value) -> Option<Value> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n <= 0.0 {
        return None;
    }
    if n.fract() == 0.0 && n <= u32::MAX as f64 {
        Some(Value::from(n as u64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}

impl ActivationConfig {
    pub fn from_provider(provider: &Provider) -> Self {
        let mut fields = IndexMap::new();
        for key in ACTIVATION_FIELDS {
            let Some(value) = provider.config.get(*key) else {
                continue;
            };
            if is_empty_value(value) {
                continue;
            }
            let value = match *key {
                "port" => normalize_port(value),
                "timeout" => normalize_timeout(value),
                _ => Some(value.clone()),
            };
            if let Some(value) = value {
                fields.insert(key.to_string(), value);
            }
        }
        Self {
            provider_type: canonical_type(&provider.provider_type).to_string(),
            fields,
        }
    }

    pub fn to_value(&self) -> Result<Value, AppError> {
        serde_json::to_value(ActivationFile { provider: self })
            .map_err(|e| AppError::JsonSerialize { source: e })
    }

    /// Pretty JSON with secret fields masked, for on-screen preview.
    pub fn masked_preview(&self, schema: Option<&ProviderTypeSchema>) -> Result<String, AppError> {
        let mut masked = self.clone();
        for (key, value) in masked.fields.iter_mut() {
            let secret = key == "api_key"
                || schema
                    .and_then(|s| s.field(key))
                    .is_some_and(|f| f.kind == FieldKind::Secret);
            if let (true, Value::String(s)) = (secret, value) {
                *s = mask_secret(s, false);
            }
        }
        serde_json::to_string_pretty(&masked.to_value()?)
            .map_err(|e| AppError::JsonSerialize { source: e })
    }
}

/// Picks the provider to activate: the override when given, else the
/// catalog default.
pub fn resolve_active<'a>(
    catalog: &'a Catalog,
    override_id: Option<&str>,
) -> Result<&'a Provider, AppError> {
    match override_id {
        Some(id) => catalog
            .get(id)
            .ok_or_else(|| AppError::Validation(format!("unknown provider id '{id}'"))),
        None => catalog
            .default_provider()
            .ok_or_else(|| AppError::Validation("no default provider selected".to_string())),
    }
}

/// Writes the activation file for the resolved provider and returns its path.
pub fn write(
    catalog: &Catalog,
    override_id: Option<&str>,
    target: Target,
    cwd: &Path,
) -> Result<PathBuf, AppError> {
    let provider = resolve_active(catalog, override_id)?;
    let config = ActivationConfig::from_provider(provider);
    let path = target
        .path(cwd)
        .map_err(|e| AppError::ConfigWrite(e.to_string()))?;
    write_json_atomic(&path, &ActivationFile { provider: &config })
        .map_err(|e| AppError::ConfigWrite(e.to_string()))?;
    log::info!(
        "activated {} ({}) -> {}",
        provider.id,
        config.provider_type,
        path.display()
    );
    Ok(path)
}
