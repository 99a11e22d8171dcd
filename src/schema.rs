//! Schema Registry Client: provider-type definitions and the local model
//! listing, both sourced from the external `chi-llm` authority.

use std::io::ErrorKind;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;

pub const DEFAULT_AUTHORITY_BIN: &str = "chi-llm";
pub const DEFAULT_AUTHORITY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Enum,
    Secret,
}

impl FieldKind {
    /// Unknown spellings degrade to `String` so newer authorities keep working.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => FieldKind::Integer,
            "float" | "number" => FieldKind::Float,
            "bool" | "boolean" => FieldKind::Boolean,
            "enum" | "choice" => FieldKind::Enum,
            "secret" | "password" => FieldKind::Secret,
            _ => FieldKind::String,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Enum => "enum",
            FieldKind::Secret => "secret",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
    pub options: Vec<String>,
    pub help: Option<String>,
}

impl FieldSchema {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::String,
            required: false,
            default: None,
            options: Vec::new(),
            help: None,
        }
    }

    /// Values offered by the selection overlay; empty for free-text kinds.
    pub fn choices(&self) -> Vec<String> {
        match self.kind {
            FieldKind::Enum => self.options.clone(),
            FieldKind::Boolean => vec!["true".to_string(), "false".to_string()],
            _ => Vec::new(),
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind, FieldKind::Enum | FieldKind::Boolean)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderTypeSchema {
    pub type_name: String,
    pub fields: Vec<FieldSchema>,
}

impl ProviderTypeSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn defaults(&self) -> IndexMap<String, Value> {
        self.fields
            .iter()
            .filter_map(|f| f.default.clone().map(|v| (f.name.clone(), v)))
            .collect()
    }

    /// Stand-in used when the authority has no entry for a stored type: every
    /// stored key becomes a plain text field.
    pub fn from_config_keys<'a>(
        type_name: &str,
        keys: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        Self {
            type_name: type_name.to_string(),
            fields: keys.into_iter().map(FieldSchema::text).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSet {
    types: Vec<ProviderTypeSchema>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    providers: Vec<RawType>,
}

#[derive(Deserialize)]
struct RawType {
    #[serde(rename = "type", default)]
    type_name: String,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawField {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", alias = "kind", default)]
    kind: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default, alias = "choices", alias = "enum")]
    options: Vec<Value>,
    #[serde(default)]
    help: Option<String>,
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl SchemaSet {
    pub fn new(types: Vec<ProviderTypeSchema>) -> Self {
        Self { types }
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let payload: RawPayload = serde_json::from_str(raw)
            .map_err(|e| AppError::SchemaFetch(format!("invalid schema output: {e}")))?;

        let mut types: Vec<ProviderTypeSchema> = Vec::new();
        for raw_type in payload.providers {
            let type_name = raw_type.type_name.trim().to_string();
            if type_name.is_empty() || types.iter().any(|t| t.type_name == type_name) {
                continue;
            }
            let mut fields: Vec<FieldSchema> = Vec::new();
            for raw_field in raw_type.fields {
                let name = raw_field.name.trim().to_string();
                if name.is_empty() || fields.iter().any(|f| f.name == name) {
                    continue;
                }
                let options: Vec<String> = raw_field.options.iter().map(value_label).collect();
                let mut kind = FieldKind::parse(&raw_field.kind);
                if kind == FieldKind::Enum && options.is_empty() {
                    kind = FieldKind::String;
                }
                fields.push(FieldSchema {
                    name,
                    kind,
                    required: raw_field.required,
                    default: raw_field.default.filter(|v| !v.is_null()),
                    options,
                    help: raw_field.help.filter(|h| !h.trim().is_empty()),
                });
            }
            types.push(ProviderTypeSchema { type_name, fields });
        }

        if types.is_empty() {
            return Err(AppError::SchemaFetch(
                "authority returned no provider types".to_string(),
            ));
        }
        Ok(Self { types })
    }

    pub fn get(&self, type_name: &str) -> Option<&ProviderTypeSchema> {
        self.types.iter().find(|t| t.type_name == type_name)
    }

    pub fn types(&self) -> &[ProviderTypeSchema] {
        &self.types
    }

    pub fn type_names(&self) -> Vec<String> {
        self.types.iter().map(|t| t.type_name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    pub size: Option<String>,
    pub tags: Vec<String>,
    pub downloaded: bool,
    pub current: bool,
    pub recommended_ram_gb: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelListing {
    pub models: Vec<ModelEntry>,
    pub available_ram_gb: Option<f64>,
}

#[derive(Deserialize)]
struct RawModel {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<Value>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    downloaded: bool,
    #[serde(default)]
    current: bool,
    #[serde(default, alias = "ram_gb", alias = "min_ram_gb")]
    recommended_ram_gb: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawListing {
    Bare(Vec<RawModel>),
    Wrapped {
        #[serde(default)]
        models: Vec<RawModel>,
        #[serde(default)]
        available_ram_gb: Option<f64>,
    },
}

impl ModelListing {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let listing: RawListing = serde_json::from_str(raw)
            .map_err(|e| AppError::SchemaFetch(format!("invalid model listing: {e}")))?;
        let (raw_models, available_ram_gb) = match listing {
            RawListing::Bare(models) => (models, None),
            RawListing::Wrapped {
                models,
                available_ram_gb,
            } => (models, available_ram_gb),
        };
        let models = raw_models
            .into_iter()
            .filter(|m| !m.id.trim().is_empty())
            .map(|m| ModelEntry {
                name: m.name.unwrap_or_else(|| m.id.clone()),
                id: m.id,
                size: m.size.as_ref().map(value_label),
                tags: m.tags,
                downloaded: m.downloaded,
                current: m.current,
                recommended_ram_gb: m.recommended_ram_gb,
            })
            .collect();
        Ok(Self {
            models,
            available_ram_gb,
        })
    }

    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for model in &self.models {
            for tag in &model.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags.sort();
        tags
    }
}

/// Handle on the external schema authority binary.
#[derive(Debug, Clone)]
pub struct SchemaAuthority {
    bin: String,
    timeout: Duration,
}

impl SchemaAuthority {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            timeout: DEFAULT_AUTHORITY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Startup reachability check (`<bin> --version`), run before any page
    /// is drawn. Every failure here is fatal.
    pub fn check_available(&self) -> Result<(), AppError> {
        let spawned = Command::new(&self.bin)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::StartupDependencyMissing {
                    message: format!(
                        "Required CLI '{}' not found in PATH.\n\nInstall: pip install chi-llm (or pip install -e .[full] inside the repo).",
                        self.bin
                    ),
                });
            }
            Err(e) => {
                return Err(AppError::StartupDependencyMissing {
                    message: format!("Failed to execute '{} --version': {e}", self.bin),
                });
            }
        };

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return Ok(()),
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AppError::StartupDependencyMissing {
                        message: format!(
                            "'{} --version' did not respond within {}s",
                            self.bin,
                            self.timeout.as_secs()
                        ),
                    });
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(20)),
                Err(e) => {
                    return Err(AppError::StartupDependencyMissing {
                        message: format!("Failed to wait for '{} --version': {e}", self.bin),
                    });
                }
            }
        }
    }

    async fn run_json(&self, args: &[&str]) -> Result<String, AppError> {
        let mut cmd = tokio::process::Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AppError::SchemaFetch(format!(
                    "failed to run {} {}: {e}",
                    self.bin,
                    args.join(" ")
                )));
            }
            Err(_) => {
                return Err(AppError::SchemaFetch(format!(
                    "{} {} timed out after {}s",
                    self.bin,
                    args.join(" "),
                    self.timeout.as_secs_f32()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AppError::SchemaFetch(format!(
                "{} {} failed: {}",
                self.bin,
                args.join(" "),
                if stderr.is_empty() {
                    output.status.to_string()
                } else {
                    stderr
                }
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn fetch_types(&self) -> Result<SchemaSet, AppError> {
        let raw = self.run_json(&["providers", "schema", "--json"]).await?;
        let set = SchemaSet::from_json(&raw)?;
        log::debug!("schema authority returned {} provider types", set.types().len());
        Ok(set)
    }

    pub async fn fetch_models(&self) -> Result<ModelListing, AppError> {
        let raw = self.run_json(&["models", "list", "--json"]).await?;
        ModelListing::from_json(&raw)
    }
}

impl Default for SchemaAuthority {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHORITY_BIN)
    }
}
