//! Declarative per-type facts.
//!
//! Everything the engine knows about a specific provider type lives in the
//! tables below. Forms, the catalog and rendering stay generic; the probe
//! service, config writer and diagnostics look a type up here instead of
//! branching on its name.

use crate::catalog::Provider;
use crate::error::AppError;

/// Legacy or UI-only spellings and the canonical type they map to.
pub const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("llamacpp", "local"),
    ("local-zeroconfig", "local"),
    ("local-custom", "local"),
];

/// Field a model browser pick is written into.
pub const MODEL_FIELD: &str = "model";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeRule {
    /// GET `http://host:port{path}` and count the array under `list_key`.
    Listing {
        path: &'static str,
        list_key: &'static str,
        noun: &'static str,
        default_host: &'static str,
        default_port: u16,
    },
    /// GET `{base_url}{path}` with a bearer credential.
    Bearer {
        path: &'static str,
        list_key: &'static str,
        noun: &'static str,
        credential_field: &'static str,
        base_url_field: &'static str,
        org_field: &'static str,
        default_base_url: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvHint {
    /// Credential variable; only presence is ever reported.
    Credential {
        var: &'static str,
        hint: &'static str,
    },
    /// Helper binary expected on PATH.
    Binary {
        bin: &'static str,
        hint: &'static str,
    },
    /// Optional variable whose value is safe to show.
    Informative {
        var: &'static str,
        hint: &'static str,
    },
    Note(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct TypeRule {
    pub type_name: &'static str,
    pub probe: Option<ProbeRule>,
    pub env: &'static [EnvHint],
}

pub const TYPE_RULES: &[TypeRule] = &[
    TypeRule {
        type_name: "local",
        probe: None,
        env: &[EnvHint::Note("Local provider requires no API keys")],
    },
    TypeRule {
        type_name: "lmstudio",
        probe: Some(ProbeRule::Listing {
            path: "/v1/models",
            list_key: "data",
            noun: "models",
            default_host: "localhost",
            default_port: 1234,
        }),
        env: &[EnvHint::Informative {
            var: "LMSTUDIO_BASE_URL",
            hint: "Optionally set LMSTUDIO_BASE_URL (default http://localhost:1234)",
        }],
    },
    TypeRule {
        type_name: "ollama",
        probe: Some(ProbeRule::Listing {
            path: "/api/tags",
            list_key: "models",
            noun: "tags",
            default_host: "localhost",
            default_port: 11434,
        }),
        env: &[
            EnvHint::Binary {
                bin: "ollama",
                hint: "Install Ollama and ensure it is on PATH",
            },
            EnvHint::Informative {
                var: "OLLAMA_HOST",
                hint: "",
            },
        ],
    },
    TypeRule {
        type_name: "openai",
        probe: Some(ProbeRule::Bearer {
            path: "/models",
            list_key: "data",
            noun: "models",
            credential_field: "api_key",
            base_url_field: "base_url",
            org_field: "org_id",
            default_base_url: "https://api.openai.com/v1",
        }),
        env: &[EnvHint::Credential {
            var: "OPENAI_API_KEY",
            hint: "Set OPENAI_API_KEY for OpenAI provider",
        }],
    },
    TypeRule {
        type_name: "anthropic",
        probe: None,
        env: &[EnvHint::Credential {
            var: "ANTHROPIC_API_KEY",
            hint: "Set ANTHROPIC_API_KEY for Anthropic provider",
        }],
    },
    TypeRule {
        type_name: "claude-cli",
        probe: None,
        env: &[EnvHint::Binary {
            bin: "claude",
            hint: "Install the Claude CLI and ensure it is on PATH",
        }],
    },
    TypeRule {
        type_name: "openai-cli",
        probe: None,
        env: &[EnvHint::Binary {
            bin: "codex",
            hint: "Install the OpenAI CLI and ensure it is on PATH",
        }],
    },
];

/// Translates a legacy alias to its canonical name; other names pass through.
pub fn canonical_type(type_name: &str) -> &str {
    LEGACY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == type_name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(type_name)
}

pub fn rule_for(type_name: &str) -> Option<&'static TypeRule> {
    let canonical = canonical_type(type_name);
    TYPE_RULES.iter().find(|rule| rule.type_name == canonical)
}

pub fn probe_rule_for(type_name: &str) -> Option<ProbeRule> {
    rule_for(type_name).and_then(|rule| rule.probe)
}

/// Checks whether a connectivity test may be issued for `provider`.
///
/// Only gates the probe itself; saving an incomplete provider is always allowed.
pub fn gate_probe(provider: &Provider) -> Result<(), AppError> {
    if let Some(ProbeRule::Bearer {
        credential_field, ..
    }) = probe_rule_for(&provider.provider_type)
    {
        if provider.config_str(credential_field).is_none() {
            return Err(AppError::Validation(format!(
                "{credential_field} is required before testing {}",
                provider.name
            )));
        }
    }
    Ok(())
}
