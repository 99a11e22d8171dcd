//! Connectivity Probe Service.
//!
//! A probe is planned synchronously (rule lookup, credential gate, URL
//! assembly) and executed asynchronously with a single bounded attempt.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::catalog::Provider;
use crate::error::AppError;
use crate::rules::{self, ProbeRule};
use crate::schema::ProviderTypeSchema;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub ok: bool,
    pub status: Option<u16>,
    pub latency: Option<Duration>,
    pub message: String,
}

impl ProbeResult {
    fn failure(status: Option<u16>, latency: Option<Duration>, err: AppError) -> Self {
        Self {
            ok: false,
            status,
            latency,
            message: err.to_string(),
        }
    }

    /// One-line summary for toasts and the CLI.
    pub fn summary(&self) -> String {
        match self.latency {
            Some(latency) => format!("{} ({} ms)", self.message, latency.as_millis()),
            None => self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpProbe {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub list_key: String,
    pub label: String,
    pub noun: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbePlan {
    /// Nothing to contact; the result is known up front.
    Immediate(ProbeResult),
    Http(HttpProbe),
}

fn field_value(
    provider: &Provider,
    schema: Option<&ProviderTypeSchema>,
    field: &str,
) -> Option<String> {
    provider.config_display(field).or_else(|| {
        schema
            .and_then(|s| s.field(field))
            .and_then(|f| f.default.as_ref())
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.trim().is_empty())
    })
}

fn validate_url(raw: &str) -> Result<String, AppError> {
    url::Url::parse(raw)
        .map(|u| u.to_string())
        .map_err(|e| AppError::Validation(format!("invalid probe URL '{raw}': {e}")))
}

/// Applies `port` to a host given as a full URL, unless the URL names its own.
fn with_port(host: &str, port: &str) -> Result<String, AppError> {
    let mut url = url::Url::parse(host)
        .map_err(|e| AppError::Validation(format!("invalid host URL '{host}': {e}")))?;
    if url.port().is_none() {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| AppError::Validation(format!("invalid port '{port}'")))?;
        url.set_port(Some(port))
            .map_err(|_| AppError::Validation(format!("host '{host}' cannot take a port")))?;
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Decides what a probe of `provider` would do. A gated action comes back as
/// `AppError::Validation` without touching the network.
pub fn plan(
    provider: &Provider,
    schema: Option<&ProviderTypeSchema>,
) -> Result<ProbePlan, AppError> {
    let Some(rule) = rules::probe_rule_for(&provider.provider_type) else {
        return Ok(ProbePlan::Immediate(ProbeResult {
            ok: true,
            status: None,
            latency: None,
            message: format!(
                "{}: no connectivity test needed",
                rules::canonical_type(&provider.provider_type)
            ),
        }));
    };
    rules::gate_probe(provider)?;
    let label = rules::canonical_type(&provider.provider_type).to_string();

    let http = match rule {
        ProbeRule::Listing {
            path,
            list_key,
            noun,
            default_host,
            default_port,
        } => {
            let host = field_value(provider, schema, "host")
                .unwrap_or_else(|| default_host.to_string());
            let port = field_value(provider, schema, "port")
                .unwrap_or_else(|| default_port.to_string());
            let base = if host.starts_with("http://") || host.starts_with("https://") {
                with_port(&host, &port)?
            } else {
                format!("http://{host}:{port}")
            };
            HttpProbe {
                url: validate_url(&format!("{base}{path}"))?,
                headers: Vec::new(),
                list_key: list_key.to_string(),
                label,
                noun: noun.to_string(),
            }
        }
        ProbeRule::Bearer {
            path,
            list_key,
            noun,
            credential_field,
            base_url_field,
            org_field,
            default_base_url,
        } => {
            let base = field_value(provider, schema, base_url_field)
                .unwrap_or_else(|| default_base_url.to_string());
            let mut headers = Vec::new();
            if let Some(key) = provider.config_str(credential_field) {
                headers.push(("Authorization".to_string(), format!("Bearer {key}")));
            }
            if let Some(org) = provider.config_str(org_field) {
                headers.push(("OpenAI-Organization".to_string(), org.to_string()));
            }
            HttpProbe {
                url: validate_url(&format!("{}{path}", base.trim_end_matches('/')))?,
                headers,
                list_key: list_key.to_string(),
                label,
                noun: noun.to_string(),
            }
        }
    };
    Ok(ProbePlan::Http(http))
}

pub fn build_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .build()
        .map_err(|e| AppError::Message(format!("failed to build HTTP client: {e}")))
}

/// Runs one attempt of `probe`, bounded by `timeout`.
pub async fn execute(client: &reqwest::Client, probe: &HttpProbe, timeout: Duration) -> ProbeResult {
    let mut request = client.get(&probe.url);
    for (name, value) in &probe.headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let started = Instant::now();
    let exchange = async {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, body))
    };

    let (status, body) = match tokio::time::timeout(timeout, exchange).await {
        Err(_) => return ProbeResult::failure(None, None, AppError::ProbeTimeout),
        Ok(Err(e)) if e.is_timeout() => {
            return ProbeResult::failure(None, None, AppError::ProbeTimeout)
        }
        Ok(Err(e)) => {
            return ProbeResult::failure(None, None, AppError::ProbeConnection(e.to_string()))
        }
        Ok(Ok(pair)) => pair,
    };
    let latency = Some(started.elapsed());
    let code = status.as_u16();
    log::debug!("probe {} -> HTTP {code}", probe.label);

    if code == 401 || code == 403 {
        return ProbeResult {
            ok: false,
            status: Some(code),
            latency,
            message: format!("authentication failed (HTTP {code})"),
        };
    }
    if !status.is_success() {
        return ProbeResult {
            ok: false,
            status: Some(code),
            latency,
            message: format!("HTTP {code}"),
        };
    }

    let count = serde_json::from_slice::<Value>(&body)
        .map_err(|e| AppError::ProbeProtocol(e.to_string()))
        .and_then(|v| {
            v.get(&probe.list_key)
                .and_then(Value::as_array)
                .map(Vec::len)
                .ok_or_else(|| AppError::ProbeProtocol(format!("missing '{}' list", probe.list_key)))
        });
    match count {
        Ok(n) => ProbeResult {
            ok: true,
            status: Some(code),
            latency,
            message: format!("{}: {n} {}", probe.label, probe.noun),
        },
        Err(e) => ProbeResult::failure(Some(code), latency, e),
    }
}

/// Plans and, when needed, runs a probe on the current runtime.
pub async fn probe(
    provider: &Provider,
    schema: Option<&ProviderTypeSchema>,
    timeout: Duration,
) -> Result<ProbeResult, AppError> {
    match plan(provider, schema)? {
        ProbePlan::Immediate(result) => Ok(result),
        ProbePlan::Http(http) => {
            let client = build_client(timeout)?;
            Ok(execute(&client, &http, timeout).await)
        }
    }
}
