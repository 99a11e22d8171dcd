use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    StartupDependencyMissing { message: String },

    #[error("schema unavailable: {0}")]
    SchemaFetch(String),

    #[error("timeout")]
    ProbeTimeout,
    #[error("connection failed: {0}")]
    ProbeConnection(String),
    #[error("unexpected response: {0}")]
    ProbeProtocol(String),

    #[error("failed to parse catalog {path}: {source}")]
    CatalogParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config write failed: {0}")]
    ConfigWrite(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    IoContext {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON serialization failed: {source}")]
    JsonSerialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Message(String),
}

impl AppError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::StartupDependencyMissing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_message_includes_path() {
        let err = AppError::io(
            "/tmp/chi.tmp.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("/tmp/chi.tmp.json"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn only_startup_dependency_is_fatal() {
        assert!(AppError::StartupDependencyMissing {
            message: "missing".to_string()
        }
        .is_fatal());
        assert!(!AppError::ProbeTimeout.is_fatal());
        assert!(!AppError::Validation("x".to_string()).is_fatal());
    }

    #[test]
    fn probe_timeout_displays_bare_timeout() {
        assert_eq!(AppError::ProbeTimeout.to_string(), "timeout");
    }
}
