// Core modules
mod config;
mod error;

pub mod activation;
pub mod catalog;
pub mod diagnostics;
pub mod form;
pub mod probe;
pub mod rules;
pub mod schema;
pub mod settings;

// CLI module
pub mod cli;

// Public exports
pub use activation::{ActivationConfig, Target, PROJECT_CONFIG_FILE};
pub use catalog::{Catalog, Provider, DEFAULT_CATALOG_FILE};
pub use config::read_json_file;
pub use diagnostics::Diagnostics;
pub use error::AppError;
pub use probe::ProbeResult;
pub use schema::{ModelListing, SchemaAuthority, SchemaSet};
pub use settings::{get_settings, update_settings, ThemeMode, UiSettings};
