use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use crate::config::write_json_atomic;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

impl ThemeMode {
    pub fn toggle(self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ThemeMode::Dark => "Dark",
            ThemeMode::Light => "Light",
        }
    }
}

/// Preferences that persist across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub theme: ThemeMode,
    pub animation: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            theme: ThemeMode::Dark,
            animation: true,
        }
    }
}

impl UiSettings {
    pub fn settings_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".chi-tui").join("settings.json"))
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<UiSettings>(&content) {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!(
                    "failed to parse settings, using defaults. path: {}, error: {}",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        write_json_atomic(path, self)
    }

    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn save(&self) -> Result<(), AppError> {
        let path = Self::settings_path()
            .ok_or_else(|| AppError::Message("home directory not found".to_string()))?;
        self.save_to(&path)
    }
}

fn settings_store() -> &'static RwLock<UiSettings> {
    static STORE: OnceLock<RwLock<UiSettings>> = OnceLock::new();
    STORE.get_or_init(|| RwLock::new(UiSettings::load()))
}

pub fn get_settings() -> UiSettings {
    settings_store()
        .read()
        .map(|s| s.clone())
        .unwrap_or_default()
}

pub fn update_settings(new_settings: UiSettings) -> Result<(), AppError> {
    new_settings.save()?;
    if let Ok(mut guard) = settings_store().write() {
        *guard = new_settings;
    }
    Ok(())
}
