use crate::core::embedder::EmbedderKind;
use crate::core::session::SessionSettings;
use crate::store::{DEFAULT_EXTENSIONS, LocalImageStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {message}")]
    Invalid { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub threshold: f32,
    pub top_n: usize,
    pub workers: usize,
    pub embedder: EmbedderKind,
    pub extensions: Vec<String>,
    pub history: bool,
}

impl Default for Config {
    fn default() -> Self {
        let settings = SessionSettings::default();
        Self {
            threshold: settings.threshold,
            top_n: settings.top_n,
            workers: settings.workers,
            embedder: EmbedderKind::Thumbnail,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            history: settings.history,
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub threshold: Option<f32>,
    pub top_n: Option<usize>,
    pub workers: Option<usize>,
    pub embedder: Option<EmbedderKind>,
    pub no_history: bool,
}

impl Config {
    /// `<config dir>/simcull/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("simcull").join("config.json"))
    }

    /// Load `explicit` if given (it must exist), otherwise the default file if
    /// there is one, otherwise the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(threshold) = overrides.threshold {
            self.threshold = threshold;
        }
        if let Some(top_n) = overrides.top_n {
            self.top_n = top_n;
        }
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if let Some(embedder) = overrides.embedder {
            self.embedder = embedder;
        }
        if overrides.no_history {
            self.history = false;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Invalid {
                message: format!("threshold must be between 0 and 1, got {}", self.threshold),
            });
        }
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                message: "at least one image extension is required".to_string(),
            });
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            threshold: self.threshold,
            top_n: self.top_n,
            workers: self.workers,
            history: self.history,
        }
    }

    pub fn image_store(&self) -> LocalImageStore {
        LocalImageStore::with_extensions(self.extensions.iter().filter(|e| !e.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.top_n, 3);
        assert_eq!(config.workers, 0);
        assert_eq!(config.embedder, EmbedderKind::Thumbnail);
        assert_eq!(config.extensions, vec!["png", "jpg", "jpeg"]);
        assert!(config.history);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "threshold": 0.8, "embedder": "hash" }"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.threshold, 0.8);
        assert_eq!(config.embedder, EmbedderKind::Hash);
        assert_eq!(config.top_n, 3);
        assert!(config.history);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load(Some(&temp_dir.path().join("nope.json")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ threshold: ").unwrap();

        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides_win() {
        let overrides = Overrides {
            threshold: Some(0.9),
            top_n: Some(5),
            workers: Some(2),
            embedder: Some(EmbedderKind::Hash),
            no_history: true,
        };

        let config = Config::default().with_overrides(&overrides);

        assert_eq!(config.threshold, 0.9);
        assert_eq!(config.top_n, 5);
        assert_eq!(config.workers, 2);
        assert_eq!(config.embedder, EmbedderKind::Hash);
        assert!(!config.history);

        let settings = config.session_settings();
        assert_eq!(settings.top_n, 5);
        assert!(!settings.history);
    }

    #[test]
    fn test_empty_overrides_change_nothing() {
        let config = Config::default().with_overrides(&Overrides::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        config.threshold = 0.5;
        config.extensions = vec![" ".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }
}
