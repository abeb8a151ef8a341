//! Registry configuration.
//!
//! # Invariants
//! - Every field has a default, so partial JSON config files are accepted.
//! - Relative paths in a config file resolve against the file's directory.

use crate::extension::environment::BOOTSTRAP_ENTRY;
use crate::extension::manifest::MANIFEST_FILENAME;
use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Default location of the durable state database under the base path.
pub const DEFAULT_STORE_FILE: &str = "storage/extensions.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Application root; a manifest directly inside it is named `app`.
    pub app_path: PathBuf,
    /// Project root holding `vendor/` and `workbench/`.
    pub base_path: PathBuf,
    /// Additional search-path patterns, appended after the defaults.
    pub extra_paths: Vec<String>,
    pub manifest_filename: String,
    pub bootstrap_entry: String,
    /// Durable state database; `None` keeps state in memory only.
    pub store_path: Option<PathBuf>,
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` disables file logs.
    pub log_dir: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::for_base(".")
    }
}

impl RegistryConfig {
    /// Default layout for a project rooted at `base`.
    pub fn for_base(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            app_path: base.join("app"),
            base_path: base.to_path_buf(),
            extra_paths: vec![],
            manifest_filename: MANIFEST_FILENAME.to_string(),
            bootstrap_entry: BOOTSTRAP_ENTRY.to_string(),
            store_path: Some(base.join(DEFAULT_STORE_FILE)),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }

    /// Loads a JSON config file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let mut config: Self =
            serde_json::from_slice(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;

        if let Some(dir) = path.parent() {
            config.resolve_relative_to(dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would otherwise fail later at detection or logging
    /// initialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manifest_filename.trim().is_empty() || self.manifest_filename.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "manifest_filename must be a plain file name, got `{}`",
                self.manifest_filename
            )));
        }
        if self.bootstrap_entry.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "bootstrap_entry must not be empty".to_string(),
            ));
        }
        if let Some(log_dir) = &self.log_dir {
            if !log_dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    log_dir.display()
                )));
            }
        }
        Ok(())
    }

    fn resolve_relative_to(&mut self, dir: &Path) {
        for path in [&mut self.app_path, &mut self.base_path] {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
        if let Some(store_path) = self.store_path.as_mut() {
            if store_path.is_relative() {
                *store_path = dir.join(&*store_path);
            }
        }
        for pattern in &mut self.extra_paths {
            if Path::new(pattern.as_str()).is_relative() {
                *pattern = dir.join(pattern.as_str()).to_string_lossy().into_owned();
            }
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Read { path: PathBuf, message: String },
    Parse(String),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, message } => {
                write!(f, "cannot read config `{}`: {message}", path.display())
            }
            Self::Parse(reason) => write!(f, "config is not valid JSON: {reason}"),
            Self::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, RegistryConfig};
    use std::path::PathBuf;

    #[test]
    fn for_base_uses_conventional_layout() {
        let config = RegistryConfig::for_base("/srv/site");
        assert_eq!(config.app_path, PathBuf::from("/srv/site/app"));
        assert_eq!(config.manifest_filename, "orchestra.json");
        assert_eq!(
            config.store_path,
            Some(PathBuf::from("/srv/site/storage/extensions.sqlite3"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_partial_file_and_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extensions.json");
        std::fs::write(
            &path,
            r#"{"app_path": "site/app", "base_path": "site", "extra_paths": ["/opt/ext/*/*/", "local/*/*/"]}"#,
        )
        .unwrap();

        let config = RegistryConfig::from_json_file(&path).unwrap();
        assert_eq!(config.app_path, dir.path().join("site/app"));
        assert_eq!(config.base_path, dir.path().join("site"));
        assert_eq!(
            config.extra_paths,
            vec![
                "/opt/ext/*/*/".to_string(),
                format!("{}/local/*/*/", dir.path().display()),
            ]
        );
        assert_eq!(config.bootstrap_entry, "orchestra.sh");
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = RegistryConfig::for_base("/srv");
        config.manifest_filename = "nested/orchestra.json".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RegistryConfig::for_base("/srv");
        config.log_dir = Some(PathBuf::from("logs"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn reports_unreadable_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RegistryConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            RegistryConfig::from_json_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
