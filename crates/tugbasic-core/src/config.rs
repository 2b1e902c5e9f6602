//! Configuration precedence.
//!
//! Values come from four layers, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. Project config file (`tugbasic.json` next to the manifest)
//! 3. Environment variables (`TUGBASIC_BACKUP_DIR`)
//! 4. CLI flags
//!
//! List-valued settings (reserved words, keep names, exclude globs) accumulate
//! across layers; scalar settings take the highest-precedence value.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the optional project config file.
pub const PROJECT_CONFIG_FILE: &str = "tugbasic.json";

/// Environment variable overriding the backup root.
pub const ENV_BACKUP_DIR: &str = "TUGBASIC_BACKUP_DIR";

/// Default backup directory name below the project root.
pub const DEFAULT_BACKUP_DIR: &str = ".tugbasic-backup";

// ============================================================================
// Error Types
// ============================================================================

/// Errors reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but cannot be read.
    #[error("cannot read {path}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config file is not valid JSON for this schema.
    #[error("invalid config {path}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Configuration Sources
// ============================================================================

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Built-in default value.
    Default = 0,
    /// From `tugbasic.json`.
    ProjectConfig = 1,
    /// From environment variable.
    EnvVar = 2,
    /// From CLI flag (highest precedence).
    CliFlag = 3,
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigValue<T> {
    /// The actual value.
    pub value: T,
    /// Where the value came from.
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    /// Create a new config value with the given source.
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Merge with another value, preferring higher precedence.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

// ============================================================================
// Project Config File
// ============================================================================

/// Contents of `tugbasic.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfigFile {
    /// Extra reserved identifiers.
    pub reserved_words: Vec<String>,
    /// Names that must never be renamed.
    pub keep_names: Vec<String>,
    /// Glob patterns excluded from directory scans.
    pub exclude: Vec<String>,
    /// Backup root, relative to the project root if not absolute.
    pub backup_dir: Option<PathBuf>,
}

impl ProjectConfigFile {
    /// Load the config file from a project root, if present.
    pub fn load(project_root: &Path) -> Result<Option<Self>, ConfigError> {
        let path = project_root.join(PROJECT_CONFIG_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let parsed =
            serde_json::from_str(&text).map_err(|source| ConfigError::Invalid { path, source })?;
        Ok(Some(parsed))
    }
}

// ============================================================================
// Configuration Resolution
// ============================================================================

/// CLI configuration overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// --reserved flags.
    pub reserved_words: Vec<String>,
    /// --keep flags.
    pub keep_names: Vec<String>,
    /// --exclude flags.
    pub exclude_patterns: Vec<String>,
    /// --backup-dir flag.
    pub backup_dir: Option<PathBuf>,
}

/// Resolved configuration with precedence information.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Extra reserved identifiers.
    pub reserved_words: Vec<ConfigValue<String>>,
    /// Names never renamed.
    pub keep_names: Vec<ConfigValue<String>>,
    /// Exclude patterns for directory scans.
    pub exclude_patterns: Vec<ConfigValue<String>>,
    /// Backup root directory.
    pub backup_dir: ConfigValue<PathBuf>,
}

impl ResolvedConfig {
    /// Resolve configuration from all sources, reading the real environment.
    pub fn resolve(project_root: &Path, cli: &CliOverrides) -> Result<Self, ConfigError> {
        ResolvedConfig::resolve_with_env(project_root, cli, |key| std::env::var(key).ok())
    }

    /// Resolve configuration with an injected environment lookup.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Project config (`tugbasic.json`)
    /// 4. Defaults
    pub fn resolve_with_env(
        project_root: &Path,
        cli: &CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = ResolvedConfig {
            reserved_words: Vec::new(),
            keep_names: Vec::new(),
            exclude_patterns: Vec::new(),
            backup_dir: ConfigValue::new(
                project_root.join(DEFAULT_BACKUP_DIR),
                ConfigSource::Default,
            ),
        };

        if let Some(file) = ProjectConfigFile::load(project_root)? {
            debug!(root = %project_root.display(), "applying project config");
            config.apply_project_config(project_root, file);
        }

        if let Some(dir) = env(ENV_BACKUP_DIR).filter(|v| !v.is_empty()) {
            config.set_backup_dir(PathBuf::from(dir), ConfigSource::EnvVar);
        }

        config.apply_cli_overrides(cli);
        Ok(config)
    }

    fn apply_project_config(&mut self, project_root: &Path, file: ProjectConfigFile) {
        let source = ConfigSource::ProjectConfig;
        self.reserved_words.extend(
            file.reserved_words
                .into_iter()
                .map(|w| ConfigValue::new(w, source)),
        );
        self.keep_names
            .extend(file.keep_names.into_iter().map(|n| ConfigValue::new(n, source)));
        self.exclude_patterns
            .extend(file.exclude.into_iter().map(|p| ConfigValue::new(p, source)));
        if let Some(dir) = file.backup_dir {
            let dir = if dir.is_absolute() {
                dir
            } else {
                project_root.join(dir)
            };
            self.set_backup_dir(dir, source);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        let source = ConfigSource::CliFlag;
        self.reserved_words.extend(
            cli.reserved_words
                .iter()
                .map(|w| ConfigValue::new(w.clone(), source)),
        );
        self.keep_names.extend(
            cli.keep_names
                .iter()
                .map(|n| ConfigValue::new(n.clone(), source)),
        );
        self.exclude_patterns.extend(
            cli.exclude_patterns
                .iter()
                .map(|p| ConfigValue::new(p.clone(), source)),
        );
        if let Some(ref dir) = cli.backup_dir {
            self.set_backup_dir(dir.clone(), source);
        }
    }

    fn set_backup_dir(&mut self, dir: PathBuf, source: ConfigSource) {
        let current = self.backup_dir.clone();
        self.backup_dir = current.merge(ConfigValue::new(dir, source));
    }

    /// Reserved words as plain strings.
    pub fn reserved_words(&self) -> Vec<String> {
        self.reserved_words.iter().map(|v| v.value.clone()).collect()
    }

    /// Keep-list names as plain strings.
    pub fn keep_names(&self) -> Vec<String> {
        self.keep_names.iter().map(|v| v.value.clone()).collect()
    }

    /// Exclude patterns as plain strings.
    pub fn exclude_patterns(&self) -> Vec<String> {
        self.exclude_patterns
            .iter()
            .map(|v| v.value.clone())
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn merge_prefers_higher_precedence() {
        let default = ConfigValue::new("a", ConfigSource::Default);
        let cli = ConfigValue::new("b", ConfigSource::CliFlag);
        assert_eq!(default.clone().merge(cli.clone()).value, "b");
        assert_eq!(cli.merge(default).value, "b");
    }

    #[test]
    fn defaults_without_config_file() {
        let temp = TempDir::new().unwrap();
        let config =
            ResolvedConfig::resolve_with_env(temp.path(), &CliOverrides::default(), no_env)
                .unwrap();
        assert_eq!(config.backup_dir.source, ConfigSource::Default);
        assert_eq!(
            config.backup_dir.value,
            temp.path().join(DEFAULT_BACKUP_DIR)
        );
        assert!(config.reserved_words.is_empty());
    }

    #[test]
    fn project_file_then_env_then_cli() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(PROJECT_CONFIG_FILE),
            r#"{ "keep_names": ["hWnd"], "backup_dir": "bk" }"#,
        )
        .unwrap();

        let config =
            ResolvedConfig::resolve_with_env(temp.path(), &CliOverrides::default(), no_env)
                .unwrap();
        assert_eq!(config.backup_dir.value, temp.path().join("bk"));
        assert_eq!(config.backup_dir.source, ConfigSource::ProjectConfig);
        assert_eq!(config.keep_names(), vec!["hWnd".to_string()]);

        let env = |key: &str| (key == ENV_BACKUP_DIR).then(|| "/env/bk".to_string());
        let config =
            ResolvedConfig::resolve_with_env(temp.path(), &CliOverrides::default(), env).unwrap();
        assert_eq!(config.backup_dir.value, PathBuf::from("/env/bk"));
        assert_eq!(config.backup_dir.source, ConfigSource::EnvVar);

        let cli = CliOverrides {
            backup_dir: Some(PathBuf::from("/cli/bk")),
            keep_names: vec!["lParam".to_string()],
            ..Default::default()
        };
        let config = ResolvedConfig::resolve_with_env(temp.path(), &cli, env).unwrap();
        assert_eq!(config.backup_dir.value, PathBuf::from("/cli/bk"));
        assert_eq!(config.backup_dir.source, ConfigSource::CliFlag);
        assert_eq!(
            config.keep_names(),
            vec!["hWnd".to_string(), "lParam".to_string()]
        );
    }

    #[test]
    fn invalid_config_is_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(PROJECT_CONFIG_FILE), "{ not json").unwrap();
        let result =
            ResolvedConfig::resolve_with_env(temp.path(), &CliOverrides::default(), no_env);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
