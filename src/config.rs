use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::archive::ArchiveLimits;
use crate::export::CommandExportTool;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid export timeout '{value}': {source}")]
    InvalidTimeout {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
}

/// External export tool settings, the `[export]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_export_timeout")]
    pub timeout: String,
    #[serde(default = "default_export_extensions")]
    pub extensions: Vec<String>,
}

fn default_export_timeout() -> String {
    "30m".to_string()
}

fn default_export_extensions() -> Vec<String> {
    vec!["zap15".to_string(), "zap20".to_string()]
}

impl ExportConfig {
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.timeout).map_err(|source| ConfigError::InvalidTimeout {
            value: self.timeout.clone(),
            source,
        })
    }

    pub fn tool(&self) -> Result<CommandExportTool, ConfigError> {
        Ok(CommandExportTool::new(
            self.program.clone(),
            self.args.clone(),
            self.timeout()?,
        ))
    }

    /// Case-insensitive match on the file extension, without the dot.
    pub fn handles(&self, path: &Path) -> bool {
        crate::ingest::extension_allowed(path, &self.extensions)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_path: Option<PathBuf>,
    pub workers: Option<usize>,
    pub limits: ArchiveLimits,
    pub export: Option<ExportConfig>,
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub workers: Option<usize>,
}

/// `<config_dir>/tiatrack/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tiatrack").map(|d| d.config_dir().join("config.toml"))
}

impl Config {
    /// Loads from `explicit` if given (it must exist), else from the default
    /// location (missing means defaults).
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => {
                    debug!("no config file, using defaults");
                    Ok(Config::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(path) = &overrides.database_path {
            self.database_path = Some(path.clone());
        }
        if let Some(workers) = overrides.workers {
            self.workers = Some(workers);
        }
    }

    /// Extraction pool size: configured value, else available parallelism.
    pub fn workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Checks everything that can only be validated after parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(export) = &self.export {
            export.timeout()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.limits, ArchiveLimits::default());
        assert!(config.export.is_none());
    }

    #[test]
    fn full_file() {
        let config = Config::parse(
            r#"
            database_path = "/var/lib/tiatrack/db.sqlite"
            workers = 3

            [limits]
            max_entries = 500

            [export]
            program = "/opt/openness/export"
            args = ["--quiet"]
            timeout = "90s"
            "#,
        )
        .unwrap();

        assert_eq!(config.workers(), 3);
        assert_eq!(config.limits.max_entries, 500);
        // unspecified limits keep their defaults
        assert_eq!(
            config.limits.max_total_bytes,
            ArchiveLimits::default().max_total_bytes
        );

        let export = config.export.unwrap();
        assert_eq!(export.timeout().unwrap(), Duration::from_secs(90));
        assert_eq!(export.extensions, vec!["zap15", "zap20"]);
        assert_eq!(export.tool().unwrap().args, vec!["--quiet"]);
    }

    #[test]
    fn export_defaults() {
        let config = Config::parse("[export]\nprogram = \"exporter\"\n").unwrap();
        let export = config.export.unwrap();
        assert_eq!(export.timeout().unwrap(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("worker = 2").is_err());
    }

    #[test]
    fn bad_timeout_fails_validation() {
        let config = Config::parse("[export]\nprogram = \"x\"\ntimeout = \"soon\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn extension_match_ignores_case() {
        let config = Config::parse("[export]\nprogram = \"x\"\n").unwrap();
        let export = config.export.unwrap();
        assert!(export.handles(Path::new("Line1.ZAP20")));
        assert!(export.handles(Path::new("dir/plant.zap15")));
        assert!(!export.handles(Path::new("plant.zip")));
        assert!(!export.handles(Path::new("zap20")));
    }

    #[test]
    fn overrides_win() {
        let mut config = Config::parse("workers = 8\ndatabase_path = \"a.db\"").unwrap();
        config.apply(&Overrides {
            database_path: Some(PathBuf::from("b.db")),
            workers: None,
        });
        assert_eq!(config.database_path, Some(PathBuf::from("b.db")));
        assert_eq!(config.workers(), 8);
    }

    #[test]
    fn zero_workers_means_one() {
        let config = Config {
            workers: Some(0),
            ..Config::default()
        };
        assert_eq!(config.workers(), 1);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "workers = 2\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().workers, Some(2));
    }
}
