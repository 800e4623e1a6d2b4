//! Configuration file support
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! command-line flags.
//!
//! ```toml
//! [server]
//! port = 3000
//! bind = "0.0.0.0"
//! root = "/srv/www"
//! upload_limit_mb = 20
//!
//! [conversion]
//! ffmpeg = "/usr/bin/ffmpeg"
//! max_concurrent = 4
//! timeout_secs = 120
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::web::ServerConfig;

/// Name of the config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "clipserve.toml";

const MIB: usize = 1024 * 1024;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// `[server]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub root: Option<PathBuf>,
    pub index_file: Option<String>,
    pub upload_limit_mb: Option<usize>,
    pub shutdown_timeout_secs: Option<u64>,
}

/// `[conversion]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionSection {
    pub ffmpeg: Option<PathBuf>,
    /// 0 = unbounded
    pub max_concurrent: Option<usize>,
    /// 0 = no timeout
    pub timeout_secs: Option<u64>,
}

/// Parsed configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerSection,
    pub conversion: ConversionSection,
}

/// Values given on the command line; `None` leaves the file/default value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub root: Option<PathBuf>,
    pub upload_limit_mb: Option<usize>,
    pub ffmpeg: Option<PathBuf>,
    pub max_concurrent: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Candidate config files in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("clipserve").join("config.toml"));
        }
        paths
    }

    /// Load the first config file found, or defaults if there is none
    pub fn load() -> Result<Self, ConfigError> {
        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load a specific config file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply file values and then CLI values over the defaults
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> ServerConfig {
        let defaults = ServerConfig::default();
        let server = &self.server;
        let conversion = &self.conversion;

        let upload_limit = cli
            .upload_limit_mb
            .or(server.upload_limit_mb)
            .map(|mb| mb.saturating_mul(MIB))
            .unwrap_or(defaults.upload_limit);

        let timeout = cli
            .timeout_secs
            .or(conversion.timeout_secs)
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        ServerConfig {
            port: cli.port.or(server.port).unwrap_or(defaults.port),
            bind: cli
                .bind
                .clone()
                .or_else(|| server.bind.clone())
                .unwrap_or(defaults.bind),
            root: cli
                .root
                .clone()
                .or_else(|| server.root.clone())
                .unwrap_or(defaults.root),
            index_file: server.index_file.clone().unwrap_or(defaults.index_file),
            upload_limit,
            ffmpeg: cli
                .ffmpeg
                .clone()
                .or_else(|| conversion.ffmpeg.clone())
                .unwrap_or(defaults.ffmpeg),
            max_concurrent_conversions: cli
                .max_concurrent
                .or(conversion.max_concurrent)
                .unwrap_or(defaults.max_concurrent_conversions),
            conversion_timeout: timeout,
            shutdown_timeout_secs: server
                .shutdown_timeout_secs
                .unwrap_or(defaults.shutdown_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("", Path::new("empty.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.merge_with_cli(&CliOverrides::default()), ServerConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let text = r#"
            [server]
            port = 8080
            bind = "0.0.0.0"
            root = "/srv/www"
            index_file = "home.html"
            upload_limit_mb = 5
            shutdown_timeout_secs = 10

            [conversion]
            ffmpeg = "/opt/bin/ffmpeg"
            max_concurrent = 2
            timeout_secs = 90
        "#;
        let merged = Config::parse(text, Path::new("c.toml"))
            .unwrap()
            .merge_with_cli(&CliOverrides::default());

        assert_eq!(merged.port, 8080);
        assert_eq!(merged.bind, "0.0.0.0");
        assert_eq!(merged.root, PathBuf::from("/srv/www"));
        assert_eq!(merged.index_file, "home.html");
        assert_eq!(merged.upload_limit, 5 * MIB);
        assert_eq!(merged.shutdown_timeout_secs, 10);
        assert_eq!(merged.ffmpeg, PathBuf::from("/opt/bin/ffmpeg"));
        assert_eq!(merged.max_concurrent_conversions, 2);
        assert_eq!(merged.conversion_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_cli_overrides_file() {
        let text = "[server]\nport = 8080\n[conversion]\ntimeout_secs = 90\n";
        let config = Config::parse(text, Path::new("c.toml")).unwrap();
        let cli = CliOverrides {
            port: Some(9000),
            timeout_secs: Some(0),
            max_concurrent: Some(0),
            ..Default::default()
        };

        let merged = config.merge_with_cli(&cli);
        assert_eq!(merged.port, 9000);
        assert_eq!(merged.conversion_timeout, None);
        assert_eq!(merged.max_concurrent_conversions, 0);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = Config::parse("[server]\nprot = 1\n", Path::new("typo.toml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let result = Config::parse("[server]\nport = \"eighty\"\n", Path::new("bad.toml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipserve.toml");
        std::fs::write(&path, "[server]\nport = 4000\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server.port, Some(4000));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load_from_path(Path::new("/nonexistent/clipserve.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_search_paths_start_with_local_file() {
        let paths = Config::search_paths();
        assert_eq!(paths[0], PathBuf::from(LOCAL_CONFIG_FILE));
    }
}
