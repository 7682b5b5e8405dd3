//! Registry configuration, loaded from a `[connections]`-style TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::encoding::Encoding;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConnectionsConfig {
    /// Size of the handle table, including the three standard connections.
    pub max_connections: usize,
    /// Bytes fetched from a backend per refill of a connection's read cache.
    pub read_cache_size: usize,
    /// Encoding that `"native.enc"` resolves to.
    pub default_encoding: String,
    pub socket_timeout_secs: u64,
    pub url_timeout_secs: u64,
    /// Shell used to run `pipe()` commands.
    pub shell: String,
    pub gzip_level: u32,
    pub bzip2_level: u32,
    pub xz_level: i32,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            max_connections: 128,
            read_cache_size: 16 * 1024,
            default_encoding: "UTF-8".to_string(),
            socket_timeout_secs: 60,
            url_timeout_secs: 60,
            shell: "/bin/sh".to_string(),
            gzip_level: 6,
            bzip2_level: 9,
            xz_level: 6,
        }
    }
}

impl ConnectionsConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections <= 3 {
            return Err(ConfigError::Invalid(
                "max_connections must leave room beyond the standard connections".into(),
            ));
        }
        if self.read_cache_size == 0 {
            return Err(ConfigError::Invalid("read_cache_size must be positive".into()));
        }
        if self.gzip_level > 9 || self.bzip2_level > 9 || !(-9..=9).contains(&self.xz_level) {
            return Err(ConfigError::Invalid("compression level out of range".into()));
        }
        Encoding::lookup(&self.default_encoding, Encoding::Utf8)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// The encoding `"native.enc"` stands for.
    pub fn native_encoding(&self) -> Encoding {
        Encoding::lookup(&self.default_encoding, Encoding::Utf8).unwrap_or_default()
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn url_timeout(&self) -> Duration {
        Duration::from_secs(self.url_timeout_secs)
    }

    /// A commented template listing every key with its default.
    pub fn default_template() -> String {
        let defaults = Self::default();
        format!(
            r#"# Connection subsystem settings

# Handle table size (slots 0-2 are stdin/stdout/stderr)
max_connections = {}

# Read cache per connection, in bytes
read_cache_size = {}

# Encoding used for "native.enc"
default_encoding = "{}"

socket_timeout_secs = {}
url_timeout_secs = {}

shell = "{}"

# Default compression levels
gzip_level = {}
bzip2_level = {}
xz_level = {}
"#,
            defaults.max_connections,
            defaults.read_cache_size,
            defaults.default_encoding,
            defaults.socket_timeout_secs,
            defaults.url_timeout_secs,
            defaults.shell,
            defaults.gzip_level,
            defaults.bzip2_level,
            defaults.xz_level,
        )
    }
}
