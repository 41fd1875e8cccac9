//! Server configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Server configuration, loadable from a TOML file with environment-variable
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory cloned repositories are stored under.
    pub storage_dir: PathBuf,
    /// Report internal error messages to HTTP clients. Keep off on
    /// publicly reachable servers.
    pub debug: bool,
    /// HTTP listen address.
    pub bind_addr: SocketAddr,
    /// TLS certificate file. TLS termination is delegated; setting this
    /// refuses startup.
    pub tls_cert: Option<PathBuf>,
    /// TLS key file.
    pub tls_key: Option<PathBuf>,
    /// Require HTTP basic auth, as `user:password`.
    pub basic_auth: Option<String>,
    /// HTTP response cache: `none`, `memory`, or `disk:<dir>`.
    pub cache: CacheOption,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format: `json` or `pretty`.
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("."),
            debug: false,
            bind_addr: "127.0.0.1:9090".parse().expect("static addr"),
            tls_cert: None,
            tls_key: None,
            basic_auth: None,
            cache: CacheOption::None,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merges `REPOSTORE_*` environment variables over the current values.
    pub fn merge_env(&mut self) -> anyhow::Result<()> {
        if let Ok(dir) = std::env::var("REPOSTORE_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("REPOSTORE_BIND_ADDR") {
            self.bind_addr = addr.parse()?;
        }
        if let Ok(debug) = std::env::var("REPOSTORE_DEBUG") {
            self.debug = debug == "1" || debug.eq_ignore_ascii_case("true");
        }
        if let Ok(auth) = std::env::var("REPOSTORE_BASIC_AUTH") {
            self.basic_auth = if auth.is_empty() { None } else { Some(auth) };
        }
        if let Ok(cache) = std::env::var("REPOSTORE_CACHE") {
            self.cache = cache.parse().map_err(anyhow::Error::msg)?;
        }
        if let Ok(level) = std::env::var("REPOSTORE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(format) = std::env::var("REPOSTORE_LOG_FORMAT") {
            self.log_format = format;
        }
        Ok(())
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(auth) = &self.basic_auth {
            match auth.split_once(':') {
                Some((user, password)) if !user.is_empty() && !password.is_empty() => {}
                _ => anyhow::bail!("basic_auth must be 'user:password' with both nonempty"),
            }
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            anyhow::bail!("tls_cert and tls_key must be set together");
        }
        Ok(())
    }
}

/// The recognized HTTP response cache options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CacheOption {
    /// No response cache.
    #[default]
    None,
    /// In-memory response cache.
    Memory,
    /// On-disk response cache rooted at the given directory.
    Disk(PathBuf),
}

impl CacheOption {
    /// Whether caching is turned off.
    pub fn is_disabled(&self) -> bool {
        matches!(self, CacheOption::None)
    }
}

impl fmt::Display for CacheOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheOption::None => f.write_str("none"),
            CacheOption::Memory => f.write_str("memory"),
            CacheOption::Disk(dir) => write!(f, "disk:{}", dir.display()),
        }
    }
}

impl std::str::FromStr for CacheOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(CacheOption::None),
            "memory" | "mem" => Ok(CacheOption::Memory),
            _ => match s.strip_prefix("disk:") {
                Some(dir) if !dir.is_empty() => Ok(CacheOption::Disk(PathBuf::from(dir))),
                _ => Err(format!(
                    "cache must be 'none', 'memory', or 'disk:<dir>', got {s:?}"
                )),
            },
        }
    }
}

impl TryFrom<String> for CacheOption {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CacheOption> for String {
    fn from(c: CacheOption) -> Self {
        c.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.storage_dir, PathBuf::from("."));
        assert!(!config.debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cache_option_parses() {
        assert_eq!("none".parse::<CacheOption>().unwrap(), CacheOption::None);
        assert_eq!("mem".parse::<CacheOption>().unwrap(), CacheOption::Memory);
        assert_eq!(
            "disk:/tmp/cache".parse::<CacheOption>().unwrap(),
            CacheOption::Disk(PathBuf::from("/tmp/cache"))
        );
        assert!("disk:".parse::<CacheOption>().is_err());
        assert!("tape".parse::<CacheOption>().is_err());
    }

    #[test]
    fn basic_auth_must_have_both_parts() {
        let mut config = ServerConfig {
            basic_auth: Some("user:".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.basic_auth = Some("user:pass".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_file_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "storage_dir = \"/var/repostore\"\ndebug = true\ncache = \"memory\"\n",
        )
        .unwrap();
        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/var/repostore"));
        assert!(config.debug);
        assert_eq!(config.cache, CacheOption::Memory);
    }
}
