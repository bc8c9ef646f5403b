//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How to reach the repository.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Direct access to a filesystem blob store.
    Filesystem {
        /// Root directory of the blob store.
        path: PathBuf,
    },
    /// Proxied access through a repository server.
    Server {
        /// Server base URL (e.g., "https://backup.example.com").
        url: String,
        /// Bearer token for the server.
        /// WARNING: Prefer the PACKRAT_REPOSITORY__CONNECTION__TOKEN env var over config files.
        token: Option<String>,
    },
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/repository"),
        }
    }
}

impl ConnectionConfig {
    /// Validate connection configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ConnectionConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem connection requires a non-empty 'path'".to_string())
            }
            ConnectionConfig::Server { url, .. }
                if !(url.starts_with("http://") || url.starts_with("https://")) =>
            {
                Err(format!("server url must be http(s), got: {url}"))
            }
            _ => Ok(()),
        }
    }
}

/// Repository connection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Connection to the blob store or server.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Open the repository read-only (no write sessions, no maintenance).
    #[serde(default)]
    pub read_only: bool,
    /// Host name reported as part of the client identity.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// User name reported as part of the client identity.
    #[serde(default = "default_username")]
    pub username: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            read_only: false,
            hostname: default_hostname(),
            username: default_username(),
        }
    }
}

impl RepositoryConfig {
    /// Client identity in `user@host` form, as used for maintenance ownership.
    pub fn client_identity(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "packrat".to_string())
}

/// Automatic maintenance configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Run maintenance opportunistically after write actions (default: true).
    #[serde(default = "default_auto_enabled")]
    pub auto_enabled: bool,
}

fn default_auto_enabled() -> bool {
    true
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            auto_enabled: default_auto_enabled(),
        }
    }
}

/// Observability configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Expose Prometheus metrics on this host:port while an action runs.
    /// SECURITY: The endpoint is unauthenticated; bind to loopback or a restricted network.
    pub metrics_listen_addr: Option<String>,
    /// Log resident memory before and after each action.
    #[serde(default)]
    pub memory_tracking: bool,
}

/// Repository credentials configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Repository password.
    /// WARNING: Prefer the PACKRAT_CREDENTIALS__PASSWORD env var or a password file.
    pub password: Option<String>,
    /// File containing the repository password.
    pub password_file: Option<PathBuf>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_file", &self.password_file)
            .finish()
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Repository connection.
    #[serde(default)]
    pub repository: RepositoryConfig,
    /// Automatic maintenance.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Metrics and memory tracking.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Credentials.
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl AppConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.repository.connection.validate()?;
        if self.repository.hostname.contains('@') || self.repository.username.contains('@') {
            return Err("hostname and username may not contain '@'".to_string());
        }
        if let Some(addr) = &self.observability.metrics_listen_addr
            && addr.parse::<std::net::SocketAddr>().is_err()
        {
            return Err(format!("invalid metrics_listen_addr: {addr}"));
        }
        if self.credentials.password.is_some() && self.credentials.password_file.is_some() {
            return Err("set either credentials.password or credentials.password_file, not both".to_string());
        }
        Ok(())
    }

    /// Create a test configuration for a filesystem repository.
    ///
    /// **For testing only.** Uses a fixed identity and password.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            repository: RepositoryConfig {
                connection: ConnectionConfig::Filesystem { path: path.into() },
                read_only: false,
                hostname: "testhost".to_string(),
                username: "tester".to_string(),
            },
            maintenance: MaintenanceConfig::default(),
            observability: ObservabilityConfig::default(),
            credentials: CredentialsConfig {
                password: Some("test-password".to_string()),
                password_file: None,
            },
        }
    }
}
