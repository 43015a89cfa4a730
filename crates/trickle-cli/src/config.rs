//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use trickle_client::{
    CredentialError, FileTokenStore, ReconnectPolicy, StaticToken, SyncSettings, Token,
    TokenSource,
};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the focus server.
    pub server_url: String,

    /// Access token. Takes precedence over `token_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// File holding the access token.
    pub token_path: PathBuf,

    /// Seconds between status requests while connected.
    pub poll_interval_secs: u64,

    /// First reconnect delay in seconds; doubles on each failure.
    pub reconnect_initial_secs: u64,

    /// Upper bound on the reconnect delay in seconds.
    pub reconnect_max_secs: u64,

    /// Seconds a connection attempt may take before it counts as failed.
    pub handshake_timeout_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &self.server_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_path", &self.token_path)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("reconnect_initial_secs", &self.reconnect_initial_secs)
            .field("reconnect_max_secs", &self.reconnect_max_secs)
            .field("handshake_timeout_secs", &self.handshake_timeout_secs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            server_url: "http://localhost:3000".to_string(),
            token: None,
            token_path: data_dir.join("token"),
            poll_interval_secs: 5,
            reconnect_initial_secs: 1,
            reconnect_max_secs: 30,
            handshake_timeout_secs: 20,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TRICKLE_*)
        figment = figment.merge(Env::prefixed("TRICKLE_"));

        figment.extract()
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            reconnect: ReconnectPolicy::new(
                Duration::from_secs(self.reconnect_initial_secs),
                Duration::from_secs(self.reconnect_max_secs),
            ),
        }
    }

    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Where the client gets its token: the configured value if set,
    /// otherwise the token file.
    pub fn token_source(&self) -> Result<Arc<dyn TokenSource>, CredentialError> {
        match &self.token {
            Some(raw) => Ok(Arc::new(StaticToken::new(Token::new(raw)?))),
            None => Ok(Arc::new(FileTokenStore::new(&self.token_path))),
        }
    }
}

/// Returns the platform-specific config directory for trickle.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("trickle"))
}

/// Returns the platform-specific data directory for trickle.
///
/// On Linux: `~/.local/share/trickle`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("trickle"))
}
