//! Configuration and session storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::messaging::ControllerSettings;
use crate::session::{Session, SessionStore};

const DEFAULT_API_BASE: &str = "http://localhost:5000";

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// REST API base URL (env: JOBBOARD_API_URL)
    pub api_base_url: Option<String>,
    /// WebSocket URL for live delivery (env: JOBBOARD_REALTIME_URL)
    pub realtime_url: Option<String>,
    /// How long a fetched conversation is served from the cache
    pub cache_freshness_secs: Option<u64>,
    /// Delay before a mark-read is sent to the server
    pub mark_read_delay_ms: Option<u64>,
    /// Delay between a send acknowledgement and the reconcile refetch
    pub refetch_delay_ms: Option<u64>,
    /// Active session (from last login)
    pub session: Option<Session>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "jobboard-chat", "jobboard-chat")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains the session token)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn api_base_url(&self) -> String {
        std::env::var("JOBBOARD_API_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Real-time URL, derived from the API base when not configured.
    pub fn realtime_url(&self) -> String {
        if let Some(url) = std::env::var("JOBBOARD_REALTIME_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.realtime_url.clone())
        {
            return url;
        }
        let base = self.api_base_url();
        let ws = base
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/ws", ws)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        let defaults = ControllerSettings::default();
        ControllerSettings {
            freshness: self
                .cache_freshness_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.freshness),
            mark_read_delay: self
                .mark_read_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.mark_read_delay),
            refetch_delay: self
                .refetch_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.refetch_delay),
        }
    }
}

impl SessionStore for Config {
    fn get_session(&self) -> Option<Session> {
        self.session.clone()
    }

    fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    fn clear_session(&mut self) {
        self.session = None;
    }
}
