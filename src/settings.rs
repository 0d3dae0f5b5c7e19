//! File-backed update settings.
//!
//! [`UpdateSettings`] is the serialisable subset of [`Config`]: everything
//! except callbacks. Hosts load it from TOML and turn it into a runtime
//! configuration fetching over HTTP.

use crate::error::{Result, UpdateError};
use crate::source::HttpSource;
use crate::updater::{Config, ScratchPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Update settings as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// Payload location; may contain `{{.OS}}`-style placeholders.
    pub url: String,
    /// The payload is an archive rather than a raw executable.
    pub zip: bool,
    /// Run one cycle in the background at startup.
    pub fetch_on_start: bool,
    /// Install location (None = the running executable).
    pub target: Option<PathBuf>,
    /// Keep the archive scratch directory after a successful install.
    pub keep_scratch: bool,
    /// Connect timeout for the payload download, in seconds.
    pub connect_timeout_secs: u64,
    /// Read timeout for the payload download, in seconds.
    pub read_timeout_secs: u64,
    /// `User-Agent` header override.
    pub user_agent: Option<String>,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            zip: false,
            fetch_on_start: false,
            target: None,
            keep_scratch: false,
            connect_timeout_secs: 15,
            read_timeout_secs: 300,
            user_agent: None,
        }
    }
}

impl UpdateSettings {
    /// Load settings from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| UpdateError::Config(e.to_string()))
    }

    /// Save settings to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the settings cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default settings path: `~/.config/selfupdate/update.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("selfupdate").join("update.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("selfupdate")
                .join("update.toml")
        } else {
            PathBuf::from("/tmp/selfupdate-config/update.toml")
        }
    }

    /// Build a runtime configuration fetching from [`url`](Self::url) over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`] if no URL is set.
    pub fn into_config(self) -> Result<Config> {
        if self.url.trim().is_empty() {
            return Err(UpdateError::Config("update url is not set".to_owned()));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(self.connect_timeout_secs))
            .timeout_read(Duration::from_secs(self.read_timeout_secs))
            .build();
        let mut source = HttpSource::with_agent(agent, &self.url);
        if let Some(user_agent) = self.user_agent {
            source = source.with_user_agent(user_agent);
        }

        let scratch = if self.keep_scratch {
            ScratchPolicy::Keep
        } else {
            ScratchPolicy::RemoveOnSuccess
        };

        let mut config = Config::new(source)
            .with_zip(self.zip)
            .with_fetch_on_start(self.fetch_on_start)
            .with_scratch(scratch);
        config.target = self.target;
        Ok(config)
    }
}
