// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::allocator::PortBindPolicy;
use crate::transport::DEFAULT_API_URL;

pub const ACCOUNT_ID_ENV: &str = "MULLVAD_ACCOUNT_ID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub request_timeout_secs: u64,
    pub account_wait_secs: u64,
    pub port_bind_max_attempts: u32,
    pub port_bind_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            account_id: None,
            request_timeout_secs: 30,
            account_wait_secs: 30,
            port_bind_max_attempts: 32,
            port_bind_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("account ID must be a 16 digit account number")]
    InvalidAccountId,
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn account_wait(&self) -> Duration {
        Duration::from_secs(self.account_wait_secs)
    }

    pub fn bind_policy(&self) -> PortBindPolicy {
        PortBindPolicy {
            max_attempts: self.port_bind_max_attempts,
            timeout: Duration::from_secs(self.port_bind_timeout_secs),
            cancel: None,
        }
    }

    /// Apply an account ID from the environment, if one is set.
    pub fn with_account_override(mut self, account_id: Option<String>) -> Self {
        if let Some(id) = account_id.filter(|id| !id.is_empty()) {
            debug!("account ID taken from environment");
            self.account_id = Some(id);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.account_id {
            Some(id) if !is_account_id(id) => Err(ConfigError::InvalidAccountId),
            _ => Ok(()),
        }
    }
}

pub fn is_account_id(id: &str) -> bool {
    id.len() == 16 && id.bytes().all(|b| b.is_ascii_digit())
}

pub async fn load(path: &Path) -> Result<Settings, ConfigError> {
    debug!(path = %path.display(), "loading config");

    let settings = match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let settings: Settings = toml::from_str(&contents)?;
            info!(path = %path.display(), api_url = %settings.api_url, "loaded config");
            settings
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "config file not found, using defaults");
            Settings::default()
        }
        Err(e) => return Err(ConfigError::Read(e)),
    };

    settings.validate()?;
    Ok(settings)
}

pub async fn save(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    settings.validate()?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = toml::to_string_pretty(settings)?;
    tokio::fs::write(path, contents).await?;
    info!(path = %path.display(), "saved config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn parse_empty_file() {
        let parsed: Settings = toml::from_str("").unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: Settings = toml::from_str("port_bind_max_attempts = 4\n").unwrap();
        assert_eq!(parsed.port_bind_max_attempts, 4);
        assert_eq!(parsed.api_url, DEFAULT_API_URL);
        assert_eq!(parsed.bind_policy().max_attempts, 4);
    }

    #[test_case("1234567890123456", true ; "sixteen digits")]
    #[test_case("123456789012345", false ; "too short")]
    #[test_case("12345678901234567", false ; "too long")]
    #[test_case("1234 5678 9012 34", false ; "pretty token")]
    #[test_case("abcdefghijklmnop", false ; "letters")]
    fn account_id_format(id: &str, valid: bool) {
        assert_eq!(is_account_id(id), valid);
        let settings = Settings {
            account_id: Some(id.into()),
            ..Settings::default()
        };
        assert_eq!(settings.validate().is_ok(), valid);
    }

    #[test_case(None, None ; "unset")]
    #[test_case(Some(""), None ; "empty")]
    #[test_case(Some("1234567890123456"), Some("1234567890123456") ; "set")]
    fn environment_override(env: Option<&str>, expected: Option<&str>) {
        let settings = Settings::default().with_account_override(env.map(str::to_string));
        assert_eq!(settings.account_id.as_deref(), expected);
    }

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mullwarden.toml");
        let settings = Settings {
            account_id: Some("1234567890123456".into()),
            account_wait_secs: 5,
            ..Settings::default()
        };
        save(&path, &settings).await.unwrap();
        assert_eq!(load(&path).await.unwrap(), settings);
    }
}
