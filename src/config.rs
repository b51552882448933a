//! Settings read from `<data_dir>/config.toml`, then from the environment.
//!
//! ```toml
//! api_url = "https://gestora.example.com/api"
//! language = "pt"
//! status_dialect = "pt"
//!
//! [notifications]
//! cooldown_secs = 5
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::fields::{Language, StatusDialect};
use crate::notify::{DEFAULT_COOLDOWN_SECS, DEFAULT_RECENCY_SECS};

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub cooldown_secs: i64,
    pub recency_secs: i64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            recency_secs: DEFAULT_RECENCY_SECS,
        }
    }
}

impl NotificationSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs)
    }

    pub fn recency(&self) -> Duration {
        Duration::seconds(self.recency_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    pub language: Language,
    /// Spelling used when sending statuses to the backend.
    pub status_dialect: StatusDialect,
    /// Use the in-process demo backend instead of `api_url`.
    pub offline: bool,
    pub timeout_secs: u64,
    pub notifications: NotificationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_url: DEFAULT_API_URL.to_string(),
            language: Language::En,
            status_dialect: StatusDialect::En,
            offline: false,
            timeout_secs: 15,
            notifications: NotificationSettings::default(),
        }
    }
}

impl Settings {
    /// Read `config.toml` under `data_dir`; a missing file means defaults.
    pub fn load(data_dir: &Path) -> Result<Settings, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let settings = match fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Settings::default()
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Ok(settings.with_env(|key| std::env::var(key).ok()))
    }

    /// Apply `GESTORA_API_URL`, `GESTORA_LANG` and `GESTORA_OFFLINE`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Settings {
        if let Some(url) = lookup("GESTORA_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        match lookup("GESTORA_LANG").as_deref().map(str::trim) {
            Some("pt") | Some("pt-PT") | Some("pt_PT") => self.language = Language::Pt,
            Some("en") => self.language = Language::En,
            _ => {}
        }
        if let Some(flag) = lookup("GESTORA_OFFLINE") {
            self.offline = matches!(flag.trim(), "1" | "true" | "yes");
        }
        self
    }

    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.timeout_secs.max(1))
    }
}

/// `--dir` if given, else `~/.gestora`; created if missing.
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => dirs::home_dir().ok_or(ConfigError::NoHome)?.join(".gestora"),
    };
    fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap().with_env(|_| None);
        assert_eq!(settings.notifications.cooldown_secs, 5);
        assert_eq!(settings.timeout(), StdDuration::from_secs(15));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "language = \"pt\"\nstatus_dialect = \"pt\"\n[notifications]\nrecency_secs = 30\n",
        )
        .unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.status_dialect, StatusDialect::Pt);
        assert_eq!(settings.notifications.recency(), Duration::seconds(30));
        assert_eq!(settings.notifications.cooldown_secs, 5);
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "language = [").unwrap();
        assert!(matches!(Settings::load(dir.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn environment_overrides() {
        let settings = Settings::default().with_env(|key| match key {
            "GESTORA_API_URL" => Some("https://api.test".into()),
            "GESTORA_LANG" => Some("pt".into()),
            "GESTORA_OFFLINE" => Some("1".into()),
            _ => None,
        });
        assert_eq!(settings.api_url, "https://api.test");
        assert_eq!(settings.language, Language::Pt);
        assert!(settings.offline);
    }

    #[test]
    fn explicit_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        assert_eq!(data_dir(Some(&nested)).unwrap(), nested);
        assert!(nested.is_dir());
    }
}
