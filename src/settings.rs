use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{KopilkaError, Result};

pub const DB_FILE: &str = "kopilka.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default)]
    pub broker: BrokerSettings,
    #[serde(default)]
    pub bank_feed: BankFeedSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    #[serde(default = "default_broker_url")]
    pub api_base_url: String,
    /// Name of the environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub staging_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BankFeedSettings {
    #[serde(default)]
    pub inbox_dir: Option<String>,
    #[serde(default)]
    pub processed_dir: Option<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_currency() -> String {
    "RUB".to_string()
}

fn default_broker_url() -> String {
    "https://invest-public-api.tinkoff.ru/rest/tinkoff.public.invest.api.contract.v1".to_string()
}

fn default_token_env() -> String {
    "TINKOFF_INVEST_TOKEN".to_string()
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_broker_url(),
            token_env: default_token_env(),
            staging_file: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            bind_addr: default_bind_addr(),
            default_currency: default_currency(),
            broker: BrokerSettings::default(),
            bank_feed: BankFeedSettings::default(),
        }
    }
}

impl Settings {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_path().join(DB_FILE)
    }

    pub fn staging_path(&self) -> PathBuf {
        match &self.broker.staging_file {
            Some(path) => PathBuf::from(path),
            None => self.data_path().join("staging").join("prepared_accounts.json"),
        }
    }

    pub fn inbox_path(&self) -> PathBuf {
        match &self.bank_feed.inbox_dir {
            Some(path) => PathBuf::from(path),
            None => self.data_path().join("banking").join("new"),
        }
    }

    pub fn processed_path(&self) -> PathBuf {
        match &self.bank_feed.processed_dir {
            Some(path) => PathBuf::from(path),
            None => self.data_path().join("banking").join("processed"),
        }
    }

    /// Environment variables win over the settings file.
    fn apply_env(mut self) -> Self {
        if let Ok(dir) = std::env::var("KOPILKA_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = dir;
            }
        }
        if let Ok(bind) = std::env::var("KOPILKA_BIND") {
            if !bind.trim().is_empty() {
                self.bind_addr = bind;
            }
        }
        self
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("kopilka")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("kopilka")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    let settings = if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    };
    settings.apply_env()
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| KopilkaError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/kopilka"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.bind_addr, "127.0.0.1:8000");
        assert_eq!(s.default_currency, "RUB");
        assert_eq!(s.broker.token_env, "TINKOFF_INVEST_TOKEN");
        assert!(s.bank_feed.inbox_dir.is_none());
    }

    #[test]
    fn test_derived_paths_follow_data_dir() {
        let s = Settings {
            data_dir: "/srv/kopilka".to_string(),
            ..Settings::default()
        };
        assert_eq!(s.db_path(), PathBuf::from("/srv/kopilka/kopilka.db"));
        assert_eq!(s.inbox_path(), PathBuf::from("/srv/kopilka/banking/new"));
        assert_eq!(s.processed_path(), PathBuf::from("/srv/kopilka/banking/processed"));
        assert_eq!(
            s.staging_path(),
            PathBuf::from("/srv/kopilka/staging/prepared_accounts.json")
        );
    }

    #[test]
    fn test_explicit_bank_feed_dirs_win() {
        let json = r#"{
            "data_dir": "/srv/kopilka",
            "bank_feed": {"inbox_dir": "/opt/data/new", "processed_dir": "/opt/data/done"}
        }"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.inbox_path(), PathBuf::from("/opt/data/new"));
        assert_eq!(s.processed_path(), PathBuf::from("/opt/data/done"));
    }

    #[test]
    fn test_save_and_load_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            bind_addr: "0.0.0.0:9000".to_string(),
            ..Settings::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
        let loaded: Settings =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.bind_addr, "0.0.0.0:9000");
        assert_eq!(loaded.data_dir, "/tmp/test");
    }
}
