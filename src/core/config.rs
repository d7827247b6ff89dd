use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_SYMBOLS: [&str; 4] = ["EGP", "USD", "EUR", "DZD"];
pub const DEFAULT_RATES_TABLE: &str = "CURRENCY_RATES";
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 4000;

#[derive(Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub backup_access_key: Option<String>,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

fn default_symbols() -> Vec<String> {
    DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

fn default_request_delay_ms() -> u64 {
    DEFAULT_REQUEST_DELAY_MS
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://api.exchangeratesapi.io/v1/".to_string(),
            access_key: None,
            backup_access_key: None,
            symbols: default_symbols(),
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
        }
    }
}

impl ApiConfig {
    /// Picks the primary or the backup access key.
    pub fn key(&self, use_backup: bool) -> Result<&str> {
        let (key, name) = if use_backup {
            (&self.backup_access_key, "backup_access_key")
        } else {
            (&self.access_key, "access_key")
        };
        key.as_deref()
            .ok_or_else(|| anyhow!("API {name} is not configured"))
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("access_key", &self.access_key.as_ref().map(|_| "***"))
            .field(
                "backup_access_key",
                &self.backup_access_key.as_ref().map(|_| "***"),
            )
            .field("symbols", &self.symbols)
            .field("request_delay_ms", &self.request_delay_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Postgres,
    Sqlite,
}

impl std::str::FromStr for DatabaseDriver {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseDriver::Postgres),
            "sqlite" => Ok(DatabaseDriver::Sqlite),
            _ => Err(anyhow!("Invalid database driver: {}", s)),
        }
    }
}

#[derive(Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssl_cert_path: Option<PathBuf>,
    /// SQLite database file. In-memory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_rates_table")]
    pub rates_table: String,
}

fn default_rates_table() -> String {
    DEFAULT_RATES_TABLE.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            driver: DatabaseDriver::default(),
            host: None,
            port: None,
            name: None,
            user: None,
            password: None,
            ssl_cert_path: None,
            path: None,
            rates_table: default_rates_table(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("ssl_cert_path", &self.ssl_cert_path)
            .field("path", &self.path)
            .field("rates_table", &self.rates_table)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
}

impl AppConfig {
    /// Loads the config file (if any) and applies environment overrides.
    ///
    /// An explicit `path` must exist. The default location is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let default_path = Self::default_config_path()?;
                if default_path.exists() {
                    Self::load_from_path(&default_path)?
                } else {
                    debug!("No config file at {}, using defaults", default_path.display());
                    Self::default()
                }
            }
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "fxpivot", "fxpivot")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Overrides settings from variables returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = lookup("ACCESS_KEY") {
            self.api.access_key = Some(v);
        }
        if let Some(v) = lookup("BACKUP_ACCESS_KEY") {
            self.api.backup_access_key = Some(v);
        }
        if let Some(v) = lookup("DB_DRIVER") {
            self.database.driver = v.parse()?;
        }
        if let Some(v) = lookup("DB_HOSTNAME") {
            self.database.host = Some(v);
        }
        if let Some(v) = lookup("DB_PORT") {
            let port = v
                .parse()
                .with_context(|| format!("DB_PORT must be a port number, got: {v}"))?;
            self.database.port = Some(port);
        }
        if let Some(v) = lookup("DB_NAME") {
            self.database.name = Some(v);
        }
        if let Some(v) = lookup("DB_UID") {
            self.database.user = Some(v);
        }
        if let Some(v) = lookup("DB_PWD") {
            self.database.password = Some(v);
        }
        if let Some(v) = lookup("PATH_TO_SSL") {
            self.database.ssl_cert_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DB_PATH") {
            self.database.path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("CURRENCY_RATES") {
            self.database.rates_table = v;
        }
        if let Some(v) = lookup("RATES_CSV_PATH") {
            self.csv_path = Some(PathBuf::from(v));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
api:
  base_url: "http://example.com/v1/"
  access_key: "primary"
  request_delay_ms: 0
database:
  driver: sqlite
  path: "/tmp/rates.db"
csv_path: "/tmp/rates.csv"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.api.base_url, "http://example.com/v1/");
        assert_eq!(config.api.access_key.as_deref(), Some("primary"));
        assert_eq!(config.api.symbols, vec!["EGP", "USD", "EUR", "DZD"]);
        assert_eq!(config.api.request_delay_ms, 0);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.rates_table, "CURRENCY_RATES");
        assert_eq!(config.csv_path, Some(PathBuf::from("/tmp/rates.csv")));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.database.driver, DatabaseDriver::Postgres);
        assert_eq!(config.api.request_delay_ms, DEFAULT_REQUEST_DELAY_MS);
        assert!(config.api.access_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BASE_URL", "http://localhost/"),
            ("ACCESS_KEY", "k1"),
            ("BACKUP_ACCESS_KEY", "k2"),
            ("DB_HOSTNAME", "db.local"),
            ("DB_PORT", "50001"),
            ("DB_NAME", "BLUDB"),
            ("DB_UID", "etl"),
            ("DB_PWD", "pw"),
            ("PATH_TO_SSL", "/certs/db.crt"),
            ("CURRENCY_RATES", "RATES_2024"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api.base_url, "http://localhost/");
        assert_eq!(config.api.key(false).unwrap(), "k1");
        assert_eq!(config.api.key(true).unwrap(), "k2");
        assert_eq!(config.database.host.as_deref(), Some("db.local"));
        assert_eq!(config.database.port, Some(50001));
        assert_eq!(config.database.name.as_deref(), Some("BLUDB"));
        assert_eq!(config.database.user.as_deref(), Some("etl"));
        assert_eq!(
            config.database.ssl_cert_path,
            Some(PathBuf::from("/certs/db.crt"))
        );
        assert_eq!(config.database.rates_table, "RATES_2024");
    }

    #[test]
    fn test_bad_port_override_fails() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|k| (k == "DB_PORT").then(|| "abc".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let config = AppConfig::default();
        let err = config.api.key(true).unwrap_err();
        assert!(err.to_string().contains("backup_access_key"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.api.access_key = Some("topsecret".to_string());
        config.database.password = Some("hunter2".to_string());
        let printed = format!("{config:?}");
        assert!(!printed.contains("topsecret"));
        assert!(!printed.contains("hunter2"));
    }
}
