//! # Integrator Configuration
//!
//! Configuration is loaded once at startup and handed to the orchestrator as
//! plain data.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HEDNOVA_USER, HEDNOVA_PASSWORD, HEDNOVA_API_KEY                    │
//! │     HEDNOVA_COMPANY, HEDNOVA_PERIOD                                    │
//! │     HEDNOVA_DATABASE_URL, HEDNOVA_INTERVAL_MINUTES                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/hednova/integrator.toml (Linux)                          │
//! │     ~/Library/Application Support/com.hednova.hednova/... (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     DIA endpoints, 30 s request timeout, 10 s connect timeout,         │
//! │     30 minute interval                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [integrator]
//! username = "ws_user"
//! password = "secret"
//! api_key = "dia-api-key"
//! company = "4"
//! period = "2"
//!
//! [database]
//! url = "sqlite:///var/lib/hednova/hednova.db?mode=rwc"
//!
//! [schedule]
//! interval_minutes = 30
//!
//! [[feeds]]
//! code = "ENT-04"
//! report_code = "RPR-000004"
//!
//! [[feeds]]
//! code = "ENT-10"
//! report_code = "RPR-000010"
//! incremental = true
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use hednova_core::TableSpec;
use hednova_db::DbConfig;

use crate::error::{IntegrationError, IntegrationResult};

// =============================================================================
// Defaults
// =============================================================================

/// DIA authentication endpoint.
pub const DEFAULT_AUTH_URL: &str = "https://kirpi.ws.dia.com.tr/api/v3/sis/json";

/// DIA report endpoint.
pub const DEFAULT_REPORT_URL: &str = "https://kirpi.ws.dia.com.tr/api/v3/rpr/json";

/// File path of a `sqlite:` URL, `None` for in-memory databases.
fn sqlite_file_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

fn default_lang() -> String {
    "tr".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_interval() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Integrator Credentials
// =============================================================================

/// Credentials and the company/period pair every fetch is scoped to.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct IntegratorSettings {
    /// Web service user.
    #[serde(default)]
    pub username: String,

    /// Web service password.
    #[serde(default)]
    pub password: String,

    /// API key sent with the login request.
    #[serde(default)]
    pub api_key: String,

    /// Company code (`firma_kodu`).
    #[serde(default)]
    pub company: String,

    /// Period code (`donem_kodu`).
    #[serde(default)]
    pub period: String,
}

impl fmt::Debug for IntegratorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegratorSettings")
            .field("username", &self.username)
            .field("password", &"***")
            .field("api_key", &"***")
            .field("company", &self.company)
            .field("period", &self.period)
            .finish()
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Remote service endpoints and request behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Login endpoint.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Report endpoint.
    #[serde(default = "default_report_url")]
    pub report_url: String,

    /// Language sent with the login request.
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Ask the service to drop other sessions of the same user on login.
    #[serde(default = "default_true")]
    pub disconnect_same_user: bool,
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_report_url() -> String {
    DEFAULT_REPORT_URL.to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            auth_url: default_auth_url(),
            report_url: default_report_url(),
            lang: default_lang(),
            request_timeout_secs: default_request_timeout(),
            disconnect_same_user: true,
        }
    }
}

impl RemoteSettings {
    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Local database connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// sqlx connection URL. Defaults to `hednova.db` in the data directory.
    #[serde(default)]
    pub url: Option<String>,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum pooled connections per cycle.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Apply embedded migrations on connect.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            url: None,
            connect_timeout_secs: default_connect_timeout(),
            max_connections: default_max_connections(),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Schedule Settings
// =============================================================================

/// Cycle schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Minutes between cycle starts.
    #[serde(default = "default_interval")]
    pub interval_minutes: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            interval_minutes: default_interval(),
        }
    }
}

impl ScheduleSettings {
    /// Interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

// =============================================================================
// Feeds
// =============================================================================

/// One `[[feeds]]` entry: a remote report mapped onto a local table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Integration code (`ENT-04`), also the key of the built-in catalog.
    pub code: String,

    /// Report code sent to the service. Defaults to `code`.
    #[serde(default)]
    pub report_code: Option<String>,

    /// Display title. Defaults to the catalog title.
    #[serde(default)]
    pub title: Option<String>,

    /// Sub-report id for hierarchical reports (`D-0001`).
    #[serde(default)]
    pub detail: Option<String>,

    /// Send the last success time as `tarihsaat` and never prune.
    #[serde(default)]
    pub incremental: bool,

    /// Skip this feed without removing it from the file.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Inline table spec, overriding the built-in one.
    #[serde(default)]
    pub table: Option<TableSpec>,
}

impl FeedConfig {
    /// A feed using the built-in spec for `code`.
    pub fn builtin(code: impl Into<String>) -> Self {
        FeedConfig {
            code: code.into(),
            report_code: None,
            title: None,
            detail: None,
            incremental: false,
            enabled: true,
            table: None,
        }
    }
}

// =============================================================================
// Main Config
// =============================================================================

/// Complete integrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegratorConfig {
    #[serde(default)]
    pub integrator: IntegratorSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl IntegratorConfig {
    /// Loads configuration from file and environment, then validates it.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (an explicit path must exist)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> IntegrationResult<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                Some(path) => {
                    debug!(?path, "Config file not found, using defaults");
                    Self::default()
                }
                None => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        config.prepare_storage()?;

        Ok(config)
    }

    /// Reads a TOML file without applying overrides or validating.
    pub fn from_file(path: &Path) -> IntegrationResult<Self> {
        info!(?path, "Loading integrator config from file");
        let contents = std::fs::read_to_string(path).map_err(|e| {
            IntegrationError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Parses TOML without applying overrides or validating.
    pub fn from_toml(contents: &str) -> IntegrationResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> IntegrationResult<()> {
        let required = [
            ("integrator.username", &self.integrator.username),
            ("integrator.password", &self.integrator.password),
            ("integrator.api_key", &self.integrator.api_key),
            ("integrator.company", &self.integrator.company),
            ("integrator.period", &self.integrator.period),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(IntegrationError::InvalidConfig(format!("{} is required", name)));
            }
        }

        validate_http_url("remote.auth_url", &self.remote.auth_url)?;
        validate_http_url("remote.report_url", &self.remote.report_url)?;

        if self.remote.request_timeout_secs == 0 {
            return Err(IntegrationError::InvalidConfig(
                "remote.request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.database.connect_timeout_secs == 0 {
            return Err(IntegrationError::InvalidConfig(
                "database.connect_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(IntegrationError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.schedule.interval_minutes == 0 {
            return Err(IntegrationError::InvalidConfig(
                "schedule.interval_minutes must be greater than 0".into(),
            ));
        }
        if self.feeds.iter().all(|f| !f.enabled) {
            return Err(IntegrationError::InvalidConfig("no feeds configured".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(user) = lookup("HEDNOVA_USER") {
            debug!(username = %user, "Overriding username from environment");
            self.integrator.username = user;
        }
        if let Some(password) = lookup("HEDNOVA_PASSWORD") {
            self.integrator.password = password;
        }
        if let Some(key) = lookup("HEDNOVA_API_KEY") {
            self.integrator.api_key = key;
        }
        if let Some(company) = lookup("HEDNOVA_COMPANY") {
            debug!(company = %company, "Overriding company from environment");
            self.integrator.company = company;
        }
        if let Some(period) = lookup("HEDNOVA_PERIOD") {
            debug!(period = %period, "Overriding period from environment");
            self.integrator.period = period;
        }
        if let Some(url) = lookup("HEDNOVA_DATABASE_URL") {
            debug!("Overriding database URL from environment");
            self.database.url = Some(url);
        }
        if let Some(minutes) = lookup("HEDNOVA_INTERVAL_MINUTES") {
            match minutes.trim().parse::<u64>() {
                Ok(m) => self.schedule.interval_minutes = m,
                Err(_) => debug!(value = %minutes, "Ignoring invalid HEDNOVA_INTERVAL_MINUTES"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "hednova", "hednova")
            .map(|dirs| dirs.config_dir().join("integrator.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Connection URL of the local database.
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database.url {
            return url.clone();
        }
        let path = directories::ProjectDirs::from("com", "hednova", "hednova")
            .map(|dirs| dirs.data_dir().join("hednova.db"))
            .unwrap_or_else(|| PathBuf::from("hednova.db"));
        format!("sqlite://{}?mode=rwc", path.display())
    }

    /// Creates the directory holding the database file.
    ///
    /// SQLite creates the file on first connect but not its parent
    /// directories. In-memory URLs are left alone.
    pub fn prepare_storage(&self) -> IntegrationResult<()> {
        let url = self.database_url();
        let Some(parent) = sqlite_file_path(&url)
            .and_then(|path| path.parent().map(Path::to_path_buf))
            .filter(|parent| !parent.as_os_str().is_empty())
        else {
            return Ok(());
        };

        if !parent.exists() {
            debug!(path = ?parent, "Creating database directory");
            std::fs::create_dir_all(&parent).map_err(|e| {
                IntegrationError::ConfigLoadFailed(format!("{}: {}", parent.display(), e))
            })?;
        }
        Ok(())
    }

    /// Database configuration for the per-cycle scoped handle.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::from_url(self.database_url())
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .max_connections(self.database.max_connections)
            .min_connections(0)
            .run_migrations(self.database.run_migrations)
    }

    /// Interval between cycles.
    pub fn interval(&self) -> Duration {
        self.schedule.interval()
    }
}

fn validate_http_url(name: &str, raw: &str) -> IntegrationResult<()> {
    let url = Url::parse(raw)
        .map_err(|e| IntegrationError::InvalidConfig(format!("{}: {}", name, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(IntegrationError::InvalidConfig(format!(
            "{} must use http or https, got {}",
            name, other
        ))),
    }
}
