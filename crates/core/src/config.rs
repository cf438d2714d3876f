use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::quote::Quote;
use crate::expiration::ExpirationPolicy;
use crate::flows::ApprovalPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub lifecycle: LifecycleConfig,
    pub sweeper: SweeperConfig,
    pub persistence: PersistenceConfig,
    pub notifications: NotificationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    pub high_value_threshold: Decimal,
    pub default_auto_expire_days: u32,
    pub expiration_warning_lead_days: u32,
}

impl LifecycleConfig {
    pub fn approval_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::new(self.high_value_threshold)
    }

    pub fn expiration_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::new(self.expiration_warning_lead_days)
    }
}

#[derive(Clone, Debug)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub max_concurrency: usize,
}

/// Retry schedule for transient persistence failures.
#[derive(Clone, Debug)]
pub struct PersistenceConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: u32,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub sweeper_enabled: Option<bool>,
    pub notifications_enabled: Option<bool>,
    pub high_value_threshold: Option<Decimal>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://optiquote.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            lifecycle: LifecycleConfig {
                high_value_threshold: Decimal::from(ApprovalPolicy::DEFAULT_HIGH_VALUE_THRESHOLD),
                default_auto_expire_days: Quote::DEFAULT_AUTO_EXPIRE_DAYS,
                expiration_warning_lead_days: ExpirationPolicy::DEFAULT_WARNING_LEAD_DAYS,
            },
            sweeper: SweeperConfig { enabled: true, interval_secs: 3_600, max_concurrency: 4 },
            persistence: PersistenceConfig {
                max_attempts: 3,
                base_delay_ms: 100,
                backoff_multiplier: 2,
                max_delay_ms: 2_000,
            },
            notifications: NotificationConfig {
                enabled: false,
                webhook_url: None,
                api_token: None,
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("optiquote.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(lifecycle) = patch.lifecycle {
            if let Some(threshold) = lifecycle.high_value_threshold {
                self.lifecycle.high_value_threshold = threshold;
            }
            if let Some(days) = lifecycle.default_auto_expire_days {
                self.lifecycle.default_auto_expire_days = days;
            }
            if let Some(days) = lifecycle.expiration_warning_lead_days {
                self.lifecycle.expiration_warning_lead_days = days;
            }
        }

        if let Some(sweeper) = patch.sweeper {
            if let Some(enabled) = sweeper.enabled {
                self.sweeper.enabled = enabled;
            }
            if let Some(interval_secs) = sweeper.interval_secs {
                self.sweeper.interval_secs = interval_secs;
            }
            if let Some(max_concurrency) = sweeper.max_concurrency {
                self.sweeper.max_concurrency = max_concurrency;
            }
        }

        if let Some(persistence) = patch.persistence {
            if let Some(max_attempts) = persistence.max_attempts {
                self.persistence.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = persistence.base_delay_ms {
                self.persistence.base_delay_ms = base_delay_ms;
            }
            if let Some(multiplier) = persistence.backoff_multiplier {
                self.persistence.backoff_multiplier = multiplier;
            }
            if let Some(max_delay_ms) = persistence.max_delay_ms {
                self.persistence.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(enabled) = notifications.enabled {
                self.notifications.enabled = enabled;
            }
            if let Some(webhook_url) = notifications.webhook_url {
                self.notifications.webhook_url = Some(webhook_url);
            }
            if let Some(api_token) = notifications.api_token {
                self.notifications.api_token = Some(secret_value(api_token));
            }
            if let Some(timeout_secs) = notifications.timeout_secs {
                self.notifications.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("OPTIQUOTE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("OPTIQUOTE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("OPTIQUOTE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("OPTIQUOTE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("OPTIQUOTE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OPTIQUOTE_LIFECYCLE_HIGH_VALUE_THRESHOLD") {
            self.lifecycle.high_value_threshold =
                parse_env("OPTIQUOTE_LIFECYCLE_HIGH_VALUE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("OPTIQUOTE_LIFECYCLE_DEFAULT_AUTO_EXPIRE_DAYS") {
            self.lifecycle.default_auto_expire_days =
                parse_env("OPTIQUOTE_LIFECYCLE_DEFAULT_AUTO_EXPIRE_DAYS", &value)?;
        }
        if let Some(value) = read_env("OPTIQUOTE_LIFECYCLE_EXPIRATION_WARNING_LEAD_DAYS") {
            self.lifecycle.expiration_warning_lead_days =
                parse_env("OPTIQUOTE_LIFECYCLE_EXPIRATION_WARNING_LEAD_DAYS", &value)?;
        }

        if let Some(value) = read_env("OPTIQUOTE_SWEEPER_ENABLED") {
            self.sweeper.enabled = parse_env("OPTIQUOTE_SWEEPER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("OPTIQUOTE_SWEEPER_INTERVAL_SECS") {
            self.sweeper.interval_secs = parse_env("OPTIQUOTE_SWEEPER_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("OPTIQUOTE_SWEEPER_MAX_CONCURRENCY") {
            self.sweeper.max_concurrency = parse_env("OPTIQUOTE_SWEEPER_MAX_CONCURRENCY", &value)?;
        }

        if let Some(value) = read_env("OPTIQUOTE_PERSISTENCE_MAX_ATTEMPTS") {
            self.persistence.max_attempts =
                parse_env("OPTIQUOTE_PERSISTENCE_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("OPTIQUOTE_PERSISTENCE_BASE_DELAY_MS") {
            self.persistence.base_delay_ms =
                parse_env("OPTIQUOTE_PERSISTENCE_BASE_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("OPTIQUOTE_NOTIFICATIONS_ENABLED") {
            self.notifications.enabled = parse_env("OPTIQUOTE_NOTIFICATIONS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("OPTIQUOTE_NOTIFICATIONS_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(value);
        }
        if let Some(value) = read_env("OPTIQUOTE_NOTIFICATIONS_API_TOKEN") {
            self.notifications.api_token = Some(secret_value(value));
        }

        if let Some(value) = read_env("OPTIQUOTE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("OPTIQUOTE_SERVER_PORT") {
            self.server.port = parse_env("OPTIQUOTE_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("OPTIQUOTE_LOGGING_LEVEL").or_else(|| read_env("OPTIQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OPTIQUOTE_LOGGING_FORMAT").or_else(|| read_env("OPTIQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.sweeper_enabled {
            self.sweeper.enabled = enabled;
        }
        if let Some(enabled) = overrides.notifications_enabled {
            self.notifications.enabled = enabled;
        }
        if let Some(threshold) = overrides.high_value_threshold {
            self.lifecycle.high_value_threshold = threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_lifecycle(&self.lifecycle)?;
        validate_sweeper(&self.sweeper)?;
        validate_persistence(&self.persistence)?;
        validate_notifications(&self.notifications)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Flattened, secret-free view for operator inspection.
    pub fn redacted_summary(&self) -> Vec<(&'static str, String)> {
        let token_state = match &self.notifications.api_token {
            Some(token) if !token.expose_secret().is_empty() => "set",
            _ => "unset",
        };
        vec![
            ("database.url", self.database.url.clone()),
            ("database.max_connections", self.database.max_connections.to_string()),
            ("lifecycle.high_value_threshold", self.lifecycle.high_value_threshold.to_string()),
            (
                "lifecycle.default_auto_expire_days",
                self.lifecycle.default_auto_expire_days.to_string(),
            ),
            (
                "lifecycle.expiration_warning_lead_days",
                self.lifecycle.expiration_warning_lead_days.to_string(),
            ),
            ("sweeper.enabled", self.sweeper.enabled.to_string()),
            ("sweeper.interval_secs", self.sweeper.interval_secs.to_string()),
            ("sweeper.max_concurrency", self.sweeper.max_concurrency.to_string()),
            ("persistence.max_attempts", self.persistence.max_attempts.to_string()),
            ("notifications.enabled", self.notifications.enabled.to_string()),
            (
                "notifications.webhook_url",
                self.notifications.webhook_url.clone().unwrap_or_default(),
            ),
            ("notifications.api_token", token_state.to_string()),
            ("server.bind_address", self.server.bind_address.clone()),
            ("server.port", self.server.port.to_string()),
            ("logging.level", self.logging.level.clone()),
            ("logging.format", self.logging.format.as_str().to_string()),
        ]
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("optiquote.toml"), PathBuf::from("config/optiquote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_lifecycle(lifecycle: &LifecycleConfig) -> Result<(), ConfigError> {
    if lifecycle.high_value_threshold <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "lifecycle.high_value_threshold must be greater than zero".to_string(),
        ));
    }

    if lifecycle.default_auto_expire_days == 0 {
        return Err(ConfigError::Validation(
            "lifecycle.default_auto_expire_days must be greater than zero".to_string(),
        ));
    }

    if lifecycle.expiration_warning_lead_days >= lifecycle.default_auto_expire_days {
        return Err(ConfigError::Validation(format!(
            "lifecycle.expiration_warning_lead_days ({}) must be smaller than \
             lifecycle.default_auto_expire_days ({}) so warnings precede expiry",
            lifecycle.expiration_warning_lead_days, lifecycle.default_auto_expire_days
        )));
    }

    Ok(())
}

fn validate_sweeper(sweeper: &SweeperConfig) -> Result<(), ConfigError> {
    if sweeper.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sweeper.interval_secs must be greater than zero".to_string(),
        ));
    }

    if sweeper.max_concurrency == 0 || sweeper.max_concurrency > 64 {
        return Err(ConfigError::Validation(
            "sweeper.max_concurrency must be in range 1..=64".to_string(),
        ));
    }

    Ok(())
}

fn validate_persistence(persistence: &PersistenceConfig) -> Result<(), ConfigError> {
    if persistence.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "persistence.max_attempts must be at least 1".to_string(),
        ));
    }

    if persistence.backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "persistence.backoff_multiplier must be at least 1".to_string(),
        ));
    }

    if persistence.max_delay_ms < persistence.base_delay_ms {
        return Err(ConfigError::Validation(
            "persistence.max_delay_ms must not be smaller than persistence.base_delay_ms"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationConfig) -> Result<(), ConfigError> {
    if notifications.timeout_secs == 0 || notifications.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "notifications.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if let Some(url) = &notifications.webhook_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "notifications.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if notifications.enabled && notifications.webhook_url.is_none() {
        return Err(ConfigError::Validation(
            "notifications.enabled is true but notifications.webhook_url is not set \
             (set OPTIQUOTE_NOTIFICATIONS_WEBHOOK_URL or disable notifications)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    lifecycle: Option<LifecyclePatch>,
    sweeper: Option<SweeperPatch>,
    persistence: Option<PersistencePatch>,
    notifications: Option<NotificationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LifecyclePatch {
    high_value_threshold: Option<Decimal>,
    default_auto_expire_days: Option<u32>,
    expiration_warning_lead_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SweeperPatch {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    max_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PersistencePatch {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    backoff_multiplier: Option<u32>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    enabled: Option<bool>,
    webhook_url: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.lifecycle.default_auto_expire_days == 30, "default expiry is 30 days")?;
        ensure(config.lifecycle.expiration_warning_lead_days == 3, "default warn lead is 3")?;
        ensure(
            config.lifecycle.high_value_threshold == Decimal::from(10_000),
            "default threshold is 10000",
        )?;
        ensure(!config.notifications.enabled, "notifications default off")?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "compact logging default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_NOTIFY_TOKEN", "tok-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("optiquote.toml");
            fs::write(
                &path,
                r#"
[notifications]
enabled = true
webhook_url = "https://hooks.example.com/expiring"
api_token = "${TEST_NOTIFY_TOKEN}"

[lifecycle]
high_value_threshold = "7500.00"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config.notifications.api_token.as_ref().map(|t| t.expose_secret());
            ensure(token == Some("tok-from-env"), "api token should be loaded from environment")?;
            ensure(
                config.lifecycle.high_value_threshold == Decimal::new(750_000, 2),
                "threshold should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_NOTIFY_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OPTIQUOTE_LOG_LEVEL", "warn");
        env::set_var("OPTIQUOTE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["OPTIQUOTE_LOG_LEVEL", "OPTIQUOTE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OPTIQUOTE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("OPTIQUOTE_SWEEPER_INTERVAL_SECS", "900");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("optiquote.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[sweeper]
interval_secs = 60
max_concurrency = 8

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.sweeper.interval_secs == 900, "env interval should win over file")?;
            ensure(
                config.sweeper.max_concurrency == 8,
                "file concurrency should win over default",
            )?;
            Ok(())
        })();

        clear_vars(&["OPTIQUOTE_DATABASE_URL", "OPTIQUOTE_SWEEPER_INTERVAL_SECS"]);
        result
    }

    #[test]
    fn invalid_env_override_names_the_variable() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OPTIQUOTE_LIFECYCLE_HIGH_VALUE_THRESHOLD", "lots");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "OPTIQUOTE_LIFECYCLE_HIGH_VALUE_THRESHOLD"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["OPTIQUOTE_LIFECYCLE_HIGH_VALUE_THRESHOLD"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OPTIQUOTE_NOTIFICATIONS_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("notifications.webhook_url")
            );
            ensure(has_message, "validation failure should mention notifications.webhook_url")
        })();

        clear_vars(&["OPTIQUOTE_NOTIFICATIONS_ENABLED"]);
        result
    }

    #[test]
    fn warning_lead_must_precede_expiry() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OPTIQUOTE_LIFECYCLE_DEFAULT_AUTO_EXPIRE_DAYS", "3");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message)
                        if message.contains("expiration_warning_lead_days")
                ),
                "validation should mention the warning lead",
            )
        })();

        clear_vars(&["OPTIQUOTE_LIFECYCLE_DEFAULT_AUTO_EXPIRE_DAYS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OPTIQUOTE_NOTIFICATIONS_API_TOKEN", "tok-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");
            ensure(!debug.contains("tok-secret-value"), "debug output should not contain token")?;

            let summary = config.redacted_summary();
            ensure(
                summary.iter().all(|(_, value)| !value.contains("tok-secret-value")),
                "summary should not contain token",
            )?;
            ensure(
                summary
                    .iter()
                    .any(|(key, value)| *key == "notifications.api_token" && value == "set"),
                "summary reports token presence",
            )
        })();

        clear_vars(&["OPTIQUOTE_NOTIFICATIONS_API_TOKEN"]);
        result
    }
}
