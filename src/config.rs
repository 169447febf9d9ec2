use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_TIMEOUT_SECS: u64 = 30;

/// Environment variables the process refuses to start without.
pub const REQUIRED_VARIABLES: [&str; 3] = ["API_SECRET", "DATABASE_URL", "DATABASE_SERVICE_KEY"];

/// Application configuration, read once at startup and never mutated.
#[derive(Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Interface to listen on
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared bearer secret expected on protected routes
    #[validate(length(min = 1))]
    pub api_secret: String,

    /// Base URL of the PostgREST-compatible backend
    #[validate(custom = "validate_database_url")]
    pub database_url: String,

    /// Service-role key sent to the backend
    #[validate(length(min = 1))]
    pub database_service_key: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Per-request backend timeout in seconds, 0 = disabled
    #[serde(default = "default_database_timeout_secs")]
    pub database_timeout_secs: u64,

    /// CORS: comma-separated list of allowed origins; permissive when unset
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the secrets
    pub fn new(api_secret: String, database_url: String, database_service_key: String) -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_secret,
            database_url,
            database_service_key,
            log_level: default_log_level(),
            log_json: false,
            database_timeout_secs: default_database_timeout_secs(),
            cors_allowed_origins: None,
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, AppConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| AppConfigError::InvalidBindAddress(self.host.clone(), self.port))
    }

    pub fn database_timeout(&self) -> Option<Duration> {
        match self.database_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn has_api_secret(&self) -> bool {
        !self.api_secret.is_empty()
    }

    pub fn has_database_url(&self) -> bool {
        !self.database_url.is_empty()
    }

    pub fn has_service_key(&self) -> bool {
        !self.database_service_key.is_empty()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_secret", &"<redacted>")
            .field("database_url", &self.database_url)
            .field("database_service_key", &"<redacted>")
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("database_timeout_secs", &self.database_timeout_secs)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<&'static str>),
    #[error("configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation error: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("invalid bind address {0}:{1}")]
    InvalidBindAddress(String, u16),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database_timeout_secs() -> u64 {
    DEFAULT_DATABASE_TIMEOUT_SECS
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_database_url(value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => {
            let mut err = ValidationError::new("database_url");
            err.message = Some("database_url must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

/// Names of required variables that are absent or empty, in declaration order.
pub fn missing_required<F>(lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    REQUIRED_VARIABLES
        .iter()
        .copied()
        .filter(|name| lookup(name).map_or(true, |value| value.is_empty()))
        .collect()
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("reporting_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(EnvFilter::new(filter_directive)).json().try_init();
    } else {
        let _ = fmt().with_env_filter(EnvFilter::new(filter_directive)).try_init();
    }
}

/// Loads application configuration from the process environment.
///
/// Required variables are checked before anything is deserialized so the
/// error names every missing variable at once. Values never appear in errors.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(env::vars().collect())
}

/// Same as [`load_config`] over an explicit set of variables.
pub fn load_config_from(vars: HashMap<String, String>) -> Result<AppConfig, AppConfigError> {
    let missing = missing_required(|name| vars.get(name).cloned());
    if !missing.is_empty() {
        return Err(AppConfigError::MissingVariables(missing));
    }

    from_builder(Config::builder().add_source(Environment::default().source(Some(vars))))
}

/// Applies defaults to an already-sourced builder, then deserializes and validates.
pub fn from_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<AppConfig, AppConfigError> {
    let config = builder
        .set_default("host", DEFAULT_HOST)?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    info!(
        port = app_config.port,
        timeout_secs = app_config.database_timeout_secs,
        "Configuration loaded successfully"
    );
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn builder_with(pairs: &[(&str, &str)]) -> ConfigBuilder<DefaultState> {
        pairs
            .iter()
            .fold(Config::builder(), |builder, (key, value)| {
                builder.set_override(*key, *value).unwrap()
            })
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("api_secret", "s3cret"),
            ("database_url", "https://db.example.com"),
            ("database_service_key", "service-key"),
        ]
    }

    #[test]
    fn missing_required_lists_every_absent_name_in_order() {
        let env: HashMap<&str, &str> = HashMap::from([("DATABASE_URL", "https://x")]);
        let missing = missing_required(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(missing, vec!["API_SECRET", "DATABASE_SERVICE_KEY"]);
    }

    #[test]
    fn empty_values_count_as_missing() {
        let missing = missing_required(|name| match name {
            "API_SECRET" => Some(String::new()),
            _ => Some("set".to_string()),
        });
        assert_eq!(missing, vec!["API_SECRET"]);
    }

    #[test]
    fn missing_error_names_variables_without_values() {
        let err = AppConfigError::MissingVariables(vec!["API_SECRET", "DATABASE_URL"]);
        assert_eq!(
            err.to_string(),
            "missing required environment variables: API_SECRET, DATABASE_URL"
        );
    }

    fn env_vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_environment_fails_before_anything_is_loaded() {
        match load_config_from(HashMap::new()) {
            Err(AppConfigError::MissingVariables(names)) => {
                assert_eq!(names, REQUIRED_VARIABLES.to_vec());
            }
            other => panic!("expected missing variables, got {:?}", other),
        }
    }

    #[test]
    fn one_missing_variable_is_enough_to_refuse() {
        let vars = env_vars(&[("API_SECRET", "s3cret"), ("DATABASE_URL", "https://db.example.com")]);
        assert!(matches!(
            load_config_from(vars),
            Err(AppConfigError::MissingVariables(names)) if names == vec!["DATABASE_SERVICE_KEY"]
        ));
    }

    #[test]
    fn environment_variables_load_into_config() {
        let vars = env_vars(&[
            ("API_SECRET", "s3cret"),
            ("DATABASE_URL", "https://db.example.com"),
            ("DATABASE_SERVICE_KEY", "service-key"),
            ("PORT", "8081"),
        ]);
        let cfg = load_config_from(vars).unwrap();
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.api_secret, "s3cret");
        assert!(cfg.has_service_key());
    }

    #[test]
    fn defaults_apply_when_optional_values_are_absent() {
        let cfg = from_builder(builder_with(&required())).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.log_level(), "info");
        assert!(!cfg.log_json);
        assert_eq!(cfg.database_timeout(), Some(Duration::from_secs(30)));
        assert!(cfg.cors_allowed_origins.is_none());
    }

    #[test]
    fn port_is_read_from_string_value() {
        let mut pairs = required();
        pairs.push(("port", "8088"));
        let cfg = from_builder(builder_with(&pairs)).unwrap();
        assert_eq!(cfg.port, 8088);
        assert_eq!(cfg.bind_addr().unwrap().port(), 8088);
    }

    #[test]
    fn zero_timeout_disables_backend_timeout() {
        let mut pairs = required();
        pairs.push(("database_timeout_secs", "0"));
        let cfg = from_builder(builder_with(&pairs)).unwrap();
        assert_eq!(cfg.database_timeout(), None);
    }

    #[test]
    fn non_http_database_url_fails_validation() {
        let pairs = [
            ("api_secret", "s3cret"),
            ("database_url", "postgres://localhost/db"),
            ("database_service_key", "service-key"),
        ];
        let result = from_builder(builder_with(&pairs));
        match result {
            Err(AppConfigError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("database_url"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn invalid_log_level_fails_validation() {
        let mut pairs = required();
        pairs.push(("log_level", "verbose"));
        assert!(matches!(
            from_builder(builder_with(&pairs)),
            Err(AppConfigError::Validation(_))
        ));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = AppConfig::new(
            "top-secret-token".into(),
            "https://db.example.com".into(),
            "service-role-key".into(),
        );
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("top-secret-token"));
        assert!(!rendered.contains("service-role-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
