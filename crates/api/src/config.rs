use domain::models::{MilestoneConfig, MilestoneTiers};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    pub jwt: JwtAuthConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub milestones: MilestonesConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn to_pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// HS256 shared secret used to verify bearer tokens
    pub secret: String,

    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: i64,

    /// Clock skew tolerance in seconds
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

/// Outbound email settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,

    /// `console` (log only) or `sendgrid`
    #[serde(default = "default_console_provider")]
    pub provider: String,

    #[serde(default)]
    pub sendgrid_api_key: String,

    #[serde(default = "default_sendgrid_url")]
    pub sendgrid_url: String,

    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    #[serde(default = "default_sender_name")]
    pub sender_name: String,

    #[serde(default = "default_channel_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_console_provider(),
            sendgrid_api_key: String::new(),
            sendgrid_url: default_sendgrid_url(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
            timeout_secs: default_channel_timeout(),
        }
    }
}

/// Outbound SMS settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// `console` (log only) or `africastalking`
    #[serde(default = "default_console_provider")]
    pub provider: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub username: String,

    /// Optional alphanumeric sender ID
    #[serde(default)]
    pub sender_id: Option<String>,

    #[serde(default = "default_sms_url")]
    pub base_url: String,

    #[serde(default = "default_channel_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_console_provider(),
            api_key: String::new(),
            username: String::new(),
            sender_id: None,
            base_url: default_sms_url(),
            timeout_secs: default_channel_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportsConfig {
    /// Directory for transient export files. Defaults to the system temp dir.
    #[serde(default)]
    pub exports_dir: Option<PathBuf>,
}

impl ReportsConfig {
    pub fn exports_dir(&self) -> PathBuf {
        self.exports_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Milestone tiers and announcement recipients.
#[derive(Debug, Clone, Deserialize)]
pub struct MilestonesConfig {
    #[serde(default = "default_user_tiers")]
    pub users: Vec<i64>,

    #[serde(default = "default_suburb_tiers")]
    pub suburbs: Vec<i64>,

    #[serde(default = "default_city_tiers")]
    pub cities: Vec<i64>,

    #[serde(default)]
    pub notify_emails: Vec<String>,

    #[serde(default)]
    pub notify_phones: Vec<String>,
}

impl Default for MilestonesConfig {
    fn default() -> Self {
        Self {
            users: default_user_tiers(),
            suburbs: default_suburb_tiers(),
            cities: default_city_tiers(),
            notify_emails: Vec::new(),
            notify_phones: Vec::new(),
        }
    }
}

impl MilestonesConfig {
    /// Validated tier lists.
    pub fn tiers(&self) -> Result<MilestoneConfig, ConfigValidationError> {
        let build = |name: &str, values: &[i64]| {
            MilestoneTiers::new(values.to_vec()).map_err(|e| {
                ConfigValidationError::InvalidValue(format!("milestones.{}: {}", name, e))
            })
        };
        Ok(MilestoneConfig {
            users: build("users", &self.users)?,
            suburbs: build("suburbs", &self.suburbs)?,
            cities: build("cities", &self.cities)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Runs the background scheduler.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub scheduled_reports: bool,

    #[serde(default = "default_true")]
    pub milestone_check: bool,

    /// UTC hour at which weekly, monthly and yearly reports go out.
    #[serde(default = "default_report_hour")]
    pub report_hour_utc: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scheduled_reports: true,
            milestone_check: true,
            report_hour_utc: default_report_hour(),
        }
    }
}

// Default value functions
fn default_report_hour() -> u32 {
    8
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_access_token_expiry() -> i64 {
    3600
}
fn default_jwt_leeway() -> u64 {
    30
}
fn default_console_provider() -> String {
    "console".to_string()
}
fn default_sendgrid_url() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}
fn default_sender_email() -> String {
    "reports@cliniccore.app".to_string()
}
fn default_sender_name() -> String {
    "ClinicCore Reports".to_string()
}
fn default_sms_url() -> String {
    "https://api.africastalking.com/version1/messaging".to_string()
}
fn default_channel_timeout() -> u64 {
    15
}
fn default_user_tiers() -> Vec<i64> {
    vec![100, 500, 1000, 5000, 10000, 50000, 100000]
}
fn default_suburb_tiers() -> Vec<i64> {
    vec![5, 10, 25, 50, 100, 200]
}
fn default_city_tiers() -> Vec<i64> {
    vec![3, 5, 10, 20]
}
fn default_true() -> bool {
    true
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Defaults used when no config file is available.
const EMBEDDED_DEFAULTS: &str = r#"
    [server]
    host = "0.0.0.0"
    port = 8080
    request_timeout_secs = 30

    [database]
    url = ""
    max_connections = 20
    min_connections = 2
    connect_timeout_secs = 10
    idle_timeout_secs = 600

    [logging]
    level = "info"
    format = "json"

    [jwt]
    secret = ""
    access_token_expiry_secs = 3600
    leeway_secs = 30

    [email]
    enabled = false
    provider = "console"

    [sms]
    enabled = false
    provider = "console"

    [jobs]
    enabled = false
"#;

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml
    /// 2. config/local.toml (optional, not in git)
    /// 3. Environment variables with the CLINIC__ prefix, e.g. CLINIC__DATABASE__URL
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("CLINIC")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("milestones.users")
                    .with_list_parse_key("milestones.suburbs")
                    .with_list_parse_key("milestones.cities")
                    .with_list_parse_key("milestones.notify_emails")
                    .with_list_parse_key("milestones.notify_phones")
                    .with_list_parse_key("security.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Builds a configuration from embedded defaults plus `overrides`.
    ///
    /// Does not read config files or validate, so tests can use partial configs.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(EMBEDDED_DEFAULTS, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "CLINIC__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "max_connections must be at least 1".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "CLINIC__JWT__SECRET environment variable must be set".to_string(),
            ));
        }

        if self.email.enabled && self.email.provider == "sendgrid" && self.email.sendgrid_api_key.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "email.sendgrid_api_key is required for the sendgrid provider".to_string(),
            ));
        }

        if self.sms.enabled
            && self.sms.provider == "africastalking"
            && (self.sms.api_key.is_empty() || self.sms.username.is_empty())
        {
            return Err(ConfigValidationError::MissingRequired(
                "sms.api_key and sms.username are required for the africastalking provider"
                    .to_string(),
            ));
        }

        if self.jobs.report_hour_utc > 23 {
            return Err(ConfigValidationError::InvalidValue(
                "jobs.report_hour_utc must be between 0 and 23".to_string(),
            ));
        }

        self.milestones.tiers()?;

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| {
                ConfigValidationError::InvalidValue(format!(
                    "Invalid listen address {}:{}",
                    self.server.host, self.server.port
                ))
            })
    }
}
