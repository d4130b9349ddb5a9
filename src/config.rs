use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// sqlx connection URL; `mode=rwc` creates the file on first start
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    database_url_for(&PathBuf::from("/dev/shm/messages.db"))
}

/// sqlx URL for a SQLite file, created on first start
fn database_url_for(path: &std::path::Path) -> String {
    format!("sqlite:{}?mode=rwc", path.display())
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Web server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Maximum request body in bytes for message creation
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    /// Mask client IPs in request logs
    #[serde(default)]
    pub anonymize_ip: bool,
    /// CIDR ranges whose X-Forwarded-For header is honored
    #[serde(default = "default_trusted_proxies")]
    pub trusted_proxies: Vec<String>,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}

fn default_max_upload_size() -> usize {
    10 << 20
}

fn default_trusted_proxies() -> Vec<String> {
    vec!["127.0.0.1/32".to_string()]
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            max_upload_size: default_max_upload_size(),
            anonymize_ip: false,
            trusted_proxies: default_trusted_proxies(),
        }
    }
}

impl WebConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Message lifetime settings
#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    /// TTL applied when a client asks for a non-positive one
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: i64,
    /// Period of the expired-message sweep
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> i64 {
    86_400
}

fn default_sweep_interval_secs() -> u64 {
    3_600
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl MessagesConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Log output settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Command-line flags; each one given overrides files and environment
#[derive(Debug, Default, Parser)]
#[command(name = "burnafterread")]
#[command(about = "One-time encrypted message drop", version)]
pub struct CliArgs {
    /// Path to the SQLite database file
    #[arg(long = "db", value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Maximum upload size in bytes
    #[arg(long, value_name = "BYTES")]
    pub max_upload_size: Option<u64>,

    /// Default TTL for messages in seconds
    #[arg(long, value_name = "SECS")]
    pub default_ttl: Option<i64>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Anonymize IP addresses in logs
    #[arg(long)]
    pub anonymize_ip: bool,

    /// Comma-separated list of trusted proxy CIDR ranges
    #[arg(long, value_name = "CIDRS", value_delimiter = ',')]
    pub trusted_proxies: Option<Vec<String>>,
}

impl AppConfig {
    /// Load configuration from files, environment variables and flags
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        // Override with environment variables (prefix: BURNAFTERREAD_)
        // e.g., BURNAFTERREAD_WEB__PORT, BURNAFTERREAD_DATABASE__URL
        let env = Environment::with_prefix("BURNAFTERREAD")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("web.trusted_proxies");

        Self::layered(env, args)
    }

    fn layered(env: Environment, args: &CliArgs) -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::with_name("config/default").required(false))
            // Override with local config if present
            .add_source(File::with_name("config/local").required(false))
            .add_source(env)
            // Flags win over everything else
            .set_override_option("database.url", args.db.as_deref().map(database_url_for))?
            .set_override_option("web.max_upload_size", args.max_upload_size)?
            .set_override_option("messages.default_ttl_secs", args.default_ttl)?
            .set_override_option("web.port", args.port.map(i64::from))?
            .set_override_option("web.anonymize_ip", args.anonymize_ip.then_some(true))?
            .set_override_option("web.trusted_proxies", args.trusted_proxies.clone())?
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_source() {
        let config: AppConfig = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.url, "sqlite:/dev/shm/messages.db?mode=rwc");
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.web.max_upload_size, 10 * 1024 * 1024);
        assert!(!config.web.anonymize_ip);
        assert_eq!(config.web.trusted_proxies, vec!["127.0.0.1/32"]);
        assert_eq!(config.messages.default_ttl_secs, 86_400);
        assert_eq!(config.messages.sweep_interval(), Duration::from_secs(3_600));
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_override() {
        let config: AppConfig = Config::builder()
            .set_override("web.port", 9000)
            .unwrap()
            .set_override("messages.default_ttl_secs", 3600)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.web.port, 9000);
        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.messages.default_ttl_secs, 3600);
        assert_eq!(config.web.bind_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_sweep_interval_never_zero() {
        let messages = MessagesConfig {
            default_ttl_secs: 60,
            sweep_interval_secs: 0,
        };
        assert_eq!(messages.sweep_interval(), Duration::from_secs(1));
    }

    fn env_with(vars: &[(&str, &str)]) -> Environment {
        let source = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix("BURNAFTERREAD")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("web.trusted_proxies")
            .source(Some(source))
    }

    #[test]
    fn test_env_applies_without_flags() {
        let env = env_with(&[
            ("BURNAFTERREAD_WEB__PORT", "9000"),
            ("BURNAFTERREAD_WEB__TRUSTED_PROXIES", "10.0.0.0/8,127.0.0.1/32"),
        ]);
        let config = AppConfig::layered(env, &CliArgs::default()).unwrap();

        assert_eq!(config.web.port, 9000);
        assert_eq!(config.web.trusted_proxies, vec!["10.0.0.0/8", "127.0.0.1/32"]);
        assert!(!config.web.anonymize_ip);
    }

    #[test]
    fn test_flags_beat_environment() {
        let env = env_with(&[
            ("BURNAFTERREAD_WEB__PORT", "9000"),
            ("BURNAFTERREAD_MESSAGES__DEFAULT_TTL_SECS", "60"),
            ("BURNAFTERREAD_WEB__ANONYMIZE_IP", "false"),
        ]);
        let args = CliArgs::try_parse_from([
            "burnafterread",
            "--port",
            "7000",
            "--default-ttl",
            "3600",
            "--anonymize-ip",
            "--db",
            "/tmp/burn.db",
            "--max-upload-size",
            "1024",
            "--trusted-proxies",
            "192.168.0.0/16,::1/128",
        ])
        .unwrap();
        let config = AppConfig::layered(env, &args).unwrap();

        assert_eq!(config.web.port, 7000);
        assert_eq!(config.messages.default_ttl_secs, 3600);
        assert!(config.web.anonymize_ip);
        assert_eq!(config.database.url, "sqlite:/tmp/burn.db?mode=rwc");
        assert_eq!(config.web.max_upload_size, 1024);
        assert_eq!(config.web.trusted_proxies, vec!["192.168.0.0/16", "::1/128"]);
    }

    #[test]
    fn test_absent_flag_leaves_environment_alone() {
        let env = env_with(&[("BURNAFTERREAD_WEB__ANONYMIZE_IP", "true")]);
        let args = CliArgs::try_parse_from(["burnafterread", "--port", "7000"]).unwrap();
        let config = AppConfig::layered(env, &args).unwrap();

        assert_eq!(config.web.port, 7000);
        assert!(config.web.anonymize_ip);
    }
}
