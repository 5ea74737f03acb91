//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub redfish: RedfishConfig,
    #[serde(default)]
    pub certificates: CertificatesConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// TLS/HTTPS configuration (if not set, server runs HTTP)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to TLS certificate file (PEM format)
    pub cert_file: PathBuf,
    /// Path to TLS private key file (PEM format)
    pub key_file: PathBuf,
    /// Minimum TLS version (1.2 or 1.3, defaults to 1.3)
    #[serde(default = "default_min_tls_version")]
    pub min_version: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8443
}

fn default_min_tls_version() -> String {
    "1.3".to_string()
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry")]
    pub token_expiry_hours: u64,
}

fn default_token_expiry() -> u64 {
    24
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Log output target (console or file)
    #[serde(default = "default_log_target")]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix (default: "certgate")
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Enable daily log rotation
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to console (stdout/stderr) - default for development
    #[default]
    Console,
    /// Log to file with optional rotation - recommended for production
    File,
    /// Log to both console and file
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_target() -> LogTarget {
    LogTarget::Console
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/certgate")
}

fn default_log_prefix() -> String {
    "certgate".to_string()
}

fn default_log_rotation() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: default_log_target(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

/// Resource tree settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedfishConfig {
    /// Manager id used in `/redfish/v1/Managers/{id}` URIs
    #[serde(default = "default_manager_id")]
    pub manager_id: String,
}

fn default_manager_id() -> String {
    "bmc".to_string()
}

impl Default for RedfishConfig {
    fn default() -> Self {
        Self {
            manager_id: default_manager_id(),
        }
    }
}

/// Certificate handling settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CertificatesConfig {
    /// Parent directory for staged certificate files
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// How long a CSR session waits for the generated CSR
    #[serde(default = "default_csr_timeout")]
    pub csr_timeout_secs: u64,
    #[serde(default = "default_allowed_certificate_types")]
    pub allowed_certificate_types: Vec<String>,
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_csr_timeout() -> u64 {
    10
}

fn default_allowed_certificate_types() -> Vec<String> {
    vec!["PEM".to_string()]
}

impl Default for CertificatesConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            csr_timeout_secs: default_csr_timeout(),
            allowed_certificate_types: default_allowed_certificate_types(),
        }
    }
}

impl CertificatesConfig {
    pub fn csr_timeout(&self) -> Duration {
        Duration::from_secs(self.csr_timeout_secs)
    }
}

/// Bus backend selection
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-process certificate manager emulation
    #[default]
    Memory,
}

/// Bus connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,
    /// Delay before the memory backend announces a generated CSR.
    /// `null` disables the announcement entirely.
    #[serde(default = "default_csr_delay")]
    pub csr_delay_ms: Option<u64>,
}

fn default_csr_delay() -> Option<u64> {
    Some(500)
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            csr_delay_ms: default_csr_delay(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                tls: None,
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production-minimum-32-characters-long".to_string(),
                token_expiry_hours: default_token_expiry(),
            },
            logging: LoggingConfig::default(),
            redfish: RedfishConfig::default(),
            certificates: CertificatesConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables (prefixed with CERTGATE_)
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        // Check for config path override from environment
        let config_path = std::env::var("CERTGATE_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                Self::from_file(path)?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Parse one YAML configuration file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            // Current directory
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            // System config directory
            PathBuf::from("/etc/certgate/config.yaml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("certgate/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(host) = std::env::var("CERTGATE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CERTGATE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        // Auth overrides
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CERTGATE_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }

        // Resource tree overrides
        if let Ok(manager_id) = std::env::var("CERTGATE_MANAGER_ID") {
            self.redfish.manager_id = manager_id;
        }

        // Certificate overrides
        if let Ok(dir) = std::env::var("CERTGATE_STAGING_DIR") {
            self.certificates.staging_dir = PathBuf::from(dir);
        }
        if let Ok(timeout) = std::env::var("CERTGATE_CSR_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.certificates.csr_timeout_secs = secs;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Validate JWT secret length
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 characters long");
        }

        // Validate port
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        // Validate TLS configuration if present
        if let Some(ref tls) = self.server.tls {
            if !tls.cert_file.exists() {
                anyhow::bail!("TLS certificate file not found: {:?}", tls.cert_file);
            }
            if !tls.key_file.exists() {
                anyhow::bail!("TLS key file not found: {:?}", tls.key_file);
            }
            if tls.min_version != "1.2" && tls.min_version != "1.3" {
                anyhow::bail!(
                    "Invalid TLS minimum version: {}. Must be '1.2' or '1.3'",
                    tls.min_version
                );
            }
        }

        if !crate::utils::validation::validate_manager_id(&self.redfish.manager_id) {
            anyhow::bail!("Invalid manager id: {:?}", self.redfish.manager_id);
        }

        if self.certificates.csr_timeout_secs == 0 {
            anyhow::bail!("CSR timeout must be at least 1 second");
        }

        // The certificate managers accept a single encoding
        if self.certificates.allowed_certificate_types.len() != 1 {
            anyhow::bail!(
                "Exactly one certificate type must be allowed, got {:?}",
                self.certificates.allowed_certificate_types
            );
        }

        Ok(())
    }

    /// Create a default configuration file
    pub fn create_default_config(path: &PathBuf) -> Result<()> {
        let config = AppConfig::default();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_norway::to_string(&config)?;
        std::fs::write(path, yaml)?;

        Ok(())
    }
}
