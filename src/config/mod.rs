//! Configuration management

use crate::crypto::{CipherEngine, DhParams};
use crate::proxy::{BackendSettings, FrontendSettings};
use crate::transport::{host_port, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frontend proxy configuration
    pub frontend: Option<FrontendConfig>,
    /// Backend proxy configuration
    pub backend: Option<BackendConfig>,
    /// Socket deadlines
    pub timeouts: TimeoutConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| crate::Error::Config(format!("Failed to write config: {}", e)))
    }
}

/// Build the cipher engine from a transform name and optional hex IV
fn cipher_engine(transform: &str, iv: Option<&str>) -> Result<CipherEngine, crate::Error> {
    let iv = iv
        .map(hex::decode)
        .transpose()
        .map_err(|e| crate::Error::Config(format!("Invalid IV: {}", e)))?;
    Ok(CipherEngine::from_transform(transform, iv.as_deref())?)
}

/// Frontend (browser-side) proxy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Listen address for browser connections
    pub listen: String,
    /// Paired backend host; requests with this `Host` are tunneled
    pub backend_host: String,
    /// Backend proxy port
    pub backend_port: u16,
    /// Backend handshake port
    pub handshake_port: u16,
    /// Address to dial for the backend, when it differs from `backend_host`
    pub tunnel_addr: Option<String>,
    /// Port used for pass-through requests
    pub direct_port: u16,
    /// Cipher transform, e.g. `AES/ECB/PKCS5Padding`
    pub transform: String,
    /// IV for chained modes (hex)
    pub iv: Option<String>,
    /// DH prime (hex) replacing the built-in 2048-bit group
    pub dh_prime: Option<String>,
    /// DH generator used with `dh_prime`
    pub dh_generator: u32,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            listen: format!("127.0.0.1:{}", crate::DEFAULT_FRONTEND_PORT),
            backend_host: "localhost".to_string(),
            backend_port: crate::DEFAULT_BACKEND_PORT,
            handshake_port: crate::DEFAULT_BACKEND_PORT,
            tunnel_addr: None,
            direct_port: crate::HTTP_PORT,
            transform: "AES/ECB/PKCS5Padding".to_string(),
            iv: None,
            dh_prime: None,
            dh_generator: 2,
        }
    }
}

impl FrontendConfig {
    fn dial_host(&self) -> &str {
        self.tunnel_addr.as_deref().unwrap_or(&self.backend_host)
    }

    /// Backend proxy address
    pub fn tunnel_endpoint(&self) -> String {
        host_port(self.dial_host(), self.backend_port)
    }

    /// Backend handshake address
    pub fn handshake_endpoint(&self) -> String {
        host_port(self.dial_host(), self.handshake_port)
    }

    pub fn cipher_engine(&self) -> Result<CipherEngine, crate::Error> {
        cipher_engine(&self.transform, self.iv.as_deref())
    }

    /// DH parameters offered in the handshake
    pub fn dh_params(&self) -> Result<DhParams, crate::Error> {
        match &self.dh_prime {
            Some(prime) => Ok(DhParams::from_hex(prime, self.dh_generator)?),
            None => Ok(DhParams::modp2048()),
        }
    }

    /// Handler settings for the accept loop
    pub fn settings(&self, transport: TransportConfig) -> FrontendSettings {
        FrontendSettings {
            paired_host: self.backend_host.clone(),
            tunnel_addr: self.tunnel_endpoint(),
            direct_port: self.direct_port,
            transport,
        }
    }
}

/// Backend (origin-side) proxy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Listen address for the one-time handshake
    pub handshake_listen: String,
    /// Listen address for tunnel connections
    pub listen: String,
    /// Origin server that requests are forwarded to
    pub origin: String,
    /// Cipher transform; must match the frontend
    pub transform: String,
    /// IV for chained modes (hex)
    pub iv: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            handshake_listen: format!("0.0.0.0:{}", crate::DEFAULT_BACKEND_PORT),
            listen: format!("0.0.0.0:{}", crate::DEFAULT_BACKEND_PORT),
            origin: format!("127.0.0.1:{}", crate::HTTP_PORT),
            transform: "AES/ECB/PKCS5Padding".to_string(),
            iv: None,
        }
    }
}

impl BackendConfig {
    pub fn cipher_engine(&self) -> Result<CipherEngine, crate::Error> {
        cipher_engine(&self.transform, self.iv.as_deref())
    }

    /// Handler settings for the accept loop
    pub fn settings(&self, transport: TransportConfig) -> BackendSettings {
        BackendSettings {
            origin: self.origin.clone(),
            transport,
        }
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    /// Bound on each read or write step
    pub io_secs: u64,
    pub handshake_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            io_secs: 60,
            handshake_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.connect_secs,
            io_timeout: self.io_secs,
        }
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: String,
    /// Log file path (optional)
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber
    ///
    /// Level precedence: `level_override`, then `RUST_LOG`, then `level`.
    pub fn init(&self, level_override: Option<&str>) -> Result<(), crate::Error> {
        let filter = match level_override {
            Some(level) => EnvFilter::try_new(level),
            None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&self.level)),
        }
        .map_err(|e| crate::Error::Config(format!("Invalid log level: {}", e)))?;

        let writer = match &self.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| crate::Error::Config(format!("Failed to open log file: {}", e)))?;
                BoxMakeWriter::new(Mutex::new(file))
            }
            None => BoxMakeWriter::new(std::io::stdout),
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(self.file.is_none());

        let result = match self.format.as_str() {
            "json" => builder.json().try_init(),
            "compact" => builder.compact().try_init(),
            "pretty" => builder.try_init(),
            other => {
                return Err(crate::Error::Config(format!("Unknown log format: {}", other)));
            }
        };
        result.map_err(|e| crate::Error::Config(format!("Failed to initialise logging: {}", e)))
    }
}

/// Generate example configuration
pub fn generate_example_config() -> Config {
    Config {
        frontend: Some(FrontendConfig::default()),
        backend: Some(BackendConfig::default()),
        timeouts: TimeoutConfig::default(),
        logging: LoggingConfig::default(),
    }
}
