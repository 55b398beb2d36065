//! Service configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gwlive_core::mqtt::parse_broker_url;
use gwlive_core::reconnect::DEFAULT_TOPIC;
use gwlive_core::{
    Catalog, ClassificationMode, ConnectionOptions, Endpoint, QoS, ReconnectOptions,
    SensorMetadata,
};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Relay connection settings.
    pub connection: ConnectionConfig,
    /// Credentials used when the session is opened automatically.
    pub credentials: CredentialsConfig,
    /// Classification settings.
    pub analytics: AnalyticsConfig,
    /// Sensor metadata catalog.
    #[serde(default)]
    pub sensors: Vec<SensorMetadata>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every error found.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Relay URLs use `mqtt://` or `mqtts://`
    /// - Topic, QoS, timeouts and buffers are usable
    /// - Sensor scales and alarm thresholds are ordered
    /// - No duplicate sensor ids
    ///
    /// # Example
    ///
    /// ```
    /// use gwlive_service::Config;
    ///
    /// let config = Config::default();
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.connection.validate());

        let mut seen = HashSet::new();
        for (i, sensor) in self.sensors.iter().enumerate() {
            let prefix = format!("sensors[{}]", i);
            errors.extend(validate_sensor(sensor, &prefix));

            if !seen.insert(sensor.sensor_id.as_str()) {
                errors.push(ValidationError {
                    field: format!("{}.sensor_id", prefix),
                    message: format!("duplicate sensor id '{}'", sensor.sensor_id),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the sensor catalog.
    pub fn catalog(&self) -> Catalog {
        self.sensors.iter().cloned().collect()
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
    /// Capacity of the WebSocket fan-out buffer.
    pub broadcast_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            broadcast_buffer: 100,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                }),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError {
                        field: "server.bind".to_string(),
                        message: "port cannot be 0".to_string(),
                    }),
                    Err(_) => errors.push(ValidationError {
                        field: "server.bind".to_string(),
                        message: format!("invalid port '{}': must be a number 1-65535", port),
                    }),
                    Ok(_) => {}
                },
            }
        }

        if self.broadcast_buffer == 0 {
            errors.push(ValidationError {
                field: "server.broadcast_buffer".to_string(),
                message: "broadcast buffer must be at least 1".to_string(),
            });
        }

        errors
    }
}

/// Relay connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Tenant-scoped relay URL, tried first.
    pub primary_url: String,
    /// Unscoped relay URL, tried once when the primary handshake fails.
    pub fallback_url: Option<String>,
    /// Subscription topic filter.
    pub topic: String,
    /// Subscription QoS (0-2).
    pub qos: u8,
    /// MQTT client id prefix.
    pub client_id: String,
    /// MQTT keep-alive in seconds.
    pub keep_alive_secs: u64,
    /// Handshake timeout in seconds.
    pub handshake_timeout_secs: u64,
    /// Reconnection attempts after an unexpected disconnect.
    pub reconnect_attempts: u32,
    /// Delay between reconnection attempts in seconds.
    pub reconnect_delay_secs: u64,
    /// Capacity of the inbound message queue.
    pub inbound_buffer: usize,
    /// Open the session at startup when credentials are available.
    pub auto_open: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            primary_url: "mqtt://localhost:1883".to_string(),
            fallback_url: None,
            topic: DEFAULT_TOPIC.to_string(),
            qos: 1,
            client_id: "gwlive".to_string(),
            keep_alive_secs: 30,
            handshake_timeout_secs: 10,
            reconnect_attempts: 3,
            reconnect_delay_secs: 2,
            inbound_buffer: 256,
            auto_open: true,
        }
    }
}

impl ConnectionConfig {
    /// Validate connection configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = parse_broker_url(&self.primary_url) {
            errors.push(ValidationError {
                field: "connection.primary_url".to_string(),
                message: e,
            });
        }
        if let Some(url) = &self.fallback_url
            && let Err(e) = parse_broker_url(url)
        {
            errors.push(ValidationError {
                field: "connection.fallback_url".to_string(),
                message: e,
            });
        }
        if self.topic.trim().is_empty() {
            errors.push(ValidationError {
                field: "connection.topic".to_string(),
                message: "topic cannot be empty".to_string(),
            });
        }
        if self.qos > 2 {
            errors.push(ValidationError {
                field: "connection.qos".to_string(),
                message: format!("qos {} is invalid (must be 0, 1 or 2)", self.qos),
            });
        }
        if self.client_id.is_empty() {
            errors.push(ValidationError {
                field: "connection.client_id".to_string(),
                message: "client id cannot be empty".to_string(),
            });
        }
        for (field, value) in [
            ("keep_alive_secs", self.keep_alive_secs),
            ("handshake_timeout_secs", self.handshake_timeout_secs),
            ("reconnect_delay_secs", self.reconnect_delay_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError {
                    field: format!("connection.{}", field),
                    message: "must be greater than 0".to_string(),
                });
            }
        }
        if self.inbound_buffer == 0 {
            errors.push(ValidationError {
                field: "connection.inbound_buffer".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        errors
    }

    /// Core connection options for these settings.
    pub fn to_options(&self) -> ConnectionOptions {
        let reconnect =
            ReconnectOptions::fixed_delay(Duration::from_secs(self.reconnect_delay_secs))
                .max_attempts(self.reconnect_attempts);

        ConnectionOptions::new(
            Endpoint::primary(self.primary_url.clone()),
            self.fallback_url.clone().map(Endpoint::fallback),
        )
        .subscription(self.topic.clone(), QoS::from_level(self.qos))
        .handshake_timeout(Duration::from_secs(self.handshake_timeout_secs))
        .inbound_buffer(self.inbound_buffer)
        .reconnect(reconnect)
    }

    /// MQTT keep-alive.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Credentials for the live relay.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Bearer token.
    pub token: Option<String>,
    /// Tenant identifier.
    pub tenant_id: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl CredentialsConfig {
    /// Token and tenant, when both are set and non-empty.
    pub fn pair(&self) -> Option<(&str, &str)> {
        let token = self.token.as_deref().filter(|t| !t.trim().is_empty())?;
        let tenant = self.tenant_id.as_deref().filter(|t| !t.trim().is_empty())?;
        Some((token, tenant))
    }
}

/// Classification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Classify unrecognised status codes without thresholds as warnings.
    pub strict: bool,
}

impl AnalyticsConfig {
    /// Classification mode for these settings.
    pub fn mode(&self) -> ClassificationMode {
        if self.strict {
            ClassificationMode::Strict
        } else {
            ClassificationMode::Permissive
        }
    }
}

fn validate_sensor(sensor: &SensorMetadata, prefix: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if sensor.sensor_id.trim().is_empty() {
        errors.push(ValidationError {
            field: format!("{}.sensor_id", prefix),
            message: "sensor id cannot be empty".to_string(),
        });
    }
    if !(sensor.min_scale.is_finite() && sensor.max_scale.is_finite())
        || sensor.min_scale >= sensor.max_scale
    {
        errors.push(ValidationError {
            field: format!("{}.max_scale", prefix),
            message: format!(
                "scale [{}, {}] is invalid: min_scale must be below max_scale",
                sensor.min_scale, sensor.max_scale
            ),
        });
    }
    if let (Some(lo), Some(hi)) = (sensor.min_alarm, sensor.max_alarm)
        && lo > hi
    {
        errors.push(ValidationError {
            field: format!("{}.max_alarm", prefix),
            message: format!("min_alarm {} is above max_alarm {}", lo, hi),
        });
    }
    if let Some(unit) = &sensor.unit
        && unit.is_empty()
    {
        errors.push(ValidationError {
            field: format!("{}.unit", prefix),
            message: "unit cannot be empty string (omit instead)".to_string(),
        });
    }

    errors
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `sensors[0].max_scale`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gwlive")
        .join("service.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwlive_core::{Channel, SensorType};

    fn sensor(id: &str) -> SensorMetadata {
        SensorMetadata::new(id, id, SensorType::Analog, 0.0, 10.0)
    }

    fn validation_errors(config: &Config) -> Vec<ValidationError> {
        match config.validate() {
            Err(ConfigError::Validation(errors)) => errors,
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.server.broadcast_buffer, 100);
        assert_eq!(config.connection.topic, "gw/+/#");
        assert_eq!(config.connection.reconnect_attempts, 3);
        assert!(config.sensors.is_empty());
        assert!(!config.analytics.strict);
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:9000"

            [connection]
            primary_url = "mqtts://relay.example.com"
            fallback_url = "mqtts://relay-fallback.example.com:8884"
            qos = 0

            [credentials]
            token = "abc"
            tenant_id = "tenantA"

            [analytics]
            strict = true

            [[sensors]]
            sensor_id = "s1"
            name = "Boiler pressure"
            kind = "analog"
            min_scale = 0.0
            max_scale = 16.0
            min_alarm = 2.0
            max_alarm = 12.0
            unit = "bar"

            [[sensors]]
            sensor_id = "s2"
            name = "Door"
            kind = "digital"
            min_scale = 0.0
            max_scale = 1.0
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.broadcast_buffer, 100);
        assert_eq!(config.credentials.pair(), Some(("abc", "tenantA")));
        assert_eq!(config.analytics.mode(), ClassificationMode::Strict);

        let catalog = config.catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("s1").unwrap().unit_symbol(), "bar");
        assert_eq!(catalog.get("s2").unwrap().kind, SensorType::Digital);
        assert_eq!(catalog.get("s2").unwrap().alarm_range(), None);
    }

    #[test]
    fn test_to_options() {
        let config = ConnectionConfig {
            fallback_url: Some("mqtt://fallback".to_string()),
            qos: 2,
            reconnect_attempts: 5,
            reconnect_delay_secs: 4,
            ..ConnectionConfig::default()
        };
        let options = config.to_options();
        assert!(options.validate().is_ok());
        assert_eq!(options.primary.channel, Channel::Primary);
        assert_eq!(options.fallback.unwrap().channel, Channel::Fallback);
        assert_eq!(options.subscription.qos, QoS::ExactlyOnce);
        assert_eq!(options.handshake_timeout, Duration::from_secs(10));
        assert_eq!(options.reconnect.max_attempts, 5);
        assert_eq!(options.reconnect.delay, Duration::from_secs(4));
    }

    #[test]
    fn test_credentials_pair() {
        let mut creds = CredentialsConfig::default();
        assert_eq!(creds.pair(), None);
        creds.token = Some("tok".to_string());
        creds.tenant_id = Some(" ".to_string());
        assert_eq!(creds.pair(), None);
        creds.tenant_id = Some("tenantA".to_string());
        assert_eq!(creds.pair(), Some(("tok", "tenantA")));
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let creds = CredentialsConfig {
            token: Some("super-secret".to_string()),
            tenant_id: Some("tenantA".to_string()),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("tenantA"));
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("service.toml");

        let config = Config {
            sensors: vec![sensor("s1").with_alarms(1.0, 9.0).with_unit("°C")],
            ..Config::default()
        };
        config.save(&config_path).unwrap();

        let loaded = Config::load_validated(&config_path).unwrap();
        assert_eq!(loaded.sensors, config.sensors);
        assert_eq!(loaded.connection.primary_url, "mqtt://localhost:1883");
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/service.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("gwlive/service.toml"));
    }

    // --- Validation tests ---

    #[test]
    fn test_server_bind_validation() {
        let server = |bind: &str| ServerConfig {
            bind: bind.to_string(),
            ..ServerConfig::default()
        };
        assert!(server("[::1]:8080").validate().is_empty());
        assert!(server("localhost:8080").validate().is_empty());
        assert!(server("")
            .validate()
            .iter()
            .any(|e| e.message.contains("cannot be empty")));
        assert!(server("127.0.0.1")
            .validate()
            .iter()
            .any(|e| e.message.contains("host:port")));
        assert!(server("127.0.0.1:0")
            .validate()
            .iter()
            .any(|e| e.message.contains("cannot be 0")));
        assert!(server("127.0.0.1:abc")
            .validate()
            .iter()
            .any(|e| e.message.contains("must be a number")));
    }

    #[test]
    fn test_connection_validation() {
        let config = ConnectionConfig {
            primary_url: "http://relay".to_string(),
            fallback_url: Some("mqtt://:1883".to_string()),
            topic: " ".to_string(),
            qos: 3,
            handshake_timeout_secs: 0,
            inbound_buffer: 0,
            ..ConnectionConfig::default()
        };
        let fields: Vec<String> = config.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "connection.primary_url",
                "connection.fallback_url",
                "connection.topic",
                "connection.qos",
                "connection.handshake_timeout_secs",
                "connection.inbound_buffer",
            ]
        );
    }

    #[test]
    fn test_sensor_validation() {
        let mut bad_scale = sensor("s1");
        bad_scale.min_scale = 10.0;
        let mut bad_alarms = sensor("s2").with_alarms(8.0, 2.0);
        bad_alarms.unit = Some(String::new());

        let config = Config {
            sensors: vec![bad_scale, bad_alarms, sensor("s1")],
            ..Config::default()
        };
        let errors = validation_errors(&config);
        assert!(errors.iter().any(|e| e.field == "sensors[0].max_scale"));
        assert!(errors.iter().any(|e| e.field == "sensors[1].max_alarm"));
        assert!(errors.iter().any(|e| e.field == "sensors[1].unit"));
        assert!(
            errors
                .iter()
                .any(|e| e.field == "sensors[2].sensor_id" && e.message.contains("duplicate"))
        );
    }

    #[test]
    fn test_config_validation_error_display() {
        let error = ConfigError::Validation(vec![
            ValidationError {
                field: "server.bind".to_string(),
                message: "port cannot be 0".to_string(),
            },
            ValidationError {
                field: "sensors[0].sensor_id".to_string(),
                message: "sensor id cannot be empty".to_string(),
            },
        ]);
        let display = error.to_string();
        assert!(display.contains("server.bind: port cannot be 0"));
        assert!(display.contains("sensors[0].sensor_id"));
    }
}
