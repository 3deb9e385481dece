//! Device configuration

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tuyalan_core::constants::{
    DEFAULT_ERROR_DATAPOINT, DEFAULT_MESSAGE_TTL, DEFAULT_PING_INTERVAL, DEFAULT_TIMEOUT,
};
use tuyalan_core::{Cipher, DEFAULT_PORT, ProtocolVersion};

use crate::error::{Error, Result};

/// Everything needed to talk to one device
///
/// The device id and local key come from the vendor cloud, the host from
/// discovery or a static lease. Durations (de)serialize as seconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tuyalan::DeviceConfig;
///
/// let config = DeviceConfig::new("bf1234567890abcdef", "192.168.1.50", "0123456789abcdef")
///     .with_timeout(Duration::from_secs(3));
///
/// assert_eq!(config.gateway_id(), "bf1234567890abcdef");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,

    /// Defaults to the device id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub local_key: String,

    #[serde(default, with = "version_string")]
    pub version: ProtocolVersion,

    /// Connect timeout and response timeout
    #[serde(default = "default_timeout", with = "secs")]
    pub timeout: Duration,

    #[serde(default = "default_ping_interval", with = "secs")]
    pub ping_interval: Duration,

    /// How long a queued message may wait before it is dropped unsent
    #[serde(default = "default_message_ttl", with = "secs")]
    pub message_ttl: Duration,

    /// Datapoint that receives the connection-failure marker
    #[serde(default = "default_error_datapoint")]
    pub error_datapoint: String,
}

impl DeviceConfig {
    pub fn new(
        device_id: impl Into<String>,
        host: impl Into<String>,
        local_key: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            gateway_id: None,
            host: host.into(),
            port: DEFAULT_PORT,
            local_key: local_key.into(),
            version: ProtocolVersion::default(),
            timeout: default_timeout(),
            ping_interval: default_ping_interval(),
            message_ttl: default_message_ttl(),
            error_datapoint: default_error_datapoint(),
        }
    }

    pub fn with_gateway_id(mut self, gateway_id: impl Into<String>) -> Self {
        self.gateway_id = Some(gateway_id.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_message_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = ttl;
        self
    }

    pub fn with_error_datapoint(mut self, code: impl Into<String>) -> Self {
        self.error_datapoint = code.into();
        self
    }

    pub fn gateway_id(&self) -> &str {
        self.gateway_id.as_deref().unwrap_or(&self.device_id)
    }

    /// Check the configuration without touching the network
    ///
    /// # Errors
    ///
    /// Returns a core `InvalidKey` error if the local key is not 16 bytes,
    /// `UnsupportedVersion` for versions outside 3.1 to 3.4, and
    /// [`Error::Config`] for empty identifiers or zero durations.
    pub fn validate(&self) -> Result<()> {
        self.cipher()?;

        if self.device_id.is_empty() {
            return Err(Error::Config("device id is empty".into()));
        }
        if self.host.is_empty() {
            return Err(Error::Config("host is empty".into()));
        }
        if self.error_datapoint.is_empty() {
            return Err(Error::Config("error datapoint is empty".into()));
        }

        for (name, value) in [
            ("timeout", self.timeout),
            ("ping interval", self.ping_interval),
            ("message ttl", self.message_ttl),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }

        Ok(())
    }

    pub(crate) fn cipher(&self) -> Result<Cipher> {
        Ok(Cipher::new(self.local_key.as_bytes(), self.version)?)
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("device_id", &self.device_id)
            .field("gateway_id", &self.gateway_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("local_key", &"<redacted>")
            .field("version", &self.version)
            .field("timeout", &self.timeout)
            .field("ping_interval", &self.ping_interval)
            .field("message_ttl", &self.message_ttl)
            .field("error_datapoint", &self.error_datapoint)
            .finish()
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT)
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(DEFAULT_PING_INTERVAL)
}

fn default_message_ttl() -> Duration {
    Duration::from_secs(DEFAULT_MESSAGE_TTL)
}

fn default_error_datapoint() -> String {
    DEFAULT_ERROR_DATAPOINT.to_string()
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod version_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use tuyalan_core::ProtocolVersion;

    pub fn serialize<S: Serializer>(value: &ProtocolVersion, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ProtocolVersion, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tuyalan_core::Error as CoreError;

    fn config() -> DeviceConfig {
        DeviceConfig::new("dev", "127.0.0.1", "0123456789abcdef")
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.port, 6668);
        assert_eq!(config.version, ProtocolVersion::V3_3);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.message_ttl, Duration::from_secs(5));
        assert_eq!(config.error_datapoint, "106");
        assert_eq!(config.gateway_id(), "dev");
    }

    #[test]
    fn test_gateway_override() {
        assert_eq!(config().with_gateway_id("gw").gateway_id(), "gw");
    }

    #[test]
    fn test_short_key_rejected() {
        let config = DeviceConfig::new("dev", "127.0.0.1", "0123456789abcde");
        assert!(matches!(
            config.validate(),
            Err(Error::Core(CoreError::InvalidKey { actual: 15 }))
        ));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let config = config().with_ping_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: DeviceConfig = serde_json::from_str(
            r#"{"device_id": "dev", "host": "10.0.0.2", "local_key": "0123456789abcdef", "version": "3.1", "timeout": 2.5}"#,
        )
        .unwrap();

        assert_eq!(config.version, ProtocolVersion::V3_1);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.port, 6668);
        assert_eq!(config.gateway_id, None);
    }

    #[test]
    fn test_deserialize_rejects_unknown_version() {
        let result = serde_json::from_str::<DeviceConfig>(
            r#"{"device_id": "dev", "host": "h", "local_key": "0123456789abcdef", "version": "3.5"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = config().with_gateway_id("gw").with_version(ProtocolVersion::V3_4);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DeviceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("0123456789abcdef"));
    }
}
