//! Event broadcast configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which pub/sub transport carries lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastTransport {
    /// MQTT broker (QoS 1, retained messages, Last Will).
    Mqtt,
    /// Redis `PUBLISH`, retained values kept as plain keys.
    Redis,
    /// In-process fan-out.
    Memory,
    /// Broadcasting disabled.
    None,
}

impl BroadcastTransport {
    /// Return the transport as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mqtt => "mqtt",
            Self::Redis => "redis",
            Self::Memory => "memory",
            Self::None => "none",
        }
    }
}

impl fmt::Display for BroadcastTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BroadcastTransport {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mqtt" => Ok(Self::Mqtt),
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            "none" | "noop" | "disabled" => Ok(Self::None),
            other => Err(AppError::configuration(format!(
                "Unknown broadcast transport: {other}"
            ))),
        }
    }
}

/// Event broadcast configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Transport selection.
    #[serde(default = "default_transport")]
    pub transport: BroadcastTransport,
    /// Broker host name.
    #[serde(default = "default_host")]
    pub host: String,
    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Topic that lifecycle events are published to.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Topic prefix for retained worker capability advertisements.
    #[serde(default = "default_capability_prefix")]
    pub capability_prefix: String,
    /// MQTT client id; a random one is generated when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    /// MQTT keep-alive in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
    /// How long `connect` waits for the broker, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Upper bound on a single publish, in milliseconds.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,
    /// Redis URL override; derived from host/port when absent.
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl BroadcastConfig {
    /// A configuration with broadcasting disabled.
    pub fn disabled() -> Self {
        Self {
            transport: BroadcastTransport::None,
            ..Self::default()
        }
    }

    /// A configuration for the in-process transport.
    pub fn memory() -> Self {
        Self {
            transport: BroadcastTransport::Memory,
            ..Self::default()
        }
    }

    /// The identity that decides whether a live backend can be reused.
    pub fn identity(&self) -> (BroadcastTransport, &str, u16) {
        (self.transport, self.host.as_str(), self.port)
    }

    /// Redis URL for the Redis transport.
    pub fn redis_url(&self) -> String {
        self.redis_url
            .clone()
            .unwrap_or_else(|| format!("redis://{}:{}", self.host, self.port))
    }

    /// Reject settings that can never connect.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.transport == BroadcastTransport::Mqtt && self.host.trim().is_empty() {
            return Err(AppError::configuration("broadcast.host must be set for mqtt"));
        }
        if self.topic.trim().is_empty() {
            return Err(AppError::configuration("broadcast.topic must be set"));
        }
        Ok(())
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            host: default_host(),
            port: default_port(),
            topic: default_topic(),
            capability_prefix: default_capability_prefix(),
            client_id: None,
            keep_alive_seconds: default_keep_alive(),
            connect_timeout_ms: default_connect_timeout(),
            publish_timeout_ms: default_publish_timeout(),
            redis_url: None,
        }
    }
}

fn default_transport() -> BroadcastTransport {
    BroadcastTransport::Mqtt
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "inference/events".to_string()
}

fn default_capability_prefix() -> String {
    "inference/workers".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_publish_timeout() -> u64 {
    2_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_from_str() {
        assert_eq!("MQTT".parse::<BroadcastTransport>().unwrap(), BroadcastTransport::Mqtt);
        assert_eq!("noop".parse::<BroadcastTransport>().unwrap(), BroadcastTransport::None);
        assert!("kafka".parse::<BroadcastTransport>().is_err());
    }

    #[test]
    fn test_identity_ignores_topic() {
        let a = BroadcastConfig::default();
        let b = BroadcastConfig {
            topic: "other/events".to_string(),
            ..BroadcastConfig::default()
        };
        assert_eq!(a.identity(), b.identity());

        let c = BroadcastConfig {
            port: 1884,
            ..BroadcastConfig::default()
        };
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn test_redis_url_derived_from_host() {
        let config = BroadcastConfig {
            transport: BroadcastTransport::Redis,
            host: "cache".to_string(),
            port: 6379,
            ..BroadcastConfig::default()
        };
        assert_eq!(config.redis_url(), "redis://cache:6379");
    }
}
