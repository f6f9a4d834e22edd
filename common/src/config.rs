use serde::{Deserialize, Serialize};

/// Broker connection parameters handed out by the registration endpoint.
///
/// Populated once at boot and never mutated afterwards. An empty `host` is the
/// "not configured" sentinel; a device must never enter its control loop in
/// that state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8883,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl BrokerConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeederConfig {
    pub pulse_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            pulse_interval_ms: 1_000,
            heartbeat_interval_ms: 120_000,
        }
    }
}
