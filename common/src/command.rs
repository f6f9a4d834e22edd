use serde::Deserialize;
use thiserror::Error;

/// Inbound command, decoded in full before any field is acted on. Payloads
/// that fail to decode (missing `action`, unknown action, wrong field types)
/// never reach the control loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action")]
pub enum Command {
    #[serde(rename = "ON")]
    On { duration: i64 },
    #[serde(rename = "OFF")]
    Off,
    #[serde(rename = "OTA")]
    Ota {
        url: String,
        #[serde(default)]
        sha256: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed command payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Command {
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Maps the wire `duration` (seconds) to a cycle length. A duration of zero or
/// less means "run until explicitly turned off".
pub fn run_duration_ms(duration_s: i64) -> Option<u64> {
    if duration_s <= 0 {
        None
    } else {
        Some((duration_s as u64).saturating_mul(1_000))
    }
}
