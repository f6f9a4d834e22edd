use std::{future::Future, time::Duration};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use feeder_common::BrokerConfig;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registration request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registration endpoint returned HTTP {0}")]
    Status(StatusCode),

    #[error("registration response carries no broker host")]
    Incomplete,

    #[error("all {attempts} registration attempts failed; last error: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<RegistryError>,
    },
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    mac: &'a str,
    ip: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    config: RegisteredBroker,
}

#[derive(Debug, Deserialize)]
struct RegisteredBroker {
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_user: String,
    mqtt_pass: String,
}

impl From<RegisteredBroker> for BrokerConfig {
    fn from(broker: RegisteredBroker) -> Self {
        Self {
            host: broker.mqtt_host,
            port: broker.mqtt_port,
            username: broker.mqtt_user,
            password: broker.mqtt_pass,
        }
    }
}

/// Client for the device registration endpoint. One idempotent POST per
/// attempt; the caller owns the retry policy.
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RegistrationClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        // The registration endpoint serves a self-signed certificate.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    pub async fn fetch(&self, mac: &str, ip: &str) -> Result<BrokerConfig, RegistryError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&RegisterRequest { mac, ip })
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RegistryError::Status(status));
        }

        let body: RegisterResponse = response.json().await?;
        broker_from_response(body)
    }
}

fn broker_from_response(response: RegisterResponse) -> Result<BrokerConfig, RegistryError> {
    let broker = BrokerConfig::from(response.config);
    if !broker.is_configured() {
        return Err(RegistryError::Incomplete);
    }
    Ok(broker)
}

/// Bounded retry wrapper around a registration attempt. A fixed delay between
/// attempts; exhaustion is fatal to the caller (the device restarts rather
/// than run unconfigured).
pub async fn fetch_with_retries<F, Fut>(
    attempts: u32,
    retry_delay: Duration,
    mut fetch: F,
) -> Result<BrokerConfig, RegistryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<BrokerConfig, RegistryError>>,
{
    let mut last_err = None;

    for attempt in 1..=attempts {
        match fetch(attempt).await {
            Ok(broker) => return Ok(broker),
            Err(err) => {
                warn!("registration attempt {attempt}/{attempts} failed: {err}");
                last_err = Some(err);
            }
        }

        if attempt < attempts {
            tokio::time::sleep(retry_delay).await;
        }
    }

    Err(match last_err {
        Some(last) => RegistryError::Exhausted {
            attempts,
            last: Box::new(last),
        },
        None => RegistryError::Incomplete,
    })
}
