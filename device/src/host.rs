use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS, Transport};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use feeder_common::{
    command::{run_duration_ms, Command},
    config::{BrokerConfig, FeederConfig},
    feeder::{FeederEngine, PinCommand},
    heartbeat::HeartbeatSchedule,
    topics::{client_id, command_topic, status_topic, PAYLOAD_OFFLINE, PAYLOAD_ONLINE},
};

use crate::{
    registry::{self, RegistrationClient},
    update::{FirmwareUpdater, UpdateOutcome},
};

const REGISTER_ENDPOINT: &str = "https://sieuthitiendung.com/api/register";
const REGISTER_ATTEMPTS: u32 = 5;
const REGISTER_RETRY_DELAY_MS: u64 = 2_000;
const REGISTER_TIMEOUT_MS: u64 = 5_000;
const RECONNECT_DELAY_MS: u64 = 5_000;
const TICK_INTERVAL_MS: u64 = 100;
const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (device_id, local_ip) =
        provision_network().context("network provisioning failed; restart required")?;
    info!("device {device_id} up at {local_ip}");

    let endpoint =
        std::env::var("FEEDER_REGISTRY_URL").unwrap_or_else(|_| REGISTER_ENDPOINT.to_string());
    let registry_client =
        RegistrationClient::new(&endpoint, Duration::from_millis(REGISTER_TIMEOUT_MS))?;

    let broker = registry::fetch_with_retries(
        REGISTER_ATTEMPTS,
        Duration::from_millis(REGISTER_RETRY_DELAY_MS),
        |attempt| {
            info!("registration attempt {attempt}/{REGISTER_ATTEMPTS}");
            let client = registry_client.clone();
            let mac = device_id.clone();
            let ip = local_ip.clone();
            async move { client.fetch(&mac, &ip).await }
        },
    )
    .await
    .context("broker registration exhausted; restart required")?;

    info!(
        "broker configuration received: {}:{} as {}",
        broker.host, broker.port, broker.username
    );

    run_session(&device_id, broker).await
}

async fn run_session(device_id: &str, broker: BrokerConfig) -> anyhow::Result<()> {
    if !broker.is_configured() {
        // Boot must never hand an empty broker host to the session; an inert
        // device is indistinguishable from a dead one.
        return Err(anyhow!("broker host is empty; refusing to start inert"));
    }

    let status = status_topic(device_id);
    let cmd = command_topic(device_id);

    let mut options = MqttOptions::new(client_id(device_id), broker.host.clone(), broker.port);
    options.set_credentials(broker.username.clone(), broker.password.clone());
    options.set_last_will(LastWill::new(
        status.clone(),
        PAYLOAD_OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    if broker.port != 1883 {
        options.set_transport(Transport::tls_with_default_config());
    }

    let (mqtt, mut eventloop) = AsyncClient::new(options, 64);

    let feeder_config = FeederConfig::default();
    let mut heartbeat = HeartbeatSchedule::new(feeder_config.heartbeat_interval_ms);
    let mut engine = FeederEngine::new(feeder_config);
    let mut pin = FeederPin::default();
    let updater = FirmwareUpdater::from_env()?;

    let mut tick = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
    // After a stall (reconnect delay, firmware download) catch up with one
    // tick instead of a burst.
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("entering control loop");
    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("broker session established");
                    if let Err(err) = mqtt
                        .publish(status.as_str(), QoS::AtLeastOnce, true, PAYLOAD_ONLINE)
                        .await
                    {
                        warn!("online publish failed: {err}");
                    }
                    if let Err(err) = mqtt.subscribe(cmd.as_str(), QoS::AtMostOnce).await {
                        warn!("command subscribe failed: {err}");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(message))) if message.topic == cmd => {
                    if message.payload.len() > MAX_MQTT_PAYLOAD_BYTES {
                        warn!(
                            "dropping oversized command payload ({} bytes)",
                            message.payload.len()
                        );
                    } else {
                        handle_command(&message.payload, &mut engine, &mut pin, &updater).await;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    // The delay runs inline on the control task: feeding and
                    // heartbeats stall until the broker is reachable again,
                    // and rumqttc redials on the next poll.
                    warn!("broker session lost: {err}");
                    tokio::time::sleep(Duration::from_millis(RECONNECT_DELAY_MS)).await;
                }
            },
            _ = tick.tick() => {
                let now_ms = monotonic_ms();

                for action in engine.tick(now_ms) {
                    pin.apply(action);
                }

                if heartbeat.poll(now_ms) {
                    debug!("heartbeat");
                    if let Err(err) = mqtt
                        .publish(status.as_str(), QoS::AtMostOnce, false, PAYLOAD_ONLINE)
                        .await
                    {
                        warn!("heartbeat publish failed: {err}");
                    }
                }
            }
        }
    }
}

async fn handle_command(
    payload: &[u8],
    engine: &mut FeederEngine,
    pin: &mut FeederPin,
    updater: &FirmwareUpdater,
) {
    let command = match Command::parse(payload) {
        Ok(command) => command,
        Err(err) => {
            warn!("ignoring command: {err}");
            return;
        }
    };

    let now_ms = monotonic_ms();
    match command {
        Command::On { duration } => {
            if engine.start(run_duration_ms(duration), now_ms) {
                info!("feed cycle started ({duration}s)");
            } else {
                info!("feed cycle already running; ON ignored");
            }
        }
        Command::Off => {
            match engine.remaining_ms(now_ms) {
                Some(remaining) => info!("feed cycle stopped ({remaining}ms remaining)"),
                None => info!("feed cycle stopped"),
            }
            for action in engine.stop() {
                pin.apply(action);
            }
        }
        Command::Ota { url, sha256 } => {
            info!("starting firmware update from {url}");
            match updater.apply(&url, sha256.as_deref()).await {
                Ok(UpdateOutcome::Applied { bytes_written, .. }) => {
                    info!("firmware update applied ({bytes_written} bytes)");
                    restart("firmware update applied");
                }
                Ok(UpdateOutcome::NoUpdate) => info!("no firmware update available"),
                Err(err) => warn!("firmware update failed: {err}"),
            }
        }
    }
}

/// Logical stand-in for the feed-pump GPIO. Hardware integration point:
/// replace with a pin driver on the SoC target.
#[derive(Debug, Default)]
struct FeederPin {
    high: bool,
}

impl FeederPin {
    fn apply(&mut self, command: PinCommand) {
        let level = matches!(command, PinCommand::High);
        if level != self.high {
            info!("feed pin {}", if level { "HIGH" } else { "LOW" });
        }
        self.high = level;
    }

    #[cfg(test)]
    fn is_high(&self) -> bool {
        self.high
    }
}

fn provision_network() -> anyhow::Result<(String, String)> {
    let mac = mac_address::get_mac_address()
        .context("failed to query interface MAC address")?
        .ok_or_else(|| anyhow!("no network interface with a MAC address"))?
        .to_string();
    let ip = local_ipv4().context("failed to determine local IPv4 address")?;
    Ok((mac, ip))
}

fn local_ipv4() -> anyhow::Result<String> {
    // No packets are sent; the OS just resolves the egress interface.
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:53")?;
    Ok(socket.local_addr()?.ip().to_string())
}

fn restart(reason: &str) -> ! {
    // Hardware builds reboot the SoC here; under a process supervisor we
    // exit and get relaunched.
    info!("restarting: {reason}");
    std::process::exit(0)
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
