pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

pub fn status_topic(device_id: &str) -> String {
    format!("device/{device_id}/status")
}

pub fn command_topic(device_id: &str) -> String {
    format!("device/{device_id}/cmd")
}

/// MQTT client id; the prefix is part of the device's wire identity and must
/// not change across firmware versions.
pub fn client_id(device_id: &str) -> String {
    format!("ESP8266-{device_id}")
}
