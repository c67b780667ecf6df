use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use serde_json::{json, Value};

use hvac_group_common::{
    member_command_topic, member_state_topic, CommandFailure, DeviceKind, MemberCommand,
    MemberRole,
};

/// Uniform command interface to one member device.
#[async_trait]
pub trait DeviceProxy: Send + Sync {
    fn member_id(&self) -> &str;

    /// Run as `role` aiming at `setpoint`.
    async fn activate(&self, role: MemberRole, setpoint: f32) -> Result<(), CommandFailure>;

    async fn deactivate(&self) -> Result<(), CommandFailure>;

    async fn set_idle_setpoint(&self, role: MemberRole, value: f32) -> Result<(), CommandFailure>;

    /// Start receiving state reports from the device.
    async fn subscribe(&self) -> Result<(), CommandFailure>;
}

pub async fn execute(proxy: &dyn DeviceProxy, command: MemberCommand) -> Result<(), CommandFailure> {
    match command {
        MemberCommand::Activate { role, setpoint } => proxy.activate(role, setpoint).await,
        MemberCommand::Deactivate => proxy.deactivate().await,
        MemberCommand::IdleSetpoint { role, setpoint } => {
            proxy.set_idle_setpoint(role, setpoint).await
        }
    }
}

/// What a member's state topic told us.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberReport {
    pub reported_on: Option<bool>,
    pub limits: Option<(f32, f32)>,
}

impl MemberReport {
    /// Switches publish `ON`/`OFF`; climate devices publish a JSON state with
    /// `hvac_mode` and optionally `min_temp`/`max_temp`. Anything else is
    /// treated as unavailable.
    pub fn parse(kind: DeviceKind, payload: &str) -> Self {
        match kind {
            DeviceKind::Switch => Self {
                reported_on: parse_switch_state(payload),
                limits: None,
            },
            DeviceKind::Climate => parse_climate_report(payload),
        }
    }
}

fn parse_switch_state(payload: &str) -> Option<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_climate_report(payload: &str) -> MemberReport {
    let unavailable = MemberReport {
        reported_on: None,
        limits: None,
    };
    let Ok(state) = serde_json::from_str::<Value>(payload) else {
        return unavailable;
    };

    let reported_on = match state.get("hvac_mode").and_then(Value::as_str) {
        Some("off") => Some(false),
        Some("heat" | "cool" | "heat_cool" | "auto" | "dry" | "fan_only") => Some(true),
        _ => None,
    };
    let number = |key: &str| state.get(key).and_then(Value::as_f64).map(|v| v as f32);
    let limits = number("min_temp").zip(number("max_temp"));

    MemberReport {
        reported_on,
        limits,
    }
}

/// Member device reached over MQTT. Switches get plain `ON`/`OFF`; climate
/// devices get a JSON body with `hvac_mode` and `temperature`.
pub struct MqttDeviceProxy {
    member_id: String,
    kind: DeviceKind,
    mqtt: AsyncClient,
}

fn role_mode(role: MemberRole) -> &'static str {
    match role {
        MemberRole::Heater => "heat",
        MemberRole::Cooler => "cool",
    }
}

impl MqttDeviceProxy {
    pub fn new(member_id: String, kind: DeviceKind, mqtt: AsyncClient) -> Self {
        Self {
            member_id,
            kind,
            mqtt,
        }
    }

    async fn send(&self, payload: String) -> Result<(), CommandFailure> {
        self.mqtt
            .publish(
                member_command_topic(&self.member_id),
                QoS::AtLeastOnce,
                false,
                payload,
            )
            .await
            .map_err(|_| CommandFailure::Unavailable)
    }
}

#[async_trait]
impl DeviceProxy for MqttDeviceProxy {
    fn member_id(&self) -> &str {
        &self.member_id
    }

    async fn activate(&self, role: MemberRole, setpoint: f32) -> Result<(), CommandFailure> {
        let payload = match self.kind {
            DeviceKind::Switch => "ON".to_string(),
            DeviceKind::Climate => {
                json!({ "hvac_mode": role_mode(role), "temperature": setpoint }).to_string()
            }
        };
        self.send(payload).await
    }

    async fn deactivate(&self) -> Result<(), CommandFailure> {
        let payload = match self.kind {
            DeviceKind::Switch => "OFF".to_string(),
            DeviceKind::Climate => json!({ "hvac_mode": "off" }).to_string(),
        };
        self.send(payload).await
    }

    async fn set_idle_setpoint(&self, role: MemberRole, value: f32) -> Result<(), CommandFailure> {
        match self.kind {
            DeviceKind::Switch => Err(CommandFailure::Rejected(
                "switches have no setpoint".to_string(),
            )),
            DeviceKind::Climate => {
                let payload =
                    json!({ "hvac_mode": role_mode(role), "temperature": value }).to_string();
                self.send(payload).await
            }
        }
    }

    async fn subscribe(&self) -> Result<(), CommandFailure> {
        self.mqtt
            .subscribe(member_state_topic(&self.member_id), QoS::AtLeastOnce)
            .await
            .map_err(|_| CommandFailure::Unavailable)
    }
}
