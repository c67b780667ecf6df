use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{CommandFailure, GroupError};

/// User-selected operating mode of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupMode {
    Off,
    Heat,
    Cool,
    HeatCool,
}

impl GroupMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::HeatCool => "HEAT_COOL",
        }
    }

    /// Whether this mode lets members of `role` be activated.
    pub fn permits(self, role: MemberRole) -> bool {
        matches!(
            (self, role),
            (Self::Heat | Self::HeatCool, MemberRole::Heater)
                | (Self::Cool | Self::HeatCool, MemberRole::Cooler)
        )
    }

    /// Roles that must have at least one member for this mode to be selectable.
    pub fn required_roles(self) -> &'static [MemberRole] {
        match self {
            Self::Off => &[],
            Self::Heat => &[MemberRole::Heater],
            Self::Cool => &[MemberRole::Cooler],
            Self::HeatCool => &[MemberRole::Heater, MemberRole::Cooler],
        }
    }
}

impl fmt::Display for GroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupMode {
    type Err = GroupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "OFF" => Ok(Self::Off),
            "HEAT" => Ok(Self::Heat),
            "COOL" => Ok(Self::Cool),
            "HEAT_COOL" | "AUTO" => Ok(Self::HeatCool),
            _ => Err(GroupError::Validation(format!("unknown mode '{value}'"))),
        }
    }
}

/// What the group is presently doing. Derived, never set by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupAction {
    Off,
    Idle,
    Heating,
    Cooling,
}

impl GroupAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Idle => "IDLE",
            Self::Heating => "HEATING",
            Self::Cooling => "COOLING",
        }
    }

    /// The role this action drives, if any.
    pub fn active_role(self) -> Option<MemberRole> {
        match self {
            Self::Heating => Some(MemberRole::Heater),
            Self::Cooling => Some(MemberRole::Cooler),
            Self::Off | Self::Idle => None,
        }
    }
}

impl fmt::Display for GroupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Heater,
    Cooler,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heater => "heater",
            Self::Cooler => "cooler",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a member device is driven. Switches only understand on/off; climate
/// devices carry their own thermostat and accept a mode plus setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Switch,
    #[default]
    Climate,
}

/// Where the ambient temperature comes from: a plain sensor state, or the
/// `current_temperature` attribute of another climate device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Sensor,
    Climate,
}

/// A single intent sent to one member. `role` tells a member that both heats
/// and cools which way to run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemberCommand {
    Activate { role: MemberRole, setpoint: f32 },
    Deactivate,
    IdleSetpoint { role: MemberRole, setpoint: f32 },
}

impl MemberCommand {
    pub fn is_on(self) -> bool {
        matches!(self, Self::Activate { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCommand {
    pub member_id: String,
    pub command: MemberCommand,
}

/// Public snapshot of the group, as served to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupState {
    pub name: String,
    pub mode: GroupMode,
    pub action: GroupAction,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: f32,
    #[serde(rename = "currentTemperature")]
    pub current_temperature: Option<f32>,
    pub tolerance: f32,
    #[serde(rename = "minTemp")]
    pub min_temp: f32,
    #[serde(rename = "maxTemp")]
    pub max_temp: f32,
    #[serde(rename = "sensorStale")]
    pub sensor_stale: bool,
    #[serde(rename = "supportedModes")]
    pub supported_modes: Vec<GroupMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberStatus {
    pub id: String,
    pub roles: Vec<MemberRole>,
    pub kind: DeviceKind,
    #[serde(rename = "toggleOnIdle")]
    pub toggle_on_idle: bool,
    pub hidden: bool,
    #[serde(rename = "lastCommand")]
    pub last_command: Option<MemberCommand>,
    #[serde(rename = "lastCommandedOn")]
    pub last_commanded_on: Option<bool>,
    #[serde(rename = "reportedOn")]
    pub reported_on: Option<bool>,
    #[serde(rename = "lastFailure")]
    pub last_failure: Option<CommandFailure>,
}
