use serde::{Deserialize, Serialize};

use crate::{
    error::GroupError,
    types::{DeviceKind, GroupMode, MemberRole, SourceKind},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSpec {
    pub id: String,
    #[serde(default)]
    pub kind: DeviceKind,
}

impl MemberSpec {
    pub fn climate(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DeviceKind::Climate,
        }
    }

    pub fn switch(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DeviceKind::Switch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    #[serde(default)]
    pub kind: SourceKind,
}

/// Immutable construction parameters of one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub name: String,
    pub heaters: Vec<MemberSpec>,
    pub coolers: Vec<MemberSpec>,
    pub sensor: SourceSpec,
    pub tolerance: f32,
    pub min_temp: f32,
    pub max_temp: f32,
    pub toggle_heaters: bool,
    pub toggle_coolers: bool,
    pub hide_members: bool,
    pub sensor_max_age_ms: u64,
    pub stale_grace_ms: u64,
    pub command_timeout_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            name: "HVAC group".to_string(),
            heaters: Vec::new(),
            coolers: Vec::new(),
            sensor: SourceSpec {
                id: "sensor.temperature".to_string(),
                kind: SourceKind::Sensor,
            },
            tolerance: 0.5,
            min_temp: 7.0,
            max_temp: 35.0,
            toggle_heaters: false,
            toggle_coolers: false,
            hide_members: false,
            sensor_max_age_ms: 300_000,
            stale_grace_ms: 60_000,
            command_timeout_ms: 10_000,
            tick_interval_ms: 1_000,
        }
    }
}

impl GroupConfig {
    pub fn validate(&self) -> Result<(), GroupError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(GroupError::Validation(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if !self.min_temp.is_finite() || !self.max_temp.is_finite() {
            return Err(GroupError::Validation(
                "min_temp and max_temp must be finite".to_string(),
            ));
        }
        if self.min_temp >= self.max_temp {
            return Err(GroupError::Validation(format!(
                "min_temp {} must be below max_temp {}",
                self.min_temp, self.max_temp
            )));
        }
        if self.sensor_max_age_ms == 0 || self.command_timeout_ms == 0 || self.tick_interval_ms == 0
        {
            return Err(GroupError::Validation(
                "sensor_max_age_ms, command_timeout_ms and tick_interval_ms must be positive"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// User-owned settings that survive restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSettings {
    pub target_temperature: f32,
    pub mode: GroupMode,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            target_temperature: 21.0,
            mode: GroupMode::Off,
        }
    }
}

impl PersistedSettings {
    /// Clamps the target into the configured range and falls back to OFF when
    /// the stored mode needs a role the group does not have.
    pub fn sanitize(&mut self, config: &GroupConfig) {
        if !self.target_temperature.is_finite() {
            self.target_temperature = PersistedSettings::default().target_temperature;
        }
        self.target_temperature = self
            .target_temperature
            .clamp(config.min_temp, config.max_temp);

        let supported = self.mode.required_roles().iter().all(|role| match role {
            MemberRole::Heater => !config.heaters.is_empty(),
            MemberRole::Cooler => !config.coolers.is_empty(),
        });
        if !supported {
            self.mode = GroupMode::Off;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub group: GroupConfig,
    #[serde(default)]
    pub settings: PersistedSettings,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_range() {
        let config = GroupConfig {
            min_temp: 30.0,
            max_temp: 10.0,
            ..GroupConfig::default()
        };
        assert!(matches!(config.validate(), Err(GroupError::Validation(_))));
    }

    #[test]
    fn rejects_negative_tolerance() {
        let config = GroupConfig {
            tolerance: -0.1,
            ..GroupConfig::default()
        };
        assert!(matches!(config.validate(), Err(GroupError::Validation(_))));
    }

    #[test]
    fn sanitize_clamps_target_and_drops_unsupported_mode() {
        let config = GroupConfig {
            heaters: vec![MemberSpec::climate("climate.radiator")],
            ..GroupConfig::default()
        };
        let mut settings = PersistedSettings {
            target_temperature: 99.0,
            mode: GroupMode::Cool,
        };
        settings.sanitize(&config);

        assert_eq!(settings.target_temperature, config.max_temp);
        assert_eq!(settings.mode, GroupMode::Off);
    }

    #[test]
    fn runtime_config_fills_missing_sections() {
        let raw = r#"{"group": {"name": "Living room", "heaters": [{"id": "climate.radiator"}]}}"#;
        let runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(runtime.group.name, "Living room");
        assert_eq!(runtime.group.heaters[0].kind, DeviceKind::Climate);
        assert_eq!(runtime.group.tolerance, 0.5);
        assert_eq!(runtime.settings, PersistedSettings::default());
        assert_eq!(runtime.network.mqtt_port, 1883);
    }
}
