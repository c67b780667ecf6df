use crate::{
    config::{GroupConfig, MemberSpec, PersistedSettings},
    error::{CommandFailure, GroupError},
    registry::{Member, MemberRegistry},
    source::SourceReading,
    types::{
        GroupAction, GroupMode, GroupState, MemberCommand, MemberRole, MemberStatus,
        PlannedCommand,
    },
};

/// Bang-bang controller for a group of heaters and coolers.
///
/// Every mutating operation recomputes the desired action and returns the
/// member commands that need to go out. Commands identical to a member's last
/// intent are suppressed unless a resend was forced. The caller is expected
/// to apply all operations one at a time and to report each command's
/// outcome back through [`GroupController::record_command_result`].
#[derive(Debug, Clone)]
pub struct GroupController {
    config: GroupConfig,
    registry: MemberRegistry,
    settings: PersistedSettings,

    // Effective range, narrowed by what members report they support.
    min_temp: f32,
    max_temp: f32,

    current_temperature: Option<f32>,
    stale_since_ms: Option<u64>,

    // Hysteresis memory: the action chosen by the last recompute.
    desired: GroupAction,
    force_refresh: bool,
    // The last recompute held a HEATING/COOLING swap at IDLE.
    swap_pending: bool,
}

impl GroupController {
    pub fn new(config: GroupConfig, mut settings: PersistedSettings) -> Result<Self, GroupError> {
        config.validate()?;
        let registry = MemberRegistry::from_config(&config)?;
        settings.sanitize(&config);

        let desired = if settings.mode == GroupMode::Off {
            GroupAction::Off
        } else {
            GroupAction::Idle
        };

        Ok(Self {
            min_temp: config.min_temp,
            max_temp: config.max_temp,
            config,
            registry,
            settings,
            current_temperature: None,
            stale_since_ms: None,
            desired,
            force_refresh: false,
            swap_pending: false,
        })
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    pub fn settings(&self) -> &PersistedSettings {
        &self.settings
    }

    pub fn registry(&self) -> &MemberRegistry {
        &self.registry
    }

    pub fn mode(&self) -> GroupMode {
        self.settings.mode
    }

    pub fn target_temperature(&self) -> f32 {
        self.settings.target_temperature
    }

    pub fn current_temperature(&self) -> Option<f32> {
        self.current_temperature
    }

    pub fn min_temp(&self) -> f32 {
        self.min_temp
    }

    pub fn max_temp(&self) -> f32 {
        self.max_temp
    }

    pub fn is_sensor_stale(&self) -> bool {
        self.stale_since_ms.is_some()
    }

    pub fn supported_modes(&self) -> Vec<GroupMode> {
        self.registry.supported_modes()
    }

    /// The published action: the hysteresis decision, regressed to IDLE when
    /// every member of the active role has reported itself off.
    pub fn action(&self) -> GroupAction {
        match self.desired.active_role() {
            Some(role) if !self.registry.by_role(role).any(|m| m.is_engaged_as(role)) => {
                GroupAction::Idle
            }
            _ => self.desired,
        }
    }

    pub fn state(&self) -> GroupState {
        GroupState {
            name: self.config.name.clone(),
            mode: self.settings.mode,
            action: self.action(),
            target_temperature: self.settings.target_temperature,
            current_temperature: self.current_temperature,
            tolerance: self.config.tolerance,
            min_temp: self.min_temp,
            max_temp: self.max_temp,
            sensor_stale: self.is_sensor_stale(),
            supported_modes: self.supported_modes(),
        }
    }

    pub fn members(&self) -> Vec<MemberStatus> {
        self.registry.iter().map(Member::status).collect()
    }

    pub fn set_target_temperature(&mut self, value: f32) -> Result<Vec<PlannedCommand>, GroupError> {
        if !value.is_finite() || value < self.min_temp || value > self.max_temp {
            return Err(GroupError::Validation(format!(
                "target temperature {value} outside {}..={}",
                self.min_temp, self.max_temp
            )));
        }

        self.settings.target_temperature = value;
        Ok(self.recompute())
    }

    /// Changing the mode re-sends every member's intent.
    pub fn set_mode(&mut self, mode: GroupMode) -> Result<Vec<PlannedCommand>, GroupError> {
        self.registry.validate_mode(mode)?;

        self.settings.mode = mode;
        self.force_refresh = true;
        Ok(self.recompute())
    }

    /// A new value from the temperature source, or a change in its staleness.
    ///
    /// A stale reading keeps the last temperature for `stale_grace_ms`; once
    /// the grace period runs out the temperature becomes unknown.
    pub fn on_temperature_update(
        &mut self,
        reading: SourceReading,
        now_ms: u64,
    ) -> Vec<PlannedCommand> {
        self.absorb_reading(reading, now_ms);
        self.recompute()
    }

    /// Periodic poll of the source. Only recomputes when staleness or the
    /// known temperature actually changed, or to finish a swap between
    /// heating and cooling that the previous pass held at IDLE.
    pub fn tick(&mut self, reading: SourceReading, now_ms: u64) -> Vec<PlannedCommand> {
        let before = (self.current_temperature, self.stale_since_ms.is_some());
        self.absorb_reading(reading, now_ms);

        let unchanged = before == (self.current_temperature, self.stale_since_ms.is_some());
        if unchanged && !self.swap_pending {
            return Vec::new();
        }
        self.recompute()
    }

    /// A member reported its own state; `None` means unavailable.
    pub fn on_member_state_changed(
        &mut self,
        member_id: &str,
        reported_on: Option<bool>,
    ) -> Result<Vec<PlannedCommand>, GroupError> {
        let member = self
            .registry
            .get_mut(member_id)
            .ok_or_else(|| GroupError::UnknownMember(member_id.to_string()))?;

        match reported_on {
            None => member.awaiting_resync = true,
            Some(_) if member.awaiting_resync => {
                // Back from unavailable: it may have lost our last command.
                member.awaiting_resync = false;
                member.needs_resend = true;
            }
            Some(_) => {}
        }
        member.reported_on = reported_on;

        Ok(self.recompute())
    }

    /// A member reported the temperature range it supports. The group range
    /// only ever narrows; reports that would empty it are ignored.
    pub fn on_member_limits(
        &mut self,
        member_id: &str,
        min_temp: f32,
        max_temp: f32,
    ) -> Result<Vec<PlannedCommand>, GroupError> {
        if !self.registry.contains(member_id) {
            return Err(GroupError::UnknownMember(member_id.to_string()));
        }
        if !min_temp.is_finite() || !max_temp.is_finite() || min_temp >= max_temp {
            return Ok(Vec::new());
        }

        let low = self.min_temp.max(min_temp);
        let high = self.max_temp.min(max_temp);
        if low >= high || (low == self.min_temp && high == self.max_temp) {
            return Ok(Vec::new());
        }

        self.min_temp = low;
        self.max_temp = high;
        self.settings.target_temperature = self.settings.target_temperature.clamp(low, high);
        Ok(self.recompute())
    }

    /// Outcome of a dispatched command. Failures leave the intent in place,
    /// mark the device state unknown and schedule a resend for the next
    /// recompute.
    pub fn record_command_result(
        &mut self,
        member_id: &str,
        command: MemberCommand,
        result: Result<(), CommandFailure>,
    ) {
        let Some(member) = self.registry.get_mut(member_id) else {
            return;
        };

        match result {
            Ok(()) => member.last_failure = None,
            Err(failure) => {
                member.reported_on = None;
                // A newer intent has already been queued behind this one.
                if member.last_command == Some(command) {
                    member.needs_resend = true;
                }
                member.last_failure = Some(failure);
            }
        }
    }

    pub fn add_member(
        &mut self,
        role: MemberRole,
        spec: &MemberSpec,
    ) -> Result<Vec<PlannedCommand>, GroupError> {
        self.registry.add(role, spec)?;
        Ok(self.recompute())
    }

    /// Removing the last member of a role the mode depends on turns the group off.
    pub fn remove_member(&mut self, member_id: &str) -> Result<Vec<PlannedCommand>, GroupError> {
        self.registry.remove(member_id)?;

        if self.registry.validate_mode(self.settings.mode).is_err() {
            self.settings.mode = GroupMode::Off;
            self.force_refresh = true;
        }
        Ok(self.recompute())
    }

    /// Re-evaluates the action and plans one command per member whose intent
    /// changed or needs resending.
    pub fn recompute(&mut self) -> Vec<PlannedCommand> {
        let (action, swap_pending) = self.evaluate();
        self.desired = action;
        self.swap_pending = swap_pending;

        let force = std::mem::take(&mut self.force_refresh);
        let mode = self.settings.mode;
        let target = self.settings.target_temperature;
        let (min_temp, max_temp) = (self.min_temp, self.max_temp);

        self.registry
            .iter_mut()
            .filter_map(|member| {
                let command = command_for(action, mode, member, target, min_temp, max_temp);
                if !force && !member.needs_resend && member.last_command == Some(command) {
                    return None;
                }

                member.last_command = Some(command);
                member.needs_resend = false;
                Some(PlannedCommand {
                    member_id: member.id.clone(),
                    command,
                })
            })
            .collect()
    }

    fn absorb_reading(&mut self, reading: SourceReading, now_ms: u64) {
        match reading {
            SourceReading {
                value: Some(value),
                is_stale: false,
            } => {
                self.current_temperature = Some(value);
                self.stale_since_ms = None;
            }
            _ => {
                let since = *self.stale_since_ms.get_or_insert(now_ms);
                if now_ms.saturating_sub(since) >= self.config.stale_grace_ms {
                    self.current_temperature = None;
                }
            }
        }
    }

    /// The next action, and whether it is an IDLE standing in for a role swap.
    fn evaluate(&self) -> (GroupAction, bool) {
        let mode = self.settings.mode;
        if mode == GroupMode::Off {
            return (GroupAction::Off, false);
        }
        let Some(current) = self.current_temperature else {
            return (GroupAction::Idle, false);
        };

        let delta = current - self.settings.target_temperature;
        let tolerance = self.config.tolerance;
        let can_heat = mode.permits(MemberRole::Heater) && self.registry.has_role(MemberRole::Heater);
        let can_cool = mode.permits(MemberRole::Cooler) && self.registry.has_role(MemberRole::Cooler);

        // Once running, keep going until the target itself is reached.
        match self.desired {
            GroupAction::Heating if can_heat && delta < 0.0 => {
                return (GroupAction::Heating, false)
            }
            GroupAction::Cooling if can_cool && delta > 0.0 => {
                return (GroupAction::Cooling, false)
            }
            _ => {}
        }

        // Heat wins a tie, which only a zero tolerance can produce.
        let wanted = if can_heat && delta <= -tolerance {
            GroupAction::Heating
        } else if can_cool && delta >= tolerance {
            GroupAction::Cooling
        } else {
            GroupAction::Idle
        };

        // Never swap roles in a single pass.
        match (self.desired, wanted) {
            (GroupAction::Heating, GroupAction::Cooling)
            | (GroupAction::Cooling, GroupAction::Heating) => (GroupAction::Idle, true),
            _ => (wanted, false),
        }
    }
}

fn command_for(
    action: GroupAction,
    mode: GroupMode,
    member: &Member,
    target: f32,
    min_temp: f32,
    max_temp: f32,
) -> MemberCommand {
    if let Some(role) = action.active_role().filter(|role| member.has_role(*role)) {
        return MemberCommand::Activate {
            role,
            setpoint: target,
        };
    }
    if member.toggle_on_idle {
        return MemberCommand::Deactivate;
    }

    // A shared member idles as a heater unless the group only cools.
    let role = if member.has_role(MemberRole::Heater)
        && !(member.is_shared() && mode == GroupMode::Cool)
    {
        MemberRole::Heater
    } else {
        MemberRole::Cooler
    };
    // A setpoint the member's own thermostat will never act on.
    let setpoint = match role {
        MemberRole::Heater => min_temp,
        MemberRole::Cooler => max_temp,
    };
    MemberCommand::IdleSetpoint { role, setpoint }
}
