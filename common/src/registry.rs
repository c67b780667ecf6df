use crate::{
    config::{GroupConfig, MemberSpec},
    error::{CommandFailure, GroupError},
    types::{DeviceKind, GroupMode, MemberCommand, MemberRole, MemberStatus},
};

/// One device under the group's control. A heat pump listed as both heater
/// and cooler is a single member holding both roles.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: String,
    /// Heater before cooler when both are held.
    pub roles: Vec<MemberRole>,
    pub kind: DeviceKind,
    pub toggle_on_idle: bool,
    pub hidden: bool,
    /// Most recent intent. Kept after a failed send so the group action keeps
    /// describing what it is trying to do.
    pub last_command: Option<MemberCommand>,
    pub reported_on: Option<bool>,
    pub last_failure: Option<CommandFailure>,
    /// Set when the next recompute must send `last_command` again even though
    /// it has not changed (failure, device reconnect, forced refresh).
    pub needs_resend: bool,
    /// The device was seen unavailable; its next report is treated as a reconnect.
    pub awaiting_resync: bool,
}

impl Member {
    fn new(role: MemberRole, spec: &MemberSpec, toggle_on_idle: bool, hidden: bool) -> Self {
        Self {
            id: spec.id.clone(),
            roles: vec![role],
            kind: spec.kind,
            toggle_on_idle,
            hidden,
            last_command: None,
            reported_on: None,
            last_failure: None,
            needs_resend: false,
            awaiting_resync: false,
        }
    }

    pub fn has_role(&self, role: MemberRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_shared(&self) -> bool {
        self.roles.len() > 1
    }

    pub fn last_commanded_on(&self) -> Option<bool> {
        self.last_command.map(MemberCommand::is_on)
    }

    /// Commanded on as `role` and not contradicted by the device itself. An
    /// unknown report counts as engaged.
    pub fn is_engaged_as(&self, role: MemberRole) -> bool {
        matches!(
            self.last_command,
            Some(MemberCommand::Activate { role: active, .. }) if active == role
        ) && self.reported_on != Some(false)
    }

    pub fn status(&self) -> MemberStatus {
        MemberStatus {
            id: self.id.clone(),
            roles: self.roles.clone(),
            kind: self.kind,
            toggle_on_idle: self.toggle_on_idle,
            hidden: self.hidden,
            last_command: self.last_command,
            last_commanded_on: self.last_commanded_on(),
            reported_on: self.reported_on,
            last_failure: self.last_failure.clone(),
        }
    }
}

/// Ordered heaters and coolers of a group, one entry per device.
#[derive(Debug, Clone)]
pub struct MemberRegistry {
    members: Vec<Member>,
    toggle_heaters: bool,
    toggle_coolers: bool,
    hide_members: bool,
}

impl MemberRegistry {
    pub fn from_config(config: &GroupConfig) -> Result<Self, GroupError> {
        let mut registry = Self {
            members: Vec::with_capacity(config.heaters.len() + config.coolers.len()),
            toggle_heaters: config.toggle_heaters,
            toggle_coolers: config.toggle_coolers,
            hide_members: config.hide_members,
        };

        for spec in &config.heaters {
            registry.insert(MemberRole::Heater, spec)?;
        }
        for spec in &config.coolers {
            registry.insert(MemberRole::Cooler, spec)?;
        }

        if registry.members.is_empty() {
            return Err(GroupError::EmptyGroup);
        }
        Ok(registry)
    }

    pub fn add(&mut self, role: MemberRole, spec: &MemberSpec) -> Result<(), GroupError> {
        self.insert(role, spec)
    }

    /// Removes the device from every role it holds.
    pub fn remove(&mut self, id: &str) -> Result<Member, GroupError> {
        let Some(index) = self.members.iter().position(|m| m.id == id) else {
            return Err(GroupError::UnknownMember(id.to_string()));
        };
        if self.members.len() == 1 {
            return Err(GroupError::EmptyGroup);
        }
        Ok(self.members.remove(index))
    }

    fn insert(&mut self, role: MemberRole, spec: &MemberSpec) -> Result<(), GroupError> {
        let id = spec.id.trim();
        if id.is_empty() {
            return Err(GroupError::Validation("member id must not be empty".to_string()));
        }

        let toggle = self.toggles(role);
        if !toggle && spec.kind == DeviceKind::Switch {
            return Err(GroupError::Validation(format!(
                "switch {id} needs toggle_{role}s enabled"
            )));
        }

        if let Some(existing) = self.members.iter_mut().find(|m| m.id == id) {
            if existing.has_role(role) {
                return Err(GroupError::DuplicateMember(id.to_string()));
            }
            // Same device in the other role: it heats and cools.
            if existing.kind != DeviceKind::Climate || spec.kind != DeviceKind::Climate {
                return Err(GroupError::Validation(format!(
                    "{id} is both heater and cooler, which needs a climate device"
                )));
            }
            existing.roles.push(role);
            existing.roles.sort_by_key(|held| *held == MemberRole::Cooler);
            existing.toggle_on_idle |= toggle;
            return Ok(());
        }

        let spec = MemberSpec {
            id: id.to_string(),
            kind: spec.kind,
        };
        let member = Member::new(role, &spec, toggle, self.hide_members);

        // Heaters first, then coolers, each in insertion order.
        let position = match role {
            MemberRole::Heater => self
                .members
                .iter()
                .position(|m| !m.has_role(MemberRole::Heater))
                .unwrap_or(self.members.len()),
            MemberRole::Cooler => self.members.len(),
        };
        self.members.insert(position, member);
        Ok(())
    }

    fn toggles(&self, role: MemberRole) -> bool {
        match role {
            MemberRole::Heater => self.toggle_heaters,
            MemberRole::Cooler => self.toggle_coolers,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Member> {
        self.members.iter_mut()
    }

    pub fn by_role(&self, role: MemberRole) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(move |m| m.has_role(role))
    }

    pub fn has_role(&self, role: MemberRole) -> bool {
        self.by_role(role).next().is_some()
    }

    pub fn validate_mode(&self, mode: GroupMode) -> Result<(), GroupError> {
        match mode
            .required_roles()
            .iter()
            .find(|role| !self.has_role(**role))
        {
            Some(missing) => Err(GroupError::UnsupportedMode {
                mode,
                missing: *missing,
            }),
            None => Ok(()),
        }
    }

    pub fn supported_modes(&self) -> Vec<GroupMode> {
        [
            GroupMode::Off,
            GroupMode::Heat,
            GroupMode::Cool,
            GroupMode::HeatCool,
        ]
        .into_iter()
        .filter(|mode| self.validate_mode(*mode).is_ok())
        .collect()
    }
}
