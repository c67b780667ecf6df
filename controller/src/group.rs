use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use hvac_group_common::{
    GroupController, GroupError, GroupMode, GroupState, MemberRole, MemberSpec, MemberStatus,
    PlannedCommand, TemperatureSource,
};

use crate::{
    dispatcher::{CommandDispatcher, CommandOutcome},
    proxy::{DeviceProxy, MemberReport},
};

/// Bounded so a flood of sensor pushes applies backpressure to the MQTT loop.
const EVENT_CHANNEL_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error("group task has stopped")]
    Stopped,
}

enum GroupEvent {
    SourcePayload(String),
    MemberPayload {
        member_id: String,
        payload: String,
    },
    SetTarget {
        value: f32,
        reply: oneshot::Sender<Result<GroupState, GroupError>>,
    },
    SetMode {
        mode: GroupMode,
        reply: oneshot::Sender<Result<GroupState, GroupError>>,
    },
    Members {
        reply: oneshot::Sender<Vec<MemberStatus>>,
    },
    AddMember {
        role: MemberRole,
        spec: MemberSpec,
        proxy: Arc<dyn DeviceProxy>,
        reply: oneshot::Sender<Result<GroupState, GroupError>>,
    },
    RemoveMember {
        member_id: String,
        reply: oneshot::Sender<Result<GroupState, GroupError>>,
    },
}

/// Cloneable command surface of one running group. Every call is applied by
/// the group task in arrival order.
#[derive(Clone)]
pub struct GroupHandle {
    events: mpsc::Sender<GroupEvent>,
    state: watch::Receiver<GroupState>,
}

impl GroupHandle {
    pub fn state(&self) -> GroupState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<GroupState> {
        self.state.clone()
    }

    pub async fn source_payload(&self, payload: String) -> Result<(), HandleError> {
        self.send(GroupEvent::SourcePayload(payload)).await
    }

    pub async fn member_payload(&self, member_id: String, payload: String) -> Result<(), HandleError> {
        self.send(GroupEvent::MemberPayload { member_id, payload })
            .await
    }

    pub async fn set_target_temperature(&self, value: f32) -> Result<GroupState, HandleError> {
        Ok(self
            .request(|reply| GroupEvent::SetTarget { value, reply })
            .await??)
    }

    pub async fn set_mode(&self, mode: GroupMode) -> Result<GroupState, HandleError> {
        Ok(self.request(|reply| GroupEvent::SetMode { mode, reply }).await??)
    }

    pub async fn members(&self) -> Result<Vec<MemberStatus>, HandleError> {
        self.request(|reply| GroupEvent::Members { reply }).await
    }

    /// Adds `spec` in `role`. `proxy` becomes the member's command path unless
    /// the member is already in the group under its other role.
    pub async fn add_member(
        &self,
        role: MemberRole,
        spec: MemberSpec,
        proxy: Arc<dyn DeviceProxy>,
    ) -> Result<GroupState, HandleError> {
        Ok(self
            .request(|reply| GroupEvent::AddMember {
                role,
                spec,
                proxy,
                reply,
            })
            .await??)
    }

    pub async fn remove_member(&self, member_id: String) -> Result<GroupState, HandleError> {
        Ok(self
            .request(|reply| GroupEvent::RemoveMember { member_id, reply })
            .await??)
    }

    async fn send(&self, event: GroupEvent) -> Result<(), HandleError> {
        self.events
            .send(event)
            .await
            .map_err(|_| HandleError::Stopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> GroupEvent,
    ) -> Result<T, HandleError> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply)).await?;
        response.await.map_err(|_| HandleError::Stopped)
    }
}

/// Starts the task that owns `controller` and `source`. Member commands are
/// handed to the dispatcher and never awaited by the group task itself.
pub fn spawn_group(
    controller: GroupController,
    source: TemperatureSource,
    proxies: Vec<Arc<dyn DeviceProxy>>,
) -> (GroupHandle, JoinHandle<()>) {
    let command_timeout = Duration::from_millis(controller.config().command_timeout_ms);
    let tick_interval = Duration::from_millis(controller.config().tick_interval_ms);

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(controller.state());

    let actor = GroupActor {
        dispatcher: CommandDispatcher::new(proxies, command_timeout, outcomes_tx),
        controller,
        source,
        state: state_tx,
        started: Instant::now(),
    };
    let task = tokio::spawn(actor.run(events_rx, outcomes_rx, tick_interval));

    (
        GroupHandle {
            events: events_tx,
            state: state_rx,
        },
        task,
    )
}

struct GroupActor {
    controller: GroupController,
    source: TemperatureSource,
    dispatcher: CommandDispatcher,
    state: watch::Sender<GroupState>,
    started: Instant,
}

impl GroupActor {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<GroupEvent>,
        mut outcomes: mpsc::UnboundedReceiver<CommandOutcome>,
        tick_interval: Duration,
    ) {
        // Bring every member in line with the restored settings.
        let commands = self.controller.recompute();
        self.dispatch(commands);
        self.publish();

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                Some(outcome) = outcomes.recv() => {
                    self.controller.record_command_result(
                        &outcome.member_id,
                        outcome.command,
                        outcome.result,
                    );
                }
                _ = ticker.tick() => self.handle_tick(),
            }
            self.publish();
        }

        info!("group {} stopped", self.controller.config().name);
    }

    fn handle_event(&mut self, event: GroupEvent) {
        match event {
            GroupEvent::SourcePayload(payload) => {
                let now_ms = self.now_ms();
                let reading = self.source.ingest(&payload, now_ms);
                let before = self.source_health();
                let commands = self.controller.on_temperature_update(reading, now_ms);
                self.log_source_transition(before);
                self.dispatch(commands);
            }
            GroupEvent::MemberPayload { member_id, payload } => {
                self.handle_member_payload(&member_id, &payload);
            }
            GroupEvent::SetTarget { value, reply } => {
                let result = match self.controller.set_target_temperature(value) {
                    Ok(commands) => {
                        self.dispatch(commands);
                        Ok(self.controller.state())
                    }
                    Err(err) => {
                        warn!("rejected target temperature {value}: {err}");
                        Err(err)
                    }
                };
                let _ = reply.send(result);
            }
            GroupEvent::SetMode { mode, reply } => {
                let result = match self.controller.set_mode(mode) {
                    Ok(commands) => {
                        info!("{} mode set to {mode}", self.controller.config().name);
                        self.dispatch(commands);
                        Ok(self.controller.state())
                    }
                    Err(err) => {
                        warn!("rejected mode {mode}: {err}");
                        Err(err)
                    }
                };
                let _ = reply.send(result);
            }
            GroupEvent::Members { reply } => {
                let _ = reply.send(self.controller.members());
            }
            GroupEvent::AddMember {
                role,
                spec,
                proxy,
                reply,
            } => {
                let result = match self.controller.add_member(role, &spec) {
                    Ok(commands) => {
                        info!("{} added {role} {}", self.controller.config().name, spec.id);
                        self.dispatcher.add_worker(proxy);
                        self.dispatch(commands);
                        Ok(self.controller.state())
                    }
                    Err(err) => {
                        warn!("rejected {role} {}: {err}", spec.id);
                        Err(err)
                    }
                };
                let _ = reply.send(result);
            }
            GroupEvent::RemoveMember { member_id, reply } => {
                let result = match self.controller.remove_member(&member_id) {
                    Ok(commands) => {
                        info!("{} removed {member_id}", self.controller.config().name);
                        self.dispatcher.remove_worker(&member_id);
                        self.dispatch(commands);
                        Ok(self.controller.state())
                    }
                    Err(err) => {
                        warn!("cannot remove {member_id}: {err}");
                        Err(err)
                    }
                };
                let _ = reply.send(result);
            }
        }
    }

    fn handle_member_payload(&mut self, member_id: &str, payload: &str) {
        let Some(kind) = self.controller.registry().get(member_id).map(|m| m.kind) else {
            warn!("state report for unknown member {member_id}");
            return;
        };
        let report = MemberReport::parse(kind, payload);
        if report.reported_on.is_none() {
            warn!("member {member_id} is unavailable");
        }

        match self
            .controller
            .on_member_state_changed(member_id, report.reported_on)
        {
            Ok(commands) => self.dispatch(commands),
            Err(err) => warn!("member {member_id} report rejected: {err}"),
        }

        if let Some((min_temp, max_temp)) = report.limits {
            match self.controller.on_member_limits(member_id, min_temp, max_temp) {
                Ok(commands) => self.dispatch(commands),
                Err(err) => warn!("member {member_id} limits rejected: {err}"),
            }
        }
    }

    fn handle_tick(&mut self) {
        let now_ms = self.now_ms();
        let reading = self.source.current(now_ms);
        let before = self.source_health();
        let commands = self.controller.tick(reading, now_ms);
        self.log_source_transition(before);
        self.dispatch(commands);
    }

    fn source_health(&self) -> (bool, bool) {
        (
            self.controller.is_sensor_stale(),
            self.controller.current_temperature().is_some(),
        )
    }

    fn log_source_transition(&self, (was_stale, had_temperature): (bool, bool)) {
        let (stale, has_temperature) = self.source_health();
        let source = self.source.id();

        if !was_stale && stale {
            warn!("temperature source {source} is stale");
        } else if was_stale && !stale {
            info!("temperature source {source} recovered");
        }
        if had_temperature && !has_temperature {
            warn!(
                "no fresh temperature from {source} within {} ms, idling {}",
                self.controller.config().stale_grace_ms,
                self.controller.config().name
            );
        }
    }

    fn dispatch(&self, commands: Vec<PlannedCommand>) {
        if commands.is_empty() {
            return;
        }
        for planned in &commands {
            debug!("planned {:?} for {}", planned.command, planned.member_id);
        }
        self.dispatcher.dispatch(commands);
    }

    fn publish(&self) {
        let next = self.controller.state();
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if current.action != next.action {
                info!("{}: {} -> {}", next.name, current.action, next.action);
            }
            *current = next;
            true
        });
    }

    fn now_ms(&self) -> u64 {
        self.started
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}
