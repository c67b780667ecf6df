use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use hvac_group_common::{CommandFailure, MemberCommand, PlannedCommand};

use crate::proxy::{execute, DeviceProxy};

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub member_id: String,
    pub command: MemberCommand,
    pub result: Result<(), CommandFailure>,
}

/// Fans planned commands out to members. Each member has its own worker, so
/// commands to one member run strictly in order while members proceed
/// independently of each other. A worker only ever holds the newest pending
/// intent: commands queued behind a slow one are replaced, not replayed.
pub struct CommandDispatcher {
    workers: HashMap<String, watch::Sender<Option<MemberCommand>>>,
    timeout: Duration,
    outcomes: mpsc::UnboundedSender<CommandOutcome>,
}

impl CommandDispatcher {
    /// Spawns one worker per proxy; must be called from within a tokio runtime.
    pub fn new(
        proxies: Vec<Arc<dyn DeviceProxy>>,
        timeout: Duration,
        outcomes: mpsc::UnboundedSender<CommandOutcome>,
    ) -> Self {
        let mut dispatcher = Self {
            workers: HashMap::with_capacity(proxies.len()),
            timeout,
            outcomes,
        };
        for proxy in proxies {
            dispatcher.add_worker(proxy);
        }
        dispatcher
    }

    /// Starts a worker for a member that does not have one yet.
    pub fn add_worker(&mut self, proxy: Arc<dyn DeviceProxy>) {
        let member_id = proxy.member_id().to_string();
        if self.workers.contains_key(&member_id) {
            return;
        }

        let (tx, rx) = watch::channel(None);
        tokio::spawn(run_worker(proxy, self.timeout, rx, self.outcomes.clone()));
        self.workers.insert(member_id, tx);
    }

    /// The worker finishes its in-flight command, if any, and exits.
    pub fn remove_worker(&mut self, member_id: &str) -> bool {
        self.workers.remove(member_id).is_some()
    }

    /// Queues every command without waiting for any of them to complete.
    pub fn dispatch(&self, commands: Vec<PlannedCommand>) {
        for PlannedCommand { member_id, command } in commands {
            let Some(worker) = self.workers.get(&member_id) else {
                warn!("no device proxy for member {member_id}, dropping {command:?}");
                continue;
            };
            if worker.send(Some(command)).is_err() {
                warn!("command worker for {member_id} has stopped, dropping {command:?}");
            }
        }
    }
}

async fn run_worker(
    proxy: Arc<dyn DeviceProxy>,
    timeout: Duration,
    mut pending: watch::Receiver<Option<MemberCommand>>,
    outcomes: mpsc::UnboundedSender<CommandOutcome>,
) {
    while pending.changed().await.is_ok() {
        let Some(command) = *pending.borrow_and_update() else {
            continue;
        };
        let member_id = proxy.member_id().to_string();
        debug!("sending {command:?} to {member_id}");

        let result = match tokio::time::timeout(timeout, execute(proxy.as_ref(), command)).await {
            Ok(result) => result,
            Err(_) => Err(CommandFailure::Timeout),
        };
        if let Err(failure) = &result {
            warn!("command {command:?} to {member_id} failed: {failure}");
        }

        let outcome = CommandOutcome {
            member_id,
            command,
            result,
        };
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
}
