//! Serializes rebuild triggers into at most one build at a time.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::{BuildEvent, BuildEvents};
use crate::runner::{BuildOutcome, BuildRunner};

/// Capacity of the trigger queue.
const TRIGGER_QUEUE: usize = 100;

/// "Something changed." Carries no payload; any number of them may collapse
/// into one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildRequest;

/// Sending half of the trigger queue.
#[derive(Debug, Clone)]
pub struct Trigger {
    sender: mpsc::Sender<BuildRequest>,
}

impl Trigger {
    /// Request a rebuild without blocking.
    pub fn fire(&self) {
        // A full queue already owes the coordinator a rebuild
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.sender.try_send(BuildRequest) {
            tracing::debug!("Rebuild requested after coordinator shut down");
        }
    }
}

/// Create the trigger queue feeding a [`RebuildCoordinator`].
pub fn trigger_channel() -> (Trigger, mpsc::Receiver<BuildRequest>) {
    let (sender, receiver) = mpsc::channel(TRIGGER_QUEUE);
    (Trigger { sender }, receiver)
}

/// Coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No build running
    Idle,
    /// A build is running and nothing changed since it started
    Building,
    /// A build is running and one more is owed when it finishes
    BuildingWithPending,
}

impl CoordinatorState {
    /// Transition on a trigger. The flag says whether to start a build now.
    pub fn on_trigger(self) -> (Self, bool) {
        match self {
            Self::Idle => (Self::Building, true),
            Self::Building | Self::BuildingWithPending => (Self::BuildingWithPending, false),
        }
    }

    /// Transition on build completion. The flag says whether to start a build now.
    pub fn on_complete(self) -> (Self, bool) {
        match self {
            Self::BuildingWithPending => (Self::Building, true),
            Self::Building | Self::Idle => (Self::Idle, false),
        }
    }
}

/// Owns the single stream of build invocations.
pub struct RebuildCoordinator {
    runner: Arc<BuildRunner>,
    events: BuildEvents,
    state: CoordinatorState,
    builds: u64,
}

impl RebuildCoordinator {
    /// Create a coordinator driving `runner`.
    pub fn new(runner: Arc<BuildRunner>) -> Self {
        Self {
            runner,
            events: BuildEvents::new(),
            state: CoordinatorState::Idle,
            builds: 0,
        }
    }

    /// Hub that reports build starts and outcomes.
    pub fn events(&self) -> BuildEvents {
        self.events.clone()
    }

    /// Consume triggers until every [`Trigger`] is dropped.
    ///
    /// Triggers keep being received while a build runs. Once the queue closes
    /// the in-flight build is awaited and any owed rebuild is dropped.
    pub async fn run(mut self, mut triggers: mpsc::Receiver<BuildRequest>) {
        let (done_tx, mut done_rx) = mpsc::channel::<(u64, BuildOutcome)>(1);
        let mut closed = false;

        loop {
            if closed && self.state == CoordinatorState::Idle {
                break;
            }

            tokio::select! {
                request = triggers.recv(), if !closed => match request {
                    Some(BuildRequest) => {
                        let (next, start) = self.state.on_trigger();
                        self.state = next;
                        if start {
                            self.start_build(done_tx.clone());
                        } else {
                            tracing::debug!("Build in progress; rebuild queued");
                        }
                    }
                    None => closed = true,
                },
                Some((build, outcome)) = done_rx.recv() => {
                    let (next, start) = self.state.on_complete();
                    self.state = next;
                    self.events.send(BuildEvent::Finished { build, outcome });

                    if start && closed {
                        tracing::debug!("Shutting down; dropping queued rebuild");
                        self.state = CoordinatorState::Idle;
                    } else if start {
                        self.start_build(done_tx.clone());
                    }
                }
            }
        }

        tracing::debug!("Rebuild coordinator stopped after {} builds", self.builds);
    }

    fn start_build(&mut self, done: mpsc::Sender<(u64, BuildOutcome)>) {
        self.builds += 1;
        let build = self.builds;
        self.events.send(BuildEvent::Started { build });

        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let outcome = runner.run().await;
            let _ = done.send((build, outcome)).await;
        });
    }
}
