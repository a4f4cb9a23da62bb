//! Broadcast of build lifecycle events.

use tokio::sync::broadcast;

use crate::runner::BuildOutcome;

/// Progress of the rebuild loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Build number `build` started
    Started { build: u64 },

    /// Build number `build` finished
    Finished { build: u64, outcome: BuildOutcome },
}

/// Hub for broadcasting build events to any number of listeners.
#[derive(Debug, Clone)]
pub struct BuildEvents {
    sender: broadcast::Sender<BuildEvent>,
}

impl BuildEvents {
    /// Create a new event hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send an event to all listeners.
    pub fn send(&self, event: BuildEvent) {
        // No listeners is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.sender.subscribe()
    }
}

impl Default for BuildEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the next finished build, skipping other events.
///
/// Returns `None` once the hub is gone.
pub async fn next_finished(
    rx: &mut broadcast::Receiver<BuildEvent>,
) -> Option<(u64, BuildOutcome)> {
    loop {
        match rx.recv().await {
            Ok(BuildEvent::Finished { build, outcome }) => return Some((build, outcome)),
            Ok(BuildEvent::Started { .. }) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Build event listener lagged by {}", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_static::BuildStats;

    #[test]
    fn hub_broadcasts_events() {
        let hub = BuildEvents::new();
        let mut rx = hub.subscribe();

        hub.send(BuildEvent::Started { build: 1 });

        match rx.try_recv() {
            Ok(BuildEvent::Started { build: 1 }) => {}
            other => panic!("Expected Started, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn next_finished_skips_started() {
        let hub = BuildEvents::new();
        let mut rx = hub.subscribe();

        hub.send(BuildEvent::Started { build: 3 });
        hub.send(BuildEvent::Finished {
            build: 3,
            outcome: BuildOutcome::Success(BuildStats::default()),
        });

        let (build, outcome) = next_finished(&mut rx).await.unwrap();
        assert_eq!(build, 3);
        assert!(outcome.is_success());
    }
}
