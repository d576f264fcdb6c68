//! Host API: the capabilities a game server hands to the relay.
//!
//! The relay never owns the entity registry. It is given a tick-thread view
//! of live entities, a name lookup it may call from any thread, and a
//! scheduler that queues writes for the host's tick thread. Nothing in this
//! crate touches the registry outside [`MutationQueue::apply_pending`].

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info};

// ─── Types ───────────────────────────────────────────────────────────────────

/// World coordinates of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One live entity as seen at a tick boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEntity {
    pub uuid: String,
    pub name: String,
    pub position: Position,
}

impl LiveEntity {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, position: Position) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            position,
        }
    }
}

// ─── Host traits ─────────────────────────────────────────────────────────────

/// The host's entity registry. Only ever borrowed on the tick thread.
pub trait EntityRegistry {
    /// All live entities, in the host's enumeration order.
    fn live_entities(&self) -> Vec<LiveEntity>;

    /// Move an entity. Returns `false` if no entity has this uuid.
    fn set_position(&mut self, uuid: &str, position: Position) -> bool;
}

/// Read-only lookup of live entities by display name.
pub trait EntityDirectory: Send + Sync {
    /// First entity whose display name equals `name`, in enumeration order.
    fn find_by_name(&self, name: &str) -> Option<LiveEntity>;
}

/// Queues a mutation to run on the host's tick thread.
///
/// Callable from any thread. Queued mutations run in the order they were
/// scheduled.
pub trait MutationScheduler: Send + Sync {
    fn schedule(&self, mutation: PendingMutation) -> Result<(), ScheduleError>;
}

// ─── Mutations ───────────────────────────────────────────────────────────────

/// A registry write deferred to the tick thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingMutation {
    Teleport {
        uuid: String,
        name: String,
        position: Position,
    },
}

impl PendingMutation {
    /// Run this mutation against the registry. Returns `false` when the
    /// target no longer exists.
    pub fn apply(self, registry: &mut dyn EntityRegistry) -> bool {
        match self {
            PendingMutation::Teleport {
                uuid,
                name,
                position,
            } => {
                let moved = registry.set_position(&uuid, position);
                if moved {
                    info!(
                        "Teleported {name} to {:.2}, {:.2}, {:.2}",
                        position.x, position.y, position.z
                    );
                } else {
                    debug!("Teleport target {name} ({uuid}) is gone, skipping");
                }
                moved
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("host mutation queue is closed")]
    HostGone,
}

/// Counts from one [`MutationQueue::apply_pending`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub missed: usize,
}

/// Create a scheduler and the queue the host drains on its tick thread.
pub fn mutation_channel() -> (MutationSender, MutationQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MutationSender { tx }, MutationQueue { rx })
}

/// Sending half of [`mutation_channel`].
#[derive(Debug, Clone)]
pub struct MutationSender {
    tx: mpsc::UnboundedSender<PendingMutation>,
}

impl MutationScheduler for MutationSender {
    fn schedule(&self, mutation: PendingMutation) -> Result<(), ScheduleError> {
        self.tx.send(mutation).map_err(|_| ScheduleError::HostGone)
    }
}

/// Receiving half of [`mutation_channel`], owned by the tick thread.
#[derive(Debug)]
pub struct MutationQueue {
    rx: mpsc::UnboundedReceiver<PendingMutation>,
}

impl MutationQueue {
    /// Apply the mutations queued before this call, in order.
    ///
    /// Anything scheduled while draining waits for the next call.
    pub fn apply_pending(&mut self, registry: &mut dyn EntityRegistry) -> ApplyReport {
        let mut report = ApplyReport::default();
        for _ in 0..self.rx.len() {
            match self.rx.try_recv() {
                Ok(mutation) => {
                    if mutation.apply(registry) {
                        report.applied += 1;
                    } else {
                        report.missed += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        report
    }

    /// Stop accepting new mutations. Already-queued ones can still be applied.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct MockRegistry {
        entities: Vec<LiveEntity>,
        writes: Vec<String>,
    }

    impl MockRegistry {
        fn new() -> Self {
            Self {
                entities: vec![
                    LiveEntity::new("u-1", "Steve", Position::new(0.0, 64.0, 0.0)),
                    LiveEntity::new("u-2", "Alex", Position::new(10.0, 70.0, -5.0)),
                ],
                writes: Vec::new(),
            }
        }

        fn position_of(&self, uuid: &str) -> Option<Position> {
            self.entities
                .iter()
                .find(|e| e.uuid == uuid)
                .map(|e| e.position)
        }
    }

    impl EntityRegistry for MockRegistry {
        fn live_entities(&self) -> Vec<LiveEntity> {
            self.entities.clone()
        }

        fn set_position(&mut self, uuid: &str, position: Position) -> bool {
            self.writes.push(uuid.to_string());
            match self.entities.iter_mut().find(|e| e.uuid == uuid) {
                Some(entity) => {
                    entity.position = position;
                    true
                }
                None => false,
            }
        }
    }

    fn teleport(uuid: &str, x: f64) -> PendingMutation {
        PendingMutation::Teleport {
            uuid: uuid.into(),
            name: "test".into(),
            position: Position::new(x, x, x),
        }
    }

    #[test]
    fn apply_moves_entity() {
        let mut registry = MockRegistry::new();
        assert!(teleport("u-1", 5.0).apply(&mut registry));
        assert_eq!(registry.position_of("u-1"), Some(Position::new(5.0, 5.0, 5.0)));
        assert_eq!(registry.position_of("u-2"), Some(Position::new(10.0, 70.0, -5.0)));
    }

    #[test]
    fn apply_to_vanished_entity_is_a_miss() {
        let mut registry = MockRegistry::new();
        assert!(!teleport("gone", 1.0).apply(&mut registry));
        assert_eq!(registry.live_entities(), MockRegistry::new().entities);
    }

    #[test]
    fn apply_pending_runs_in_schedule_order() {
        let (sender, mut queue) = mutation_channel();
        sender.schedule(teleport("u-1", 1.0)).unwrap();
        sender.schedule(teleport("u-2", 2.0)).unwrap();
        sender.schedule(teleport("u-1", 3.0)).unwrap();

        let mut registry = MockRegistry::new();
        let report = queue.apply_pending(&mut registry);
        assert_eq!(report, ApplyReport { applied: 3, missed: 0 });
        assert_eq!(registry.writes, vec!["u-1", "u-2", "u-1"]);
        // Last write wins.
        assert_eq!(registry.position_of("u-1"), Some(Position::new(3.0, 3.0, 3.0)));
    }

    #[test]
    fn nothing_runs_until_drained() {
        let (sender, mut queue) = mutation_channel();
        sender.schedule(teleport("u-1", 9.0)).unwrap();
        let mut registry = MockRegistry::new();
        assert!(registry.writes.is_empty());

        queue.apply_pending(&mut registry);
        assert_eq!(registry.writes.len(), 1);
        // A second drain with nothing queued is a no-op.
        assert_eq!(queue.apply_pending(&mut registry), ApplyReport::default());
    }

    /// Schedules a follow-up teleport every time it is written to.
    struct EchoRegistry {
        inner: MockRegistry,
        sender: MutationSender,
    }

    impl EntityRegistry for EchoRegistry {
        fn live_entities(&self) -> Vec<LiveEntity> {
            self.inner.live_entities()
        }

        fn set_position(&mut self, uuid: &str, position: Position) -> bool {
            self.sender.schedule(teleport(uuid, position.x + 1.0)).unwrap();
            self.inner.set_position(uuid, position)
        }
    }

    #[test]
    fn mutations_scheduled_while_draining_wait_for_next_drain() {
        let (sender, mut queue) = mutation_channel();
        sender.schedule(teleport("u-1", 1.0)).unwrap();
        sender.schedule(teleport("u-2", 2.0)).unwrap();
        let mut registry = EchoRegistry {
            inner: MockRegistry::new(),
            sender,
        };

        assert_eq!(queue.apply_pending(&mut registry).applied, 2);
        assert_eq!(registry.inner.writes, vec!["u-1", "u-2"]);

        assert_eq!(queue.apply_pending(&mut registry).applied, 2);
        assert_eq!(registry.inner.writes, vec!["u-1", "u-2", "u-1", "u-2"]);
        assert_eq!(registry.inner.position_of("u-1"), Some(Position::new(2.0, 2.0, 2.0)));
    }

    #[test]
    fn apply_pending_counts_misses() {
        let (sender, mut queue) = mutation_channel();
        sender.schedule(teleport("u-1", 1.0)).unwrap();
        sender.schedule(teleport("nobody", 1.0)).unwrap();
        let report = queue.apply_pending(&mut MockRegistry::new());
        assert_eq!(report, ApplyReport { applied: 1, missed: 1 });
    }

    #[test]
    fn schedule_after_queue_dropped() {
        let (sender, queue) = mutation_channel();
        drop(queue);
        assert_eq!(
            sender.schedule(teleport("u-1", 1.0)),
            Err(ScheduleError::HostGone)
        );
    }

    #[test]
    fn close_keeps_queued_mutations() {
        let (sender, mut queue) = mutation_channel();
        sender.schedule(teleport("u-1", 4.0)).unwrap();
        queue.close();
        assert_eq!(
            sender.schedule(teleport("u-1", 8.0)),
            Err(ScheduleError::HostGone)
        );
        let mut registry = MockRegistry::new();
        assert_eq!(queue.apply_pending(&mut registry).applied, 1);
        assert_eq!(registry.position_of("u-1"), Some(Position::new(4.0, 4.0, 4.0)));
    }

    #[test]
    fn schedule_from_many_threads() {
        let (sender, mut queue) = mutation_channel();
        let scheduler: Arc<dyn MutationScheduler> = Arc::new(sender);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let scheduler = Arc::clone(&scheduler);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        scheduler.schedule(teleport("u-1", t as f64)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let report = queue.apply_pending(&mut MockRegistry::new());
        assert_eq!(report.applied, 100);
    }

    #[test]
    fn position_finiteness() {
        assert!(Position::new(1.0, -2.0, 3.5).is_finite());
        assert!(!Position::new(f64::NAN, 0.0, 0.0).is_finite());
        assert!(!Position::new(0.0, 0.0, f64::NEG_INFINITY).is_finite());
    }
}
