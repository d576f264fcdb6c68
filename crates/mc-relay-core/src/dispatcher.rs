//! Command dispatcher: turns inbound frames into mutations queued for the
//! host's tick thread.
//!
//! Runs on the transport's I/O task. It reads the [`EntityDirectory`] and
//! hands a [`PendingMutation`] to the [`MutationScheduler`]; it never touches
//! the registry itself and never blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mc_relay_host_api::{
    EntityDirectory, MutationScheduler, PendingMutation, Position, ScheduleError,
};
use mc_relay_proto::{decode_incoming, DecodeError, Incoming, TeleportCommand};
use thiserror::Error;
use tracing::{debug, trace, warn};

// ─── Types ───────────────────────────────────────────────────────────────────

/// No live entity carries the requested display name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no live entity named {target:?}")]
pub struct DispatchMiss {
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Miss(#[from] DispatchMiss),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// A mutation was queued for the tick thread.
    Dispatched,
    /// Valid message of a kind the relay does not act on.
    Ignored { kind: String },
    Rejected(DecodeError),
    Missed(DispatchMiss),
    /// The host stopped draining mutations.
    Undeliverable(ScheduleError),
}

#[derive(Debug, Default)]
struct DispatchStats {
    frames: AtomicU64,
    dispatched: AtomicU64,
    ignored: AtomicU64,
    rejected: AtomicU64,
    missed: AtomicU64,
    undeliverable: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub frames: u64,
    pub dispatched: u64,
    pub ignored: u64,
    pub rejected: u64,
    pub missed: u64,
    pub undeliverable: u64,
}

// ─── CommandDispatcher ───────────────────────────────────────────────────────

pub struct CommandDispatcher {
    directory: Arc<dyn EntityDirectory>,
    scheduler: Arc<dyn MutationScheduler>,
    stats: DispatchStats,
}

impl CommandDispatcher {
    pub fn new(directory: Arc<dyn EntityDirectory>, scheduler: Arc<dyn MutationScheduler>) -> Self {
        Self {
            directory,
            scheduler,
            stats: DispatchStats::default(),
        }
    }

    /// Look up the target and queue a teleport for the tick thread.
    ///
    /// With duplicate display names the first entity in enumeration order is
    /// moved. The mutation targets that entity's uuid, so it becomes a no-op
    /// if the entity leaves before the tick thread runs it.
    pub fn handle(&self, cmd: TeleportCommand) -> Result<(), DispatchError> {
        let entity = self
            .directory
            .find_by_name(&cmd.target_name)
            .ok_or_else(|| DispatchMiss {
                target: cmd.target_name.clone(),
            })?;

        trace!(
            "Scheduling teleport of {} ({}) to {}, {}, {}",
            entity.name,
            entity.uuid,
            cmd.x,
            cmd.y,
            cmd.z
        );
        self.scheduler.schedule(PendingMutation::Teleport {
            uuid: entity.uuid,
            name: entity.name,
            position: Position::new(cmd.x, cmd.y, cmd.z),
        })?;
        Ok(())
    }

    /// Decode and dispatch one inbound frame. Every failure is contained
    /// here and reported through the returned outcome and the log.
    pub fn on_frame(&self, frame: &[u8]) -> FrameOutcome {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);

        let outcome = match decode_incoming(frame) {
            Ok(Incoming::Teleport(cmd)) => match self.handle(cmd) {
                Ok(()) => FrameOutcome::Dispatched,
                Err(DispatchError::Miss(miss)) => FrameOutcome::Missed(miss),
                Err(DispatchError::Schedule(e)) => FrameOutcome::Undeliverable(e),
            },
            Ok(Incoming::Ignored { kind }) => FrameOutcome::Ignored { kind },
            Err(e) => FrameOutcome::Rejected(e),
        };

        let counter = match &outcome {
            FrameOutcome::Dispatched => &self.stats.dispatched,
            FrameOutcome::Ignored { kind } => {
                debug!("Ignoring message of type {kind:?}");
                &self.stats.ignored
            }
            FrameOutcome::Rejected(e) => {
                warn!("Discarding inbound frame: {e}");
                &self.stats.rejected
            }
            FrameOutcome::Missed(miss) => {
                warn!("Teleport dropped: {miss}");
                &self.stats.missed
            }
            FrameOutcome::Undeliverable(e) => {
                warn!("Teleport dropped: {e}");
                &self.stats.undeliverable
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    pub fn stats(&self) -> DispatchSnapshot {
        let s = &self.stats;
        DispatchSnapshot {
            frames: s.frames.load(Ordering::Relaxed),
            dispatched: s.dispatched.load(Ordering::Relaxed),
            ignored: s.ignored.load(Ordering::Relaxed),
            rejected: s.rejected.load(Ordering::Relaxed),
            missed: s.missed.load(Ordering::Relaxed),
            undeliverable: s.undeliverable.load(Ordering::Relaxed),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
