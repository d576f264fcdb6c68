//! Telemetry publisher: one position frame per live entity per tick.

use std::sync::Arc;

use mc_relay_host_api::LiveEntity;
use mc_relay_proto::{encode_snapshot, PositionSnapshot};
use mc_relay_transport::{Frame, FrameSink};
use tracing::{debug, trace};

use crate::roster::Roster;

/// Counts from one [`TelemetryPublisher::on_tick`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frames accepted by the sink.
    pub queued: usize,
    /// Frames the sink refused.
    pub dropped: usize,
    /// Entities with non-finite coordinates.
    pub skipped: usize,
}

/// Handed to the host's tick thread. Cheap to clone.
#[derive(Clone)]
pub struct TelemetryPublisher {
    sink: Arc<dyn FrameSink>,
    roster: Arc<Roster>,
}

impl TelemetryPublisher {
    pub fn new(sink: Arc<dyn FrameSink>, roster: Arc<Roster>) -> Self {
        Self { sink, roster }
    }

    /// Publish this tick's view. Never waits on the network.
    ///
    /// `entities` must all come from the same tick boundary. The same view
    /// becomes the lookup table for inbound commands.
    pub fn on_tick(&self, entities: &[LiveEntity]) -> TickReport {
        self.roster.replace(entities);

        let mut report = TickReport::default();
        for entity in entities {
            if !entity.position.is_finite() {
                debug!("Skipping snapshot of {}: non-finite position", entity.name);
                report.skipped += 1;
                continue;
            }
            let snapshot = PositionSnapshot::new(
                entity.uuid.as_str(),
                entity.name.as_str(),
                entity.position.x,
                entity.position.y,
                entity.position.z,
            );
            let text = match encode_snapshot(&snapshot) {
                Ok(text) => text,
                Err(e) => {
                    debug!("Skipping snapshot of {}: {e}", entity.name);
                    report.skipped += 1;
                    continue;
                }
            };
            match self.sink.send_frame(Frame::Text(text)) {
                Ok(()) => report.queued += 1,
                Err(e) => {
                    trace!("Snapshot of {} dropped: {e}", entity.name);
                    report.dropped += 1;
                }
            }
        }
        report
    }
}
