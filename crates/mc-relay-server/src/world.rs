//! Stand-in game host: a few players wandering a flat world, ticked on a
//! dedicated thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mc_relay_core::TelemetryPublisher;
use mc_relay_host_api::{ApplyReport, EntityRegistry, LiveEntity, MutationQueue, Position};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info};

/// Players never wander past this distance from the origin.
pub const WORLD_BORDER: f64 = 1000.0;

/// Largest per-axis move in one tick.
pub const STRIDE: f64 = 0.3;

const SPAWN_Y: f64 = 64.0;

pub struct SimulatedWorld {
    players: Vec<LiveEntity>,
    rng: StdRng,
}

impl SimulatedWorld {
    pub fn new(names: &[String], mut rng: StdRng) -> Self {
        let players = names
            .iter()
            .map(|name| {
                let spawn = Position::new(rng.gen_range(-8.0..8.0), SPAWN_Y, rng.gen_range(-8.0..8.0));
                LiveEntity::new(random_uuid(&mut rng), name.as_str(), spawn)
            })
            .collect();
        Self { players, rng }
    }

    /// Advance one tick of movement.
    pub fn step(&mut self) {
        for player in &mut self.players {
            let p = &mut player.position;
            p.x = (p.x + self.rng.gen_range(-STRIDE..=STRIDE)).clamp(-WORLD_BORDER, WORLD_BORDER);
            p.z = (p.z + self.rng.gen_range(-STRIDE..=STRIDE)).clamp(-WORLD_BORDER, WORLD_BORDER);
        }
    }
}

impl EntityRegistry for SimulatedWorld {
    fn live_entities(&self) -> Vec<LiveEntity> {
        self.players.clone()
    }

    fn set_position(&mut self, uuid: &str, position: Position) -> bool {
        match self.players.iter_mut().find(|p| p.uuid == uuid) {
            Some(player) => {
                player.position = position;
                true
            }
            None => false,
        }
    }
}

fn random_uuid(rng: &mut StdRng) -> String {
    let bits: u128 = rng.gen();
    // Version 4, RFC 4122 variant.
    let bits = (bits & !(0xf << 76) & !(0x3 << 62)) | (0x4 << 76) | (0x2 << 62);
    let hex = format!("{bits:032x}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}

// ─── Tick loop ───────────────────────────────────────────────────────────────

/// The host's single tick context. Sole owner of the world.
pub struct TickLoop {
    world: SimulatedWorld,
    queue: MutationQueue,
    publisher: TelemetryPublisher,
    ticks: u64,
}

impl TickLoop {
    pub fn new(world: SimulatedWorld, queue: MutationQueue, publisher: TelemetryPublisher) -> Self {
        Self {
            world,
            queue,
            publisher,
            ticks: 0,
        }
    }

    /// One tick: queued mutations, then movement, then telemetry from the
    /// resulting view.
    pub fn tick(&mut self) -> ApplyReport {
        let applied = self.queue.apply_pending(&mut self.world);
        self.world.step();
        let view = self.world.live_entities();
        let report = self.publisher.on_tick(&view);
        self.ticks += 1;
        if report.dropped > 0 || report.skipped > 0 {
            debug!(
                "Tick {}: {} queued, {} dropped, {} skipped",
                self.ticks, report.queued, report.dropped, report.skipped
            );
        }
        applied
    }

    /// Tick at `interval` until `stop` is set.
    pub fn run(mut self, interval: Duration, stop: Arc<AtomicBool>) {
        info!(
            "Tick loop started with {} players every {interval:?}",
            self.world.players.len()
        );
        while !stop.load(Ordering::Acquire) {
            let started = Instant::now();
            self.tick();
            std::thread::sleep(interval.saturating_sub(started.elapsed()));
        }
        self.queue.close();
        info!("Tick loop stopped after {} ticks", self.ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_relay_core::Roster;
    use mc_relay_host_api::{mutation_channel, EntityDirectory, MutationScheduler, PendingMutation};
    use mc_relay_transport::{Frame, FrameSink, SendError};
    use rand::SeedableRng;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSink {
        frames: Mutex<Vec<String>>,
    }

    impl FrameSink for FakeSink {
        fn send_frame(&self, frame: Frame) -> Result<(), SendError> {
            if let Frame::Text(text) = frame {
                self.frames.lock().unwrap().push(text);
            }
            Ok(())
        }
    }

    fn world(names: &[&str]) -> SimulatedWorld {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        SimulatedWorld::new(&names, StdRng::seed_from_u64(3))
    }

    #[test]
    fn players_spawn_with_unique_uuids() {
        let world = world(&["Steve", "Alex", "Notch"]);
        let players = world.live_entities();
        assert_eq!(players.len(), 3);
        assert_eq!(players[0].name, "Steve");
        for p in &players {
            assert_eq!(p.uuid.len(), 36);
            assert_eq!(&p.uuid[14..15], "4");
            assert_eq!(p.position.y, SPAWN_Y);
        }
        assert_ne!(players[0].uuid, players[1].uuid);
        assert_ne!(players[1].uuid, players[2].uuid);
    }

    #[test]
    fn walk_stays_bounded() {
        let mut world = world(&["Steve"]);
        let mut previous = world.live_entities()[0].position;
        for _ in 0..10_000 {
            world.step();
            let now = world.live_entities()[0].position;
            assert!((now.x - previous.x).abs() <= STRIDE + 1e-9);
            assert!((now.z - previous.z).abs() <= STRIDE + 1e-9);
            assert!(now.x.abs() <= WORLD_BORDER && now.z.abs() <= WORLD_BORDER);
            previous = now;
        }
    }

    #[test]
    fn set_position_unknown_uuid() {
        let mut world = world(&["Steve"]);
        assert!(!world.set_position("nope", Position::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn tick_applies_mutations_before_publishing() {
        let world = world(&["Steve", "Alex"]);
        let alex = world.live_entities()[1].uuid.clone();
        let (sender, queue) = mutation_channel();
        let sink = Arc::new(FakeSink::default());
        let roster = Arc::new(Roster::new());
        let mut tick_loop = TickLoop::new(
            world,
            queue,
            TelemetryPublisher::new(sink.clone(), roster.clone()),
        );

        sender
            .schedule(PendingMutation::Teleport {
                uuid: alex.clone(),
                name: "Alex".into(),
                position: Position::new(500.0, 80.0, -500.0),
            })
            .unwrap();
        assert_eq!(tick_loop.tick().applied, 1);

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].contains("\"name\":\"Alex\""));
        assert!(frames[1].contains("\"y\":80.00"));

        let seen = roster.find_by_name("Alex").unwrap();
        assert_eq!(seen.uuid, alex);
        assert!((seen.position.x - 500.0).abs() <= STRIDE);
        assert!((seen.position.z + 500.0).abs() <= STRIDE);
    }

    #[test]
    fn run_stops_when_flagged() {
        let (_sender, queue) = mutation_channel();
        let sink = Arc::new(FakeSink::default());
        let tick_loop = TickLoop::new(
            world(&["Steve"]),
            queue,
            TelemetryPublisher::new(sink.clone(), Arc::new(Roster::new())),
        );
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::spawn(move || tick_loop.run(Duration::from_millis(1), flag));
        while sink.frames.lock().unwrap().len() < 3 {
            std::thread::sleep(Duration::from_millis(1));
        }
        stop.store(true, Ordering::Release);
        thread.join().unwrap();
    }
}
