//! Background loop probing active components after activation.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use tokio::{sync::watch, time::sleep};

use crate::{
    dashboard::{ComponentState, StatusBoard},
    telemetry::ActivationTelemetry,
};

/// Labels rotated through tick by tick. Informational only.
pub const FOCUS_LABELS: [&str; 6] = [
    "consolidation",
    "exploration",
    "reflection",
    "integration",
    "calibration",
    "synthesis",
];

/// Multiplier applied to the interval after a tick fails.
const PANIC_BACKOFF: u32 = 3;

/// Probe failure recorded when `status()` panics.
const PROBE_PANICKED: &str = "probe panicked";

/// What one tick observed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickReport {
    /// One-based tick counter.
    pub tick: u64,
    /// Focus label for this tick.
    pub focus: String,
    /// Components probed.
    pub probed: usize,
    /// Components still active after their probe.
    pub healthy: usize,
    /// Components moved to `Error` by this tick.
    pub errored: Vec<String>,
    /// When the tick ran.
    pub at: DateTime<Utc>,
}

/// Periodic health prober. Cheap to clone; clones share the status board.
#[derive(Debug, Clone)]
pub struct AutonomousCycle {
    board: StatusBoard,
    telemetry: ActivationTelemetry,
    interval: Duration,
    health_floor: f32,
}

impl AutonomousCycle {
    /// Creates a cycle over `board`.
    #[must_use]
    pub const fn new(
        board: StatusBoard,
        telemetry: ActivationTelemetry,
        interval: Duration,
        health_floor: f32,
    ) -> Self {
        Self {
            board,
            telemetry,
            interval,
            health_floor,
        }
    }

    /// Interval between ticks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one probe round over every active component on the calling
    /// thread. Probes run without holding the status lock, and a probe that
    /// panics counts as a failed probe.
    pub fn tick(&self) -> TickReport {
        let tick = self.board.record_tick();
        let slot = usize::try_from(tick.saturating_sub(1)).unwrap_or_default() % FOCUS_LABELS.len();
        let focus = FOCUS_LABELS[slot];
        let mut report = TickReport {
            tick,
            focus: focus.to_string(),
            probed: 0,
            healthy: 0,
            errored: Vec::new(),
            at: Utc::now(),
        };

        for (id, instance) in self.board.active_instances() {
            let outcome = match catch_unwind(AssertUnwindSafe(|| instance.status())) {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(err)) => Err(err.to_string()),
                Err(_) => Err(PROBE_PANICKED.to_string()),
            };
            report.probed += 1;
            match self.board.record_probe(&id, outcome, self.health_floor) {
                Some(ComponentState::Error) => {
                    let _ = self.telemetry.log(
                        LogLevel::Warn,
                        "activation.component.unhealthy",
                        json!({ "component": id, "tick": tick }),
                    );
                    report.errored.push(id);
                }
                Some(_) => report.healthy += 1,
                None => {}
            }
        }

        let _ = self.telemetry.log(
            LogLevel::Debug,
            "activation.cycle.tick",
            json!({
                "tick": tick,
                "focus": focus,
                "probed": report.probed,
                "healthy": report.healthy,
                "errored": report.errored
            }),
        );
        let _ = self.telemetry.event(
            "activation.cycle.tick",
            json!({ "tick": tick, "healthy": report.healthy, "errored": report.errored.len() }),
        );
        report
    }

    /// Ticks every interval until `shutdown` flips to `true` or its sender is
    /// dropped. Each tick runs on the blocking pool; a tick that fails is
    /// logged and followed by a longer pause.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut delay = self.interval;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                () = sleep(delay) => {}
            }
            let cycle = self.clone();
            match tokio::task::spawn_blocking(move || cycle.tick()).await {
                Ok(_) => delay = self.interval,
                Err(err) => {
                    let _ = self.telemetry.log(
                        LogLevel::Error,
                        "activation.cycle.tick_failed",
                        json!({
                            "error": err.to_string(),
                            "backoff_ms": (self.interval * PANIC_BACKOFF).as_millis()
                        }),
                    );
                    delay = self.interval * PANIC_BACKOFF;
                }
            }
        }
        let _ = self.telemetry.log(
            LogLevel::Info,
            "activation.cycle.stopped",
            json!({ "ticks": self.board.snapshot().cycle_ticks }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dashboard::Backing,
        loader::{
            catalog::{Component, ComponentError},
            mock::make_mock,
        },
        registry::{ComponentDefinition, Phase},
    };
    use serde_json::Value;
    use std::{any::Any, sync::Arc};

    #[derive(Debug)]
    struct Exploding;

    impl Component for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }
        fn status(&self) -> Result<String, ComponentError> {
            panic!("probe exploded")
        }
        fn process(&self, _input: &Value) -> Result<String, ComponentError> {
            Ok(String::new())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn board() -> StatusBoard {
        let defs = vec![
            ComponentDefinition::new("memory_network", "Memory", Phase::Core),
            ComponentDefinition::new("curiosity_engine", "Curiosity", Phase::Research),
        ];
        let board = StatusBoard::new(&defs, 4);
        board.mark_online(
            "memory_network",
            make_mock("memory_network", "missing"),
            Backing::Mock {
                reason: "missing".into(),
            },
        );
        board
    }

    fn cycle(board: &StatusBoard, interval: Duration) -> AutonomousCycle {
        AutonomousCycle::new(
            board.clone(),
            ActivationTelemetry::disabled("cycle-test"),
            interval,
            0.7,
        )
    }

    #[test]
    fn tick_probes_only_active_components() {
        let board = board();
        let report = cycle(&board, Duration::from_secs(5)).tick();
        assert_eq!(report.tick, 1);
        assert_eq!(report.focus, "consolidation");
        assert_eq!(report.probed, 1);
        assert_eq!(report.healthy, 1);
        let status = board.status("memory_network").unwrap();
        assert_eq!(status.probes_ok, 1);
        assert_eq!(
            board.status("curiosity_engine").unwrap().last_activity,
            None
        );
    }

    #[test]
    fn focus_rotates_with_ticks() {
        let board = board();
        let cycle = cycle(&board, Duration::from_secs(5));
        let labels: Vec<String> = (0..7).map(|_| cycle.tick().focus).collect();
        assert_eq!(labels[1], "exploration");
        assert_eq!(labels[6], labels[0]);
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown_signal() {
        let board = board();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(cycle(&board, Duration::from_millis(10)).run(rx));
        sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
        let ticks = board.snapshot().cycle_ticks;
        assert!(ticks >= 1);
        sleep(Duration::from_millis(30)).await;
        assert_eq!(board.snapshot().cycle_ticks, ticks);
    }

    #[test]
    fn panicking_component_fails_its_probe_and_others_still_run() {
        let defs = vec![
            ComponentDefinition::new("curiosity_engine", "Curiosity", Phase::Core),
            ComponentDefinition::new("memory_network", "Memory", Phase::Core),
        ];
        let board = StatusBoard::new(&defs, 4);
        board.mark_online(
            "curiosity_engine",
            Arc::new(Exploding),
            Backing::Loaded {
                entry: "exploding".into(),
                source: "exploding.toml".into(),
            },
        );
        board.mark_online(
            "memory_network",
            make_mock("memory_network", "missing"),
            Backing::Mock {
                reason: "missing".into(),
            },
        );

        let report = cycle(&board, Duration::from_secs(5)).tick();
        assert_eq!(report.probed, 2);
        assert_eq!(report.errored, vec!["curiosity_engine".to_string()]);

        let exploding = board.status("curiosity_engine").unwrap();
        assert_eq!(exploding.state, ComponentState::Error);
        assert_eq!(exploding.probes_failed, 1);
        assert!(exploding.health_score() < 0.7);
        assert_eq!(board.status("memory_network").unwrap().probes_ok, 1);
    }

    #[tokio::test]
    async fn loop_keeps_ticking_past_a_panicking_component() {
        let board = board();
        board.mark_online(
            "curiosity_engine",
            Arc::new(Exploding),
            Backing::Loaded {
                entry: "exploding".into(),
                source: "exploding.toml".into(),
            },
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(cycle(&board, Duration::from_millis(5)).run(rx));
        sleep(Duration::from_millis(80)).await;
        assert!(!handle.is_finished());
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(board.snapshot().cycle_ticks >= 2);
        assert_eq!(board.state("curiosity_engine"), Some(ComponentState::Error));
        assert!(board.status("memory_network").unwrap().probes_ok >= 2);
    }
}
