//! Controller entrypoint: owns the registry, status board, loader, and cycle.

use std::{fmt, sync::Arc, time::Duration};

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use shared_event_bus::EventPublisher;
use shared_logging::{LogLevel, RotationPolicy};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{
    config::ActivationConfig,
    cycle::{AutonomousCycle, TickReport},
    dashboard::{ComponentState, ComponentStatus, DashboardSnapshot, InteractionMode, StatusBoard},
    loader::{
        catalog::{Component, FactoryCatalog},
        DynamicLoader, LoadError,
    },
    registry::{graph::DependencyError, ComponentRegistry, Phase},
    sequencer::{ActivationReport, PhaseSequencer},
    telemetry::ActivationTelemetry,
};

/// Errors that abort activation.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// The component table is malformed.
    #[error(transparent)]
    Registry(#[from] DependencyError),
    /// A critical component could not be loaded.
    #[error("critical component {component} failed to load")]
    CriticalComponent {
        /// Component id.
        component: String,
        /// Load failure.
        source: LoadError,
    },
    /// A critical component's dependency is not active.
    #[error("component {component} blocked: dependency {dependency} is {state}")]
    DependencyNotReady {
        /// Component id.
        component: String,
        /// Dependency id.
        dependency: String,
        /// Dependency state at activation time.
        state: ComponentState,
    },
    /// A phase ended with inactive components under strict validation.
    #[error("phase {phase} failed validation, offline: {}", .offline.join(", "))]
    PhaseValidation {
        /// Phase.
        phase: Phase,
        /// Components that did not come online.
        offline: Vec<String>,
    },
    /// Activation requested while the system is not offline.
    #[error("activation requires an offline system, current state is {0}")]
    InvalidState(ComponentState),
}

/// Builder for [`ActivationController`].
pub struct ActivationControllerBuilder {
    config: ActivationConfig,
    registry: Option<ComponentRegistry>,
    catalog: Option<FactoryCatalog>,
    telemetry: Option<ActivationTelemetry>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
    cycle_interval: Option<Duration>,
}

impl ActivationControllerBuilder {
    /// Starts from `config`.
    #[must_use]
    pub fn new(config: ActivationConfig) -> Self {
        Self {
            config,
            registry: None,
            catalog: None,
            telemetry: None,
            event_publisher: None,
            cycle_interval: None,
        }
    }

    /// Component table. Defaults to [`ComponentRegistry::standard`].
    #[must_use]
    pub fn registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Factory catalog. Defaults to [`FactoryCatalog::builtin`].
    #[must_use]
    pub fn catalog(mut self, catalog: FactoryCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Uses prepared telemetry instead of building it from the config.
    #[must_use]
    pub fn telemetry(mut self, telemetry: ActivationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Event sink for telemetry built from the config.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Overrides the configured cycle interval.
    #[must_use]
    pub const fn cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = Some(interval);
        self
    }

    /// Validates the config and wires the controller.
    pub fn build(self) -> Result<ActivationController> {
        self.config.validate()?;
        let telemetry = match self.telemetry {
            Some(telemetry) => telemetry,
            None => {
                let min_level = if self.config.debug {
                    LogLevel::Debug
                } else {
                    LogLevel::Info
                };
                let mut builder = ActivationTelemetry::builder("activation")
                    .log_path(&self.config.log_path)
                    .rotation(RotationPolicy {
                        max_bytes: self.config.log_max_bytes,
                        keep: self.config.log_keep,
                    })
                    .min_level(min_level);
                if let Some(publisher) = self.event_publisher {
                    builder = builder.event_publisher(publisher);
                }
                builder.build()?
            }
        };
        let registry = Arc::new(self.registry.unwrap_or_else(ComponentRegistry::standard));
        let catalog = Arc::new(self.catalog.unwrap_or_else(FactoryCatalog::builtin));
        let board = StatusBoard::new(
            registry.ids().filter_map(|id| registry.get(id)),
            self.config.health_window,
        );
        let loader = DynamicLoader::new(
            Arc::clone(&registry),
            catalog,
            self.config.components_dir.clone(),
            self.config.load_timeout(),
        );
        let cycle = AutonomousCycle::new(
            board.clone(),
            telemetry.clone(),
            self.cycle_interval
                .unwrap_or_else(|| self.config.cycle_interval()),
            self.config.health_floor,
        );
        Ok(ActivationController {
            session: Uuid::new_v4(),
            config: Arc::new(self.config),
            registry,
            loader,
            board,
            telemetry,
            cycle,
            runner: Mutex::new(None),
            report: RwLock::new(None),
        })
    }
}

struct CycleRunner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns one activation session. No process-wide state: every handle the
/// controller hands out is scoped to it.
pub struct ActivationController {
    session: Uuid,
    config: Arc<ActivationConfig>,
    registry: Arc<ComponentRegistry>,
    loader: DynamicLoader,
    board: StatusBoard,
    telemetry: ActivationTelemetry,
    cycle: AutonomousCycle,
    runner: Mutex<Option<CycleRunner>>,
    report: RwLock<Option<ActivationReport>>,
}

impl fmt::Debug for ActivationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationController")
            .field("session", &self.session)
            .field("system", &self.board.system())
            .field("components", &self.registry.len())
            .field("cycle_running", &self.cycle_running())
            .finish_non_exhaustive()
    }
}

impl ActivationController {
    /// Returns a builder.
    #[must_use]
    pub fn builder(config: ActivationConfig) -> ActivationControllerBuilder {
        ActivationControllerBuilder::new(config)
    }

    /// Wires a controller with the given table and catalog.
    pub fn new(
        config: ActivationConfig,
        registry: ComponentRegistry,
        catalog: FactoryCatalog,
    ) -> Result<Self> {
        Self::builder(config)
            .registry(registry)
            .catalog(catalog)
            .build()
    }

    /// Session id attached to this controller's log records.
    #[must_use]
    pub const fn session(&self) -> Uuid {
        self.session
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ActivationConfig {
        &self.config
    }

    /// Component table.
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Shared status board.
    #[must_use]
    pub const fn board(&self) -> &StatusBoard {
        &self.board
    }

    /// Runs all six phases, then starts the autonomous cycle when
    /// `autonomous_mode` is set. On failure the system is left in `Error`.
    pub async fn activate(&self) -> Result<ActivationReport, ActivationError> {
        let current = self.board.system();
        if current != ComponentState::Offline {
            return Err(ActivationError::InvalidState(current));
        }
        self.board.set_system(ComponentState::Initializing);
        let _ = self.telemetry.log(
            LogLevel::Info,
            "activation.started",
            json!({
                "session": self.session.to_string(),
                "components": self.registry.len(),
                "components_dir": self.loader.components_dir().display().to_string(),
                "interests": self.config.interests,
                "learning_rate": self.config.learning_rate,
                "reasoning_depth": self.config.reasoning_depth,
                "research_scope": self.config.research_scope,
                "personality_style": self.config.personality_style,
                "safety_level": self.config.safety_level,
                "autonomous_mode": self.config.autonomous_mode
            }),
        );

        let mut sequencer = PhaseSequencer::new(
            Arc::clone(&self.registry),
            self.loader.clone(),
            self.board.clone(),
            self.telemetry.clone(),
        )
        .phase_pause(self.config.phase_pause())
        .strict_validation(self.config.strict_phase_validation);

        let report = match sequencer.run().await {
            Ok(report) => report,
            Err(err) => {
                self.board.set_system(ComponentState::Error);
                let _ = self.telemetry.log(
                    LogLevel::Error,
                    "activation.failed",
                    json!({ "session": self.session.to_string(), "error": err.to_string() }),
                );
                let _ = self
                    .telemetry
                    .emit("activation.failed", json!({ "error": err.to_string() }))
                    .await;
                return Err(err);
            }
        };

        if self.config.autonomous_mode {
            self.board.set_system(ComponentState::Autonomous);
            self.start_cycle();
        } else {
            self.board.set_system(ComponentState::Online);
        }

        let snapshot = self.board.snapshot();
        let summary = json!({
            "session": self.session.to_string(),
            "system": snapshot.system_status,
            "online": snapshot.components_online,
            "total": snapshot.components_total,
            "loaded": report.loaded_count(),
            "mocked": report.mocked_count(),
            "failed": report.failed_count(),
            "fully_operational": snapshot.fully_operational()
        });
        let level = if snapshot.fully_operational() {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        let _ = self.telemetry.log(level, "activation.completed", summary.clone());
        let _ = self.telemetry.emit("activation.completed", summary).await;
        *self.report.write() = Some(report.clone());
        Ok(report)
    }

    fn start_cycle(&self) {
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(self.cycle.clone().run(rx));
        if let Some(previous) = self.runner.lock().replace(CycleRunner { shutdown, handle }) {
            let _ = previous.shutdown.send(true);
            previous.handle.abort();
        }
    }

    /// Whether the autonomous cycle task is alive.
    #[must_use]
    pub fn cycle_running(&self) -> bool {
        self.runner
            .lock()
            .as_ref()
            .is_some_and(|runner| !runner.handle.is_finished())
    }

    /// Stops the cycle, waits for it to exit, then stops and releases every
    /// instance. Safe to call more than once.
    pub async fn shutdown(&self) {
        let runner = self.runner.lock().take();
        if let Some(runner) = runner {
            let _ = runner.shutdown.send(true);
            if let Err(err) = runner.handle.await {
                let _ = self.telemetry.log(
                    LogLevel::Warn,
                    "activation.cycle.join_failed",
                    json!({ "error": err.to_string() }),
                );
            }
        }
        let instances = self.board.take_offline();
        for instance in &instances {
            instance.stop();
        }
        let payload = json!({
            "session": self.session.to_string(),
            "stopped": instances.len()
        });
        let _ = self
            .telemetry
            .log(LogLevel::Info, "activation.shutdown", payload.clone());
        let _ = self.telemetry.emit("activation.shutdown", payload).await;
    }

    /// Dashboard snapshot. Reading it changes nothing.
    #[must_use]
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.board.snapshot()
    }

    /// Switches the interaction mode and returns the previous one.
    pub fn set_mode(&self, mode: InteractionMode) -> InteractionMode {
        let previous = self.board.set_mode(mode);
        let _ = self.telemetry.log(
            LogLevel::Info,
            "activation.mode.changed",
            json!({ "from": previous, "to": mode }),
        );
        previous
    }

    /// Runs one probe round immediately, outside the background schedule.
    pub fn tick(&self) -> TickReport {
        self.cycle.tick()
    }

    /// Instance backing a component, mock or loaded.
    #[must_use]
    pub fn instance(&self, id: &str) -> Option<Arc<dyn Component>> {
        self.board.instance(id)
    }

    /// Status of one component.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<ComponentStatus> {
        self.board.status(id)
    }

    /// Report of the last successful activation.
    #[must_use]
    pub fn report(&self) -> Option<ActivationReport> {
        self.report.read().clone()
    }
}

impl Drop for ActivationController {
    fn drop(&mut self) {
        if let Some(runner) = self.runner.get_mut().take() {
            let _ = runner.shutdown.send(true);
            runner.handle.abort();
        }
    }
}
