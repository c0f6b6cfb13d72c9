//! Phase-by-phase activation state machine.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use tokio::time::sleep;

use crate::{
    controller::ActivationError,
    dashboard::{Backing, ComponentState, StatusBoard},
    loader::{mock::make_mock, DynamicLoader},
    registry::{ComponentDefinition, ComponentRegistry, Phase},
    telemetry::ActivationTelemetry,
};

/// Where the sequencer currently is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SequencerState {
    /// Not started.
    Idle,
    /// Processing a phase.
    Phase(Phase),
    /// Every phase completed.
    Complete,
    /// Aborted.
    Failed,
}

/// Result of one phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseOutcome {
    /// Phase.
    pub phase: Phase,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub completed_at: DateTime<Utc>,
    /// Components built from manifests.
    pub loaded: Vec<String>,
    /// Components running on mocks.
    pub mocked: Vec<String>,
    /// Components left in `Error`.
    pub failed: Vec<String>,
    /// Whether every component of the phase ended up online.
    pub validated: bool,
}

/// Summary of a completed activation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationReport {
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub completed_at: DateTime<Utc>,
    /// Outcomes in phase order.
    pub phases: Vec<PhaseOutcome>,
}

impl ActivationReport {
    /// Components built from manifests across all phases.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.loaded.len()).sum()
    }

    /// Components running on mocks across all phases.
    #[must_use]
    pub fn mocked_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.mocked.len()).sum()
    }

    /// Components left in `Error` across all phases.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.failed.len()).sum()
    }
}

/// Drives components through the six phases in order.
#[derive(Debug)]
pub struct PhaseSequencer {
    registry: Arc<ComponentRegistry>,
    loader: DynamicLoader,
    board: StatusBoard,
    telemetry: ActivationTelemetry,
    phase_pause: Duration,
    strict_validation: bool,
    state: SequencerState,
}

impl PhaseSequencer {
    /// Creates an idle sequencer.
    #[must_use]
    pub fn new(
        registry: Arc<ComponentRegistry>,
        loader: DynamicLoader,
        board: StatusBoard,
        telemetry: ActivationTelemetry,
    ) -> Self {
        Self {
            registry,
            loader,
            board,
            telemetry,
            phase_pause: Duration::ZERO,
            strict_validation: false,
            state: SequencerState::Idle,
        }
    }

    /// Cosmetic pause between phases.
    #[must_use]
    pub const fn phase_pause(mut self, pause: Duration) -> Self {
        self.phase_pause = pause;
        self
    }

    /// Abort instead of warning when a phase fails validation.
    #[must_use]
    pub const fn strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SequencerState {
        self.state
    }

    /// Activates every phase in order. Non-critical load failures fall back to
    /// mocks; a critical failure or strict validation failure aborts.
    pub async fn run(&mut self) -> Result<ActivationReport, ActivationError> {
        let started_at = Utc::now();
        let mut phases = Vec::with_capacity(Phase::ALL.len());
        let registry = Arc::clone(&self.registry);
        for (phase, members) in registry.phases() {
            self.state = SequencerState::Phase(phase);
            match self.run_phase(phase, &members).await {
                Ok(outcome) => phases.push(outcome),
                Err(err) => {
                    self.state = SequencerState::Failed;
                    return Err(err);
                }
            }
            if phase.next().is_some() && !self.phase_pause.is_zero() {
                sleep(self.phase_pause).await;
            }
        }
        self.state = SequencerState::Complete;
        Ok(ActivationReport {
            started_at,
            completed_at: Utc::now(),
            phases,
        })
    }

    async fn run_phase(
        &self,
        phase: Phase,
        members: &[&ComponentDefinition],
    ) -> Result<PhaseOutcome, ActivationError> {
        let started_at = Utc::now();
        let _ = self.telemetry.log(
            LogLevel::Info,
            "activation.phase.started",
            json!({ "phase": phase.to_string(), "components": members.len() }),
        );
        let _ = self
            .telemetry
            .emit(
                "activation.phase.started",
                json!({ "phase": phase.to_string() }),
            )
            .await;

        let mut outcome = PhaseOutcome {
            phase,
            started_at,
            completed_at: started_at,
            loaded: Vec::new(),
            mocked: Vec::new(),
            failed: Vec::new(),
            validated: false,
        };

        for definition in members {
            self.activate_component(definition, &mut outcome).await?;
        }

        let offline: Vec<String> = members
            .iter()
            .filter(|def| {
                !self
                    .board
                    .state(&def.id)
                    .is_some_and(ComponentState::is_active)
            })
            .map(|def| def.id.clone())
            .collect();
        outcome.validated = offline.is_empty();
        outcome.completed_at = Utc::now();

        if !outcome.validated {
            let _ = self.telemetry.log(
                LogLevel::Warn,
                "activation.phase.validation_failed",
                json!({ "phase": phase.to_string(), "offline": offline }),
            );
            if self.strict_validation {
                return Err(ActivationError::PhaseValidation { phase, offline });
            }
        }

        let _ = self.telemetry.log(
            LogLevel::Info,
            "activation.phase.completed",
            json!({
                "phase": phase.to_string(),
                "loaded": outcome.loaded.len(),
                "mocked": outcome.mocked.len(),
                "failed": outcome.failed.len(),
                "validated": outcome.validated
            }),
        );
        let _ = self
            .telemetry
            .emit(
                "activation.phase.completed",
                json!({
                    "phase": phase.to_string(),
                    "loaded": outcome.loaded,
                    "mocked": outcome.mocked,
                    "failed": outcome.failed
                }),
            )
            .await;
        Ok(outcome)
    }

    async fn activate_component(
        &self,
        definition: &ComponentDefinition,
        outcome: &mut PhaseOutcome,
    ) -> Result<(), ActivationError> {
        let id = definition.id.as_str();
        self.board.mark_initializing(id);

        if let Some((dependency, state)) = self.unready_dependency(definition) {
            let message = format!("dependency {dependency} is {state}");
            self.board.mark_error(id, message.clone());
            let _ = self.telemetry.log(
                LogLevel::Error,
                "activation.component.blocked",
                json!({ "component": id, "dependency": dependency, "state": state }),
            );
            if definition.critical {
                return Err(ActivationError::DependencyNotReady {
                    component: id.to_string(),
                    dependency,
                    state,
                });
            }
            outcome.failed.push(id.to_string());
            return Ok(());
        }

        match self.loader.load_bounded(id).await {
            Ok(loaded) => {
                let entry = loaded.entry.clone();
                let source = loaded.source.clone();
                self.board.mark_online(
                    id,
                    loaded.instance,
                    Backing::Loaded {
                        entry: entry.clone(),
                        source: source.clone(),
                    },
                );
                outcome.loaded.push(id.to_string());
                let payload = json!({
                    "component": id,
                    "entry": entry,
                    "source": source.display().to_string()
                });
                let _ = self
                    .telemetry
                    .log(LogLevel::Info, "activation.component.online", payload.clone());
                let _ = self
                    .telemetry
                    .emit("activation.component.online", payload)
                    .await;
            }
            Err(err) if definition.critical => {
                self.board.mark_error(id, err.to_string());
                let _ = self.telemetry.log(
                    LogLevel::Error,
                    "activation.component.critical_failure",
                    json!({ "component": id, "error": err.to_string() }),
                );
                return Err(ActivationError::CriticalComponent {
                    component: id.to_string(),
                    source: err,
                });
            }
            Err(err) => {
                let reason = err.to_string();
                self.board.mark_online(
                    id,
                    make_mock(id, reason.clone()),
                    Backing::Mock {
                        reason: reason.clone(),
                    },
                );
                outcome.mocked.push(id.to_string());
                let payload = json!({ "component": id, "reason": reason });
                let _ = self
                    .telemetry
                    .log(LogLevel::Warn, "activation.component.mocked", payload.clone());
                let _ = self
                    .telemetry
                    .emit("activation.component.mocked", payload)
                    .await;
            }
        }
        Ok(())
    }

    fn unready_dependency(&self, definition: &ComponentDefinition) -> Option<(String, ComponentState)> {
        definition.dependencies.iter().find_map(|dep| {
            let state = self.board.state(dep).unwrap_or(ComponentState::Offline);
            (!state.is_active()).then(|| (dep.clone(), state))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{catalog::FactoryCatalog, LoadError};
    use shared_event_bus::MemoryEventBus;
    use std::fs;
    use tempfile::tempdir;

    fn sequencer(
        registry: ComponentRegistry,
        dir: &std::path::Path,
        bus: Option<Arc<MemoryEventBus>>,
    ) -> (PhaseSequencer, StatusBoard) {
        let registry = Arc::new(registry);
        let board = StatusBoard::new(registry.ids().filter_map(|id| registry.get(id)), 4);
        let loader = DynamicLoader::new(
            Arc::clone(&registry),
            Arc::new(FactoryCatalog::builtin()),
            dir,
            Duration::from_secs(2),
        );
        let telemetry = match bus {
            Some(bus) => ActivationTelemetry::builder("sequencer-test")
                .event_publisher(bus)
                .build()
                .unwrap(),
            None => ActivationTelemetry::disabled("sequencer-test"),
        };
        let board_handle = board.clone();
        (
            PhaseSequencer::new(registry, loader, board, telemetry),
            board_handle,
        )
    }

    #[tokio::test]
    async fn phases_run_in_order_with_mocks_and_loads() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("reasoning_engine.toml"), "entry = \"basic\"\n").unwrap();
        let registry = ComponentRegistry::new(vec![
            ComponentDefinition::new("reasoning_engine", "Reasoning", Phase::Reasoning),
            ComponentDefinition::new("memory_network", "Memory", Phase::Core),
        ])
        .unwrap();
        let bus = Arc::new(MemoryEventBus::new(64));
        let (mut sequencer, board) = sequencer(registry, dir.path(), Some(bus.clone()));
        let report = sequencer.run().await.unwrap();

        assert_eq!(sequencer.state(), SequencerState::Complete);
        assert_eq!(report.phases.len(), 6);
        assert_eq!(report.phases[0].mocked, vec!["memory_network".to_string()]);
        assert_eq!(report.phases[2].loaded, vec!["reasoning_engine".to_string()]);
        assert!(report.phases.iter().all(|phase| phase.validated));

        let memory = board.status("memory_network").unwrap();
        let reasoning = board.status("reasoning_engine").unwrap();
        assert!(memory.loaded_at.unwrap() <= reasoning.loaded_at.unwrap());
        assert_eq!(bus.events_with_prefix("activation.phase.completed").len(), 6);
    }

    #[tokio::test]
    async fn critical_failure_aborts() {
        let dir = tempdir().unwrap();
        let registry = ComponentRegistry::new(vec![
            ComponentDefinition::new("memory_network", "Memory", Phase::Core).critical(true),
            ComponentDefinition::new("learning_system", "Learning", Phase::Learning),
        ])
        .unwrap();
        let (mut sequencer, board) = sequencer(registry, dir.path(), None);
        let err = sequencer.run().await.unwrap_err();
        assert!(matches!(
            err,
            ActivationError::CriticalComponent {
                source: LoadError::Exhausted { .. },
                ..
            }
        ));
        assert_eq!(sequencer.state(), SequencerState::Failed);
        assert_eq!(board.state("memory_network"), Some(ComponentState::Error));
        assert_eq!(board.state("learning_system"), Some(ComponentState::Offline));
    }

    #[tokio::test]
    async fn dependents_wait_for_dependencies() {
        let dir = tempdir().unwrap();
        let registry = ComponentRegistry::new(vec![
            ComponentDefinition::new("memory_network", "Memory", Phase::Core),
            ComponentDefinition::new("learning_system", "Learning", Phase::Learning)
                .depends_on(["memory_network"]),
        ])
        .unwrap();
        let (sequencer, board) = sequencer(registry.clone(), dir.path(), None);
        let mut outcome = PhaseOutcome {
            phase: Phase::Learning,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            loaded: Vec::new(),
            mocked: Vec::new(),
            failed: Vec::new(),
            validated: false,
        };
        let learning = registry.get("learning_system").unwrap();
        sequencer
            .activate_component(learning, &mut outcome)
            .await
            .unwrap();
        assert_eq!(outcome.failed, vec!["learning_system".to_string()]);
        assert_eq!(board.state("learning_system"), Some(ComponentState::Error));
    }

    #[tokio::test]
    async fn critical_dependent_aborts_when_dependency_is_down() {
        let dir = tempdir().unwrap();
        let registry = ComponentRegistry::new(vec![
            ComponentDefinition::new("memory_network", "Memory", Phase::Core),
            ComponentDefinition::new("learning_system", "Learning", Phase::Learning)
                .depends_on(["memory_network"])
                .critical(true),
        ])
        .unwrap();
        let (sequencer, board) = sequencer(registry.clone(), dir.path(), None);
        board.mark_error("memory_network", "forced");
        let mut outcome = PhaseOutcome {
            phase: Phase::Learning,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            loaded: Vec::new(),
            mocked: Vec::new(),
            failed: Vec::new(),
            validated: false,
        };
        let learning = registry.get("learning_system").unwrap();
        let err = sequencer
            .activate_component(learning, &mut outcome)
            .await
            .unwrap_err();
        match err {
            ActivationError::DependencyNotReady {
                component,
                dependency,
                state,
            } => {
                assert_eq!(component, "learning_system");
                assert_eq!(dependency, "memory_network");
                assert_eq!(state, ComponentState::Error);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(outcome.failed.is_empty());
        assert_eq!(board.state("learning_system"), Some(ComponentState::Error));
    }

    #[tokio::test]
    async fn strict_validation_rejects_blocked_components() {
        let dir = tempdir().unwrap();
        let registry = ComponentRegistry::new(vec![
            ComponentDefinition::new("memory_network", "Memory", Phase::Core),
            ComponentDefinition::new("cognitive_architecture", "Cognitive", Phase::Core)
                .depends_on(["memory_network"]),
        ])
        .unwrap();
        let (sequencer, board) = sequencer(registry.clone(), dir.path(), None);
        let sequencer = sequencer.strict_validation(true);
        board.mark_error("memory_network", "forced");
        let cognitive = registry.get("cognitive_architecture").unwrap();
        let err = sequencer
            .run_phase(Phase::Core, &[cognitive])
            .await
            .unwrap_err();
        match err {
            ActivationError::PhaseValidation { phase, offline } => {
                assert_eq!(phase, Phase::Core);
                assert_eq!(offline, vec!["cognitive_architecture".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
