//! Per-component status map and the dashboard snapshot built from it.

/// Rolling health scores.
pub mod health;

use std::{fmt, path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use health::HealthTracker;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    loader::catalog::Component,
    registry::{ComponentDefinition, Phase},
};

/// Lifecycle state shared by components and the system as a whole.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentState {
    /// Not running.
    Offline,
    /// Being loaded.
    Initializing,
    /// Running.
    Online,
    /// Failed to load or became unhealthy.
    Error,
    /// Running under the autonomous cycle.
    Autonomous,
}

impl ComponentState {
    /// Whether the component serves requests and is probed by the cycle.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Online | Self::Autonomous)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Offline => "OFFLINE",
            Self::Initializing => "INITIALIZING",
            Self::Online => "ONLINE",
            Self::Error => "ERROR",
            Self::Autonomous => "AUTONOMOUS",
        };
        f.write_str(label)
    }
}

/// What backs an active component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backing {
    /// Built from a manifest.
    Loaded {
        /// Factory entry.
        entry: String,
        /// Manifest path.
        source: PathBuf,
    },
    /// Placeholder after a failed load.
    Mock {
        /// Load failure summary.
        reason: String,
    },
}

/// Current interaction mode of the activated system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Dialogue with an operator.
    #[default]
    Conversational,
    /// Research-driven exploration.
    Research,
    /// Focused learning.
    Learning,
    /// Open-ended generation.
    Creative,
    /// Unattended operation.
    Autonomous,
}

/// Mutable status of one component, owned by the [`StatusBoard`].
#[derive(Debug, Clone)]
pub struct ComponentStatus {
    /// Static definition.
    pub definition: ComponentDefinition,
    /// Lifecycle state.
    pub state: ComponentState,
    /// Instance, once loaded or mocked.
    pub instance: Option<Arc<dyn Component>>,
    /// How the instance was obtained.
    pub backing: Option<Backing>,
    /// Last error, if any.
    pub error_message: Option<String>,
    /// When the component went online.
    pub loaded_at: Option<DateTime<Utc>>,
    /// Last successful activity.
    pub last_activity: Option<DateTime<Utc>>,
    /// Probe-derived health.
    pub health: HealthTracker,
    /// Successful probes.
    pub probes_ok: u64,
    /// Failed probes.
    pub probes_failed: u64,
}

impl ComponentStatus {
    fn offline(definition: ComponentDefinition, health_window: usize) -> Self {
        Self {
            definition,
            state: ComponentState::Offline,
            instance: None,
            backing: None,
            error_message: None,
            loaded_at: None,
            last_activity: None,
            health: HealthTracker::new(health_window, 0.0),
            probes_ok: 0,
            probes_failed: 0,
        }
    }

    /// Whether the component runs on a mock.
    #[must_use]
    pub const fn is_mock(&self) -> bool {
        matches!(self.backing, Some(Backing::Mock { .. }))
    }

    /// Current health score.
    #[must_use]
    pub fn health_score(&self) -> f32 {
        self.health.score()
    }

    fn detail(&self) -> ComponentDetail {
        ComponentDetail {
            id: self.definition.id.clone(),
            display_name: self.definition.display_name.clone(),
            phase: self.definition.phase,
            state: self.state,
            backing: self.backing.clone(),
            degraded: self.is_mock(),
            health_score: self.health_score(),
            error_message: self.error_message.clone(),
            loaded_at: self.loaded_at,
            last_activity: self.last_activity,
            probes_ok: self.probes_ok,
            probes_failed: self.probes_failed,
        }
    }
}

/// Serializable per-component view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentDetail {
    /// Component id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Phase.
    pub phase: Phase,
    /// Lifecycle state.
    pub state: ComponentState,
    /// Backing, when active.
    pub backing: Option<Backing>,
    /// Running on a mock.
    pub degraded: bool,
    /// Probe-derived health.
    pub health_score: f32,
    /// Last error.
    pub error_message: Option<String>,
    /// Online since.
    pub loaded_at: Option<DateTime<Utc>>,
    /// Last successful activity.
    pub last_activity: Option<DateTime<Utc>>,
    /// Successful probes.
    pub probes_ok: u64,
    /// Failed probes.
    pub probes_failed: u64,
}

/// Point-in-time dashboard view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardSnapshot {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Overall state.
    pub system_status: ComponentState,
    /// Interaction mode.
    pub mode: InteractionMode,
    /// Active components.
    pub components_online: usize,
    /// Registered components.
    pub components_total: usize,
    /// Active components running on mocks.
    pub components_mocked: usize,
    /// Mean health over active components, zero when none is active.
    pub average_health: f32,
    /// Autonomous cycle ticks so far.
    pub cycle_ticks: u64,
    /// Per-component detail in registry order.
    pub components: IndexMap<String, ComponentDetail>,
}

impl DashboardSnapshot {
    /// True when every component is active and none runs on a mock.
    #[must_use]
    pub fn fully_operational(&self) -> bool {
        self.components_online == self.components_total && self.components_mocked == 0
    }
}

#[derive(Debug)]
struct BoardState {
    system: ComponentState,
    mode: InteractionMode,
    ticks: u64,
    components: IndexMap<String, ComponentStatus>,
}

/// Shared, lock-protected status map. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    health_window: usize,
    inner: Arc<RwLock<BoardState>>,
}

impl StatusBoard {
    /// Creates a board with every definition registered as offline.
    #[must_use]
    pub fn new<'a>(
        definitions: impl IntoIterator<Item = &'a ComponentDefinition>,
        health_window: usize,
    ) -> Self {
        let components = definitions
            .into_iter()
            .map(|def| {
                (
                    def.id.clone(),
                    ComponentStatus::offline(def.clone(), health_window),
                )
            })
            .collect();
        Self {
            health_window,
            inner: Arc::new(RwLock::new(BoardState {
                system: ComponentState::Offline,
                mode: InteractionMode::default(),
                ticks: 0,
                components,
            })),
        }
    }

    /// Overall state.
    #[must_use]
    pub fn system(&self) -> ComponentState {
        self.inner.read().system
    }

    /// Sets the overall state.
    pub fn set_system(&self, state: ComponentState) {
        self.inner.write().system = state;
    }

    /// Current interaction mode.
    #[must_use]
    pub fn mode(&self) -> InteractionMode {
        self.inner.read().mode
    }

    /// Switches the interaction mode and returns the previous one.
    pub fn set_mode(&self, mode: InteractionMode) -> InteractionMode {
        std::mem::replace(&mut self.inner.write().mode, mode)
    }

    /// Cloned status of one component.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<ComponentStatus> {
        self.inner.read().components.get(id).cloned()
    }

    /// State of one component.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<ComponentState> {
        self.inner.read().components.get(id).map(|status| status.state)
    }

    /// Instance of one component.
    #[must_use]
    pub fn instance(&self, id: &str) -> Option<Arc<dyn Component>> {
        self.inner
            .read()
            .components
            .get(id)
            .and_then(|status| status.instance.clone())
    }

    /// Ids of active components with their instances.
    #[must_use]
    pub fn active_instances(&self) -> Vec<(String, Arc<dyn Component>)> {
        self.inner
            .read()
            .components
            .iter()
            .filter(|(_, status)| status.state.is_active())
            .filter_map(|(id, status)| status.instance.clone().map(|inst| (id.clone(), inst)))
            .collect()
    }

    /// Marks a component as loading.
    pub fn mark_initializing(&self, id: &str) {
        if let Some(status) = self.inner.write().components.get_mut(id) {
            status.state = ComponentState::Initializing;
            status.error_message = None;
        }
    }

    /// Marks a component online with its instance.
    pub fn mark_online(&self, id: &str, instance: Arc<dyn Component>, backing: Backing) {
        let now = Utc::now();
        if let Some(status) = self.inner.write().components.get_mut(id) {
            status.health = HealthTracker::new(self.health_window, instance.health());
            status.state = ComponentState::Online;
            status.instance = Some(instance);
            if let Backing::Mock { reason } = &backing {
                status.error_message = Some(reason.clone());
            }
            status.backing = Some(backing);
            status.loaded_at = Some(now);
            status.last_activity = Some(now);
            status.probes_ok = 0;
            status.probes_failed = 0;
        }
    }

    /// Marks a component failed.
    pub fn mark_error(&self, id: &str, message: impl Into<String>) {
        if let Some(status) = self.inner.write().components.get_mut(id) {
            status.state = ComponentState::Error;
            status.error_message = Some(message.into());
        }
    }

    /// Applies a probe outcome. An active component whose health drops below
    /// `floor` moves to `Error`. Returns the resulting state.
    pub fn record_probe(
        &self,
        id: &str,
        outcome: Result<(), String>,
        floor: f32,
    ) -> Option<ComponentState> {
        let mut inner = self.inner.write();
        let status = inner.components.get_mut(id)?;
        if !status.state.is_active() {
            return Some(status.state);
        }
        let score = match outcome {
            Ok(()) => {
                status.probes_ok += 1;
                status.last_activity = Some(Utc::now());
                status.health.record(true)
            }
            Err(reason) => {
                status.probes_failed += 1;
                status.error_message = Some(reason);
                status.health.record(false)
            }
        };
        if score < floor {
            status.state = ComponentState::Error;
            status.error_message = Some(format!(
                "health {score:.2} fell below floor {floor:.2}"
            ));
        }
        Some(status.state)
    }

    /// Counts one autonomous cycle tick and returns the new total.
    pub fn record_tick(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.ticks += 1;
        inner.ticks
    }

    /// Takes every component and the system offline, returning the instances
    /// that were held. Backing and error details are cleared; timestamps and
    /// probe counters are kept.
    pub fn take_offline(&self) -> Vec<Arc<dyn Component>> {
        let mut inner = self.inner.write();
        inner.system = ComponentState::Offline;
        inner
            .components
            .values_mut()
            .filter_map(|status| {
                status.state = ComponentState::Offline;
                status.backing = None;
                status.error_message = None;
                status.instance.take()
            })
            .collect()
    }

    /// Builds a dashboard snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DashboardSnapshot {
        let inner = self.inner.read();
        let components: IndexMap<String, ComponentDetail> = inner
            .components
            .iter()
            .map(|(id, status)| (id.clone(), status.detail()))
            .collect();
        let active: Vec<&ComponentDetail> = components
            .values()
            .filter(|detail| detail.state.is_active())
            .collect();
        let average_health = if active.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let count = active.len() as f32;
            active.iter().map(|detail| detail.health_score).sum::<f32>() / count
        };
        DashboardSnapshot {
            timestamp: Utc::now(),
            system_status: inner.system,
            mode: inner.mode,
            components_online: active.len(),
            components_total: components.len(),
            components_mocked: active.iter().filter(|detail| detail.degraded).count(),
            average_health,
            cycle_ticks: inner.ticks,
            components,
        }
    }
}
