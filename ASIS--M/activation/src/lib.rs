#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! ASIS activation kernel: phased component startup with mock fallback,
//! status tracking, and a background autonomous cycle.

/// Activation configuration snapshot.
#[path = "../config.rs"]
pub mod config;

/// Component registry and dependency graph.
#[path = "../registry/main.rs"]
pub mod registry;

/// Component capability trait, factory catalog, manifests, and the loader.
#[path = "../loader/main.rs"]
pub mod loader;

/// Status board, dashboard snapshots, and health tracking.
#[path = "../dashboard/main.rs"]
pub mod dashboard;

/// Phase sequencer state machine.
#[path = "../sequencer.rs"]
pub mod sequencer;

/// Background autonomous cycle.
#[path = "../cycle.rs"]
pub mod cycle;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Controller entrypoint wiring every part together.
#[path = "../main.rs"]
pub mod controller;

pub use config::{ActivationConfig, SafetyLevel};
pub use controller::{ActivationController, ActivationControllerBuilder, ActivationError};
pub use cycle::{AutonomousCycle, TickReport};
pub use dashboard::{
    health::HealthTracker, Backing, ComponentDetail, ComponentState, ComponentStatus,
    DashboardSnapshot, InteractionMode, StatusBoard,
};
pub use loader::{
    catalog::{Component, ComponentError, FactoryCatalog},
    manifest::ComponentManifest,
    mock::{make_mock, MockComponent},
    DynamicLoader, LoadAttempt, LoadError, LoadedComponent,
};
pub use registry::{
    graph::DependencyError, ComponentDefinition, ComponentRegistry, Phase,
};
pub use sequencer::{ActivationReport, PhaseOutcome, PhaseSequencer, SequencerState};
pub use telemetry::{ActivationTelemetry, ActivationTelemetryBuilder};
