//! Static component table: ids, phases, dependencies, and manifest candidates.

/// Dependency validation and ordering.
pub mod graph;

use std::fmt;

use graph::{activation_order, DependencyError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The six ordered activation phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Memory and cognitive foundations.
    Core,
    /// Learning subsystems.
    Learning,
    /// Reasoning subsystems.
    Reasoning,
    /// Research and exploration.
    Research,
    /// User-facing interaction.
    Interaction,
    /// Top-level autonomous coordination.
    Autonomous,
}

impl Phase {
    /// Every phase in activation order.
    pub const ALL: [Self; 6] = [
        Self::Core,
        Self::Learning,
        Self::Reasoning,
        Self::Research,
        Self::Interaction,
        Self::Autonomous,
    ];

    /// One-based position in the activation order.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Core => 1,
            Self::Learning => 2,
            Self::Reasoning => 3,
            Self::Research => 4,
            Self::Interaction => 5,
            Self::Autonomous => 6,
        }
    }

    /// Phase that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Core => Some(Self::Learning),
            Self::Learning => Some(Self::Reasoning),
            Self::Reasoning => Some(Self::Research),
            Self::Research => Some(Self::Interaction),
            Self::Interaction => Some(Self::Autonomous),
            Self::Autonomous => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Core => "PHASE_1_CORE",
            Self::Learning => "PHASE_2_LEARNING",
            Self::Reasoning => "PHASE_3_REASONING",
            Self::Research => "PHASE_4_RESEARCH",
            Self::Interaction => "PHASE_5_INTERACTION",
            Self::Autonomous => "PHASE_6_AUTONOMOUS",
        };
        f.write_str(label)
    }
}

/// Immutable description of one component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentDefinition {
    /// Unique key.
    pub id: String,
    /// Name shown on the dashboard.
    pub display_name: String,
    /// Phase the component belongs to.
    pub phase: Phase,
    /// Ids that must be online before this component loads.
    pub dependencies: Vec<String>,
    /// Manifest file names searched in order inside the components directory.
    pub candidates: Vec<String>,
    /// Factory names tried, in order, when a manifest does not name one.
    pub entry_aliases: Vec<String>,
    /// When set, a failed load aborts activation instead of falling back to a mock.
    pub critical: bool,
}

impl ComponentDefinition {
    /// Creates a definition searching `<id>.toml` and accepting the `<id>`
    /// and `basic` factories.
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, phase: Phase) -> Self {
        let id = id.into();
        Self {
            candidates: vec![format!("{id}.toml")],
            entry_aliases: vec![id.clone(), "basic".into()],
            id,
            display_name: display_name.into(),
            phase,
            dependencies: Vec::new(),
            critical: false,
        }
    }

    /// Declares dependencies.
    #[must_use]
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Replaces the manifest candidates.
    #[must_use]
    pub fn candidates<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the accepted factory aliases.
    #[must_use]
    pub fn entry_aliases<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry_aliases = names.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the component as critical.
    #[must_use]
    pub const fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

/// Validated, immutable registry of component definitions.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    definitions: IndexMap<String, ComponentDefinition>,
    order: Vec<String>,
}

impl ComponentRegistry {
    /// Builds a registry, rejecting duplicate ids and invalid dependencies.
    pub fn new(
        definitions: impl IntoIterator<Item = ComponentDefinition>,
    ) -> Result<Self, DependencyError> {
        let mut table = IndexMap::new();
        for def in definitions {
            if table.contains_key(&def.id) {
                return Err(DependencyError::Duplicate(def.id));
            }
            table.insert(def.id.clone(), def);
        }
        let order = activation_order(&table)?;
        Ok(Self {
            definitions: table,
            order,
        })
    }

    /// The built-in twelve-component table, two components per phase.
    #[must_use]
    pub fn standard() -> Self {
        let definitions = vec![
            ComponentDefinition::new("memory_network", "Memory Network", Phase::Core)
                .candidates(["enhanced_memory_network.toml", "memory_network.toml"]),
            ComponentDefinition::new(
                "cognitive_architecture",
                "Cognitive Architecture",
                Phase::Core,
            )
            .depends_on(["memory_network"]),
            ComponentDefinition::new("learning_system", "Learning System", Phase::Learning)
                .candidates(["advanced_learning_system.toml", "learning_system.toml"])
                .depends_on(["memory_network"]),
            ComponentDefinition::new("meta_learning", "Meta-Learning System", Phase::Learning)
                .depends_on(["learning_system"]),
            ComponentDefinition::new("reasoning_engine", "Reasoning Engine", Phase::Reasoning)
                .candidates(["advanced_reasoning_engine.toml", "reasoning_engine.toml"])
                .depends_on(["cognitive_architecture"]),
            ComponentDefinition::new("ethical_reasoning", "Ethical Reasoning", Phase::Reasoning)
                .depends_on(["reasoning_engine"]),
            ComponentDefinition::new("research_system", "Research System", Phase::Research)
                .depends_on(["reasoning_engine", "learning_system"]),
            ComponentDefinition::new("curiosity_engine", "Curiosity Engine", Phase::Research)
                .depends_on(["research_system"]),
            ComponentDefinition::new(
                "communication_system",
                "Communication System",
                Phase::Interaction,
            )
            .depends_on(["cognitive_architecture"]),
            ComponentDefinition::new("personality_core", "Personality Core", Phase::Interaction)
                .depends_on(["communication_system"]),
            ComponentDefinition::new(
                "master_orchestrator",
                "Master Orchestrator",
                Phase::Autonomous,
            )
            .depends_on([
                "meta_learning",
                "ethical_reasoning",
                "curiosity_engine",
                "personality_core",
            ]),
            ComponentDefinition::new(
                "autonomous_scheduler",
                "Autonomous Scheduler",
                Phase::Autonomous,
            )
            .depends_on(["master_orchestrator"]),
        ];
        match Self::new(definitions) {
            Ok(registry) => registry,
            Err(err) => unreachable!("standard registry is well formed: {err}"),
        }
    }

    /// Looks up a definition.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ComponentDefinition> {
        self.definitions.get(id)
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Ids in registry order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Ordered listing of phases with their definitions in activation order.
    /// Phases without components are included with an empty list.
    #[must_use]
    pub fn phases(&self) -> Vec<(Phase, Vec<&ComponentDefinition>)> {
        Phase::ALL
            .iter()
            .map(|phase| {
                let members = self
                    .order
                    .iter()
                    .filter_map(|id| self.definitions.get(id))
                    .filter(|def| def.phase == *phase)
                    .collect();
                (*phase, members)
            })
            .collect()
    }
}
