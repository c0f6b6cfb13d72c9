//! Dependency graph checks and ordering (Kahn's algorithm).

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use thiserror::Error;

use super::{ComponentDefinition, Phase};

/// Reasons a registry is rejected before anything is loaded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    /// Two definitions share an id.
    #[error("duplicate component id: {0}")]
    Duplicate(String),
    /// A dependency names an id that is not registered.
    #[error("component {component} depends on unknown component {dependency}")]
    MissingDependency {
        /// Dependent component.
        component: String,
        /// Unknown id.
        dependency: String,
    },
    /// The dependency declarations contain a cycle.
    #[error("circular dependency among: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    /// A component depends on something activated in a later phase.
    #[error("component {component} ({phase}) depends on {dependency} from later phase {dependency_phase}")]
    PhaseInversion {
        /// Dependent component.
        component: String,
        /// Phase of the dependent.
        phase: Phase,
        /// Dependency id.
        dependency: String,
        /// Phase of the dependency.
        dependency_phase: Phase,
    },
}

/// Validates the declarations and returns ids in activation order: dependencies
/// first, ties broken by phase and then registry position.
pub(crate) fn activation_order(
    definitions: &IndexMap<String, ComponentDefinition>,
) -> Result<Vec<String>, DependencyError> {
    for (id, def) in definitions {
        for dep in &def.dependencies {
            let Some(target) = definitions.get(dep) else {
                return Err(DependencyError::MissingDependency {
                    component: id.clone(),
                    dependency: dep.clone(),
                });
            };
            if target.phase > def.phase {
                return Err(DependencyError::PhaseInversion {
                    component: id.clone(),
                    phase: def.phase,
                    dependency: dep.clone(),
                    dependency_phase: target.phase,
                });
            }
        }
    }

    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(definitions.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (id, def) in definitions {
        let unique: BTreeSet<&str> = def.dependencies.iter().map(String::as_str).collect();
        in_degree.insert(id.as_str(), unique.len());
        for dep in unique {
            dependents.entry(dep).or_default().push(id.as_str());
        }
    }

    let ranks: HashMap<&str, (Phase, usize)> = definitions
        .iter()
        .enumerate()
        .map(|(index, (id, def))| (id.as_str(), (def.phase, index)))
        .collect();

    let mut ready: BTreeSet<(Phase, usize)> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .filter_map(|(id, _)| ranks.get(id).copied())
        .collect();
    let mut order = Vec::with_capacity(definitions.len());

    while let Some(next) = ready.pop_first() {
        let Some((id, _)) = definitions.get_index(next.1) else {
            continue;
        };
        order.push(id.clone());
        for dependent in dependents.get(id.as_str()).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    if let Some(rank) = ranks.get(dependent) {
                        ready.insert(*rank);
                    }
                }
            }
        }
    }

    if order.len() != definitions.len() {
        let stuck = definitions
            .keys()
            .filter(|id| !order.contains(*id))
            .cloned()
            .collect();
        return Err(DependencyError::Cycle(stuck));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(defs: Vec<ComponentDefinition>) -> IndexMap<String, ComponentDefinition> {
        defs.into_iter().map(|def| (def.id.clone(), def)).collect()
    }

    #[test]
    fn dependencies_precede_dependents_within_phase() {
        let defs = table(vec![
            ComponentDefinition::new("b", "B", Phase::Core).depends_on(["a"]),
            ComponentDefinition::new("a", "A", Phase::Core),
            ComponentDefinition::new("c", "C", Phase::Learning),
        ]);
        let order = activation_order(&defs).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn keeps_registry_order_without_dependencies() {
        let defs = table(vec![
            ComponentDefinition::new("z", "Z", Phase::Reasoning),
            ComponentDefinition::new("y", "Y", Phase::Core),
            ComponentDefinition::new("x", "X", Phase::Core),
        ]);
        assert_eq!(activation_order(&defs).unwrap(), vec!["y", "x", "z"]);
    }

    #[test]
    fn detects_cycles() {
        let defs = table(vec![
            ComponentDefinition::new("a", "A", Phase::Core).depends_on(["b"]),
            ComponentDefinition::new("b", "B", Phase::Core).depends_on(["a"]),
            ComponentDefinition::new("c", "C", Phase::Core),
        ]);
        let err = activation_order(&defs).unwrap_err();
        assert_eq!(err, DependencyError::Cycle(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn rejects_unknown_and_later_phase_dependencies() {
        let missing = table(vec![
            ComponentDefinition::new("a", "A", Phase::Core).depends_on(["ghost"])
        ]);
        assert!(matches!(
            activation_order(&missing),
            Err(DependencyError::MissingDependency { .. })
        ));

        let inverted = table(vec![
            ComponentDefinition::new("early", "Early", Phase::Core).depends_on(["late"]),
            ComponentDefinition::new("late", "Late", Phase::Autonomous),
        ]);
        assert!(matches!(
            activation_order(&inverted),
            Err(DependencyError::PhaseInversion { .. })
        ));
    }
}
