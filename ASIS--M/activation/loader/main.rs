//! Component loading: manifest lookup, factory resolution, and mock fallback.

/// Capability trait and factory catalog.
pub mod catalog;
/// Manifest file format.
pub mod manifest;
/// Placeholder components.
pub mod mock;

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use catalog::{Component, FactoryCatalog};
use manifest::ComponentManifest;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::registry::{ComponentDefinition, ComponentRegistry};

/// One candidate that was tried and rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadAttempt {
    /// Manifest path.
    pub candidate: PathBuf,
    /// Why it was rejected.
    pub reason: String,
}

/// Load failures. Callers decide between mocking and aborting.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The id is not in the registry.
    #[error("component {0} is not registered")]
    UnknownComponent(String),
    /// No candidate manifest produced a running instance.
    #[error("no loadable candidate for {component}: {}", describe_attempts(.attempts))]
    Exhausted {
        /// Component id.
        component: String,
        /// Rejected candidates, empty when no manifest exists.
        attempts: Vec<LoadAttempt>,
    },
    /// Loading exceeded the configured timeout.
    #[error("loading {component} timed out after {timeout:?}")]
    TimedOut {
        /// Component id.
        component: String,
        /// Applied timeout.
        timeout: Duration,
    },
    /// A factory panicked.
    #[error("loading {component} panicked: {reason}")]
    Panicked {
        /// Component id.
        component: String,
        /// Join error text.
        reason: String,
    },
}

fn describe_attempts(attempts: &[LoadAttempt]) -> String {
    if attempts.is_empty() {
        return "no manifest found".into();
    }
    attempts
        .iter()
        .map(|attempt| format!("{}: {}", attempt.candidate.display(), attempt.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A successfully constructed and started component.
#[derive(Clone)]
pub struct LoadedComponent {
    /// Running instance.
    pub instance: Arc<dyn Component>,
    /// Factory entry that built it.
    pub entry: String,
    /// Manifest it came from.
    pub source: PathBuf,
}

impl fmt::Debug for LoadedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedComponent")
            .field("name", &self.instance.name())
            .field("entry", &self.entry)
            .field("source", &self.source)
            .finish()
    }
}

/// Resolves component ids to running instances using manifests on disk.
#[derive(Debug, Clone)]
pub struct DynamicLoader {
    registry: Arc<ComponentRegistry>,
    catalog: Arc<FactoryCatalog>,
    components_dir: PathBuf,
    timeout: Duration,
}

impl DynamicLoader {
    /// Creates a loader reading manifests from `components_dir`.
    #[must_use]
    pub fn new(
        registry: Arc<ComponentRegistry>,
        catalog: Arc<FactoryCatalog>,
        components_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            catalog,
            components_dir: components_dir.into(),
            timeout,
        }
    }

    /// Directory searched for manifests.
    #[must_use]
    pub fn components_dir(&self) -> &Path {
        &self.components_dir
    }

    /// Loads a component synchronously. Candidates are tried in declaration
    /// order; the first that parses, resolves to a registered factory,
    /// constructs, and starts wins. There are no retries.
    pub fn load(&self, component_id: &str) -> Result<LoadedComponent, LoadError> {
        let definition = self
            .registry
            .get(component_id)
            .ok_or_else(|| LoadError::UnknownComponent(component_id.to_string()))?;
        let mut attempts = Vec::new();
        for name in &definition.candidates {
            let path = self.components_dir.join(name);
            if !path.is_file() {
                continue;
            }
            match self.try_candidate(definition, &path) {
                Ok(loaded) => {
                    debug!(component = component_id, entry = %loaded.entry, "component constructed");
                    return Ok(loaded);
                }
                Err(reason) => {
                    debug!(component = component_id, candidate = %path.display(), %reason, "candidate rejected");
                    attempts.push(LoadAttempt {
                        candidate: path,
                        reason,
                    });
                }
            }
        }
        Err(LoadError::Exhausted {
            component: component_id.to_string(),
            attempts,
        })
    }

    /// Runs [`DynamicLoader::load`] on the blocking pool, bounded by the timeout.
    /// A timed-out load keeps running in the background; if it still produces
    /// an instance, that instance is stopped and dropped.
    pub async fn load_bounded(&self, component_id: &str) -> Result<LoadedComponent, LoadError> {
        let loader = self.clone();
        let id = component_id.to_string();
        let mut task = tokio::task::spawn_blocking(move || loader.load(&id));
        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(LoadError::Panicked {
                component: component_id.to_string(),
                reason: join.to_string(),
            }),
            Err(_) => {
                let component = component_id.to_string();
                tokio::spawn(async move {
                    if let Ok(Ok(late)) = task.await {
                        late.instance.stop();
                        debug!(component = %component, entry = %late.entry, "stopped late load");
                    }
                });
                Err(LoadError::TimedOut {
                    component: component_id.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }

    fn try_candidate(
        &self,
        definition: &ComponentDefinition,
        path: &Path,
    ) -> Result<LoadedComponent, String> {
        let manifest = ComponentManifest::load(path).map_err(|err| format!("{err:#}"))?;
        if let Some(provides) = &manifest.provides {
            if provides != &definition.id {
                return Err(format!("manifest provides {provides}, not {}", definition.id));
            }
        }
        let entry = self.resolve_entry(definition, &manifest)?;
        let instance = self
            .catalog
            .build(&entry, &manifest)
            .ok_or_else(|| format!("entry {entry} is not registered"))?
            .map_err(|err| err.to_string())?;
        instance.start().map_err(|err| err.to_string())?;
        Ok(LoadedComponent {
            instance,
            entry,
            source: path.to_path_buf(),
        })
    }

    fn resolve_entry(
        &self,
        definition: &ComponentDefinition,
        manifest: &ComponentManifest,
    ) -> Result<String, String> {
        if let Some(entry) = &manifest.entry {
            return Ok(entry.clone());
        }
        definition
            .entry_aliases
            .iter()
            .find(|alias| self.catalog.contains(alias))
            .cloned()
            .ok_or_else(|| {
                format!(
                    "manifest names no entry and none of [{}] is registered",
                    definition.entry_aliases.join(", ")
                )
            })
    }
}
