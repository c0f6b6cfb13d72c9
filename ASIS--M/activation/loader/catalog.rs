//! Component capability trait and the catalog of named factories.

use std::{
    any::Any,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use super::manifest::ComponentManifest;

/// Failures raised by component implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComponentError {
    /// Manifest settings were rejected by the factory.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    /// The component could not start.
    #[error("start failed: {0}")]
    Start(String),
    /// A health probe failed.
    #[error("probe failed: {0}")]
    Probe(String),
    /// Request processing failed.
    #[error("processing failed: {0}")]
    Process(String),
}

/// Capability set every activated component provides.
pub trait Component: Send + Sync + fmt::Debug {
    /// Instance name.
    fn name(&self) -> &str;

    /// Called once right after construction, before the component is marked online.
    fn start(&self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Health probe returning a short status label.
    fn status(&self) -> Result<String, ComponentError>;

    /// Handles a request.
    fn process(&self, input: &Value) -> Result<String, ComponentError>;

    /// Self-reported health ceiling in `[0, 1]`.
    fn health(&self) -> f32 {
        1.0
    }

    /// Whether this is a placeholder standing in for a failed load.
    fn is_mock(&self) -> bool {
        false
    }

    /// Called when the controller shuts down.
    fn stop(&self) {}

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

/// Constructor registered under an entry-point name.
pub type ComponentFactory =
    Arc<dyn Fn(&ComponentManifest) -> Result<Arc<dyn Component>, ComponentError> + Send + Sync>;

/// Named factories components can be loaded from.
#[derive(Clone, Default)]
pub struct FactoryCatalog {
    factories: IndexMap<String, ComponentFactory>,
}

impl fmt::Debug for FactoryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryCatalog")
            .field("entries", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FactoryCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in `basic` component.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new().with_factory(BasicComponent::ENTRY, |manifest: &ComponentManifest| {
            BasicComponent::from_manifest(manifest)
                .map(|component| Arc::new(component) as Arc<dyn Component>)
        })
    }

    /// Registers or replaces a factory.
    pub fn register<F>(&mut self, entry: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentManifest) -> Result<Arc<dyn Component>, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(entry.into(), Arc::new(factory));
    }

    /// Builder-style [`FactoryCatalog::register`].
    #[must_use]
    pub fn with_factory<F>(mut self, entry: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ComponentManifest) -> Result<Arc<dyn Component>, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        self.register(entry, factory);
        self
    }

    /// Whether an entry point is registered.
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.factories.contains_key(entry)
    }

    /// Registered entry names in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Invokes the named factory. `None` when the entry is unknown.
    #[must_use]
    pub fn build(
        &self,
        entry: &str,
        manifest: &ComponentManifest,
    ) -> Option<Result<Arc<dyn Component>, ComponentError>> {
        self.factories.get(entry).map(|factory| factory(manifest))
    }
}

/// General-purpose component driven entirely by its manifest.
///
/// Settings: `label` (string, defaults to the display name or entry) and
/// `max_requests` (integer, optional). Once `max_requests` is reached,
/// `process` and `status` fail, which lowers the component's health.
#[derive(Debug)]
pub struct BasicComponent {
    label: String,
    max_requests: Option<u64>,
    processed: AtomicU64,
}

impl BasicComponent {
    /// Entry-point name in the built-in catalog.
    pub const ENTRY: &'static str = "basic";

    /// Builds the component from manifest settings.
    pub fn from_manifest(manifest: &ComponentManifest) -> Result<Self, ComponentError> {
        let label = match manifest.settings.get("label") {
            None => manifest
                .display_name
                .clone()
                .unwrap_or_else(|| Self::ENTRY.to_string()),
            Some(toml::Value::String(label)) => label.clone(),
            Some(other) => {
                return Err(ComponentError::InvalidSettings(format!(
                    "label must be a string, got {}",
                    other.type_str()
                )))
            }
        };
        let max_requests = match manifest.settings.get("max_requests") {
            None => None,
            Some(toml::Value::Integer(limit)) if *limit >= 0 => u64::try_from(*limit).ok(),
            Some(other) => {
                return Err(ComponentError::InvalidSettings(format!(
                    "max_requests must be a non-negative integer, got {other}"
                )))
            }
        };
        Ok(Self {
            label,
            max_requests,
            processed: AtomicU64::new(0),
        })
    }

    /// Requests handled so far.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    fn exhausted(&self) -> bool {
        self.max_requests
            .is_some_and(|limit| self.processed() >= limit)
    }
}

impl Component for BasicComponent {
    fn name(&self) -> &str {
        &self.label
    }

    fn status(&self) -> Result<String, ComponentError> {
        if self.exhausted() {
            return Err(ComponentError::Probe(format!(
                "{} reached its request limit",
                self.label
            )));
        }
        Ok("active".into())
    }

    fn process(&self, input: &Value) -> Result<String, ComponentError> {
        if self.exhausted() {
            return Err(ComponentError::Process(format!(
                "{} reached its request limit",
                self.label
            )));
        }
        let count = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("{} handled request #{count}: {input}", self.label))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(settings: &str) -> ComponentManifest {
        let raw = format!("entry = \"basic\"\n[settings]\n{settings}");
        toml::from_str(&raw).unwrap()
    }

    #[test]
    fn builtin_catalog_builds_basic_component() {
        let catalog = FactoryCatalog::builtin();
        assert!(catalog.contains("basic"));
        let component = catalog
            .build("basic", &manifest("label = \"memory\""))
            .unwrap()
            .unwrap();
        assert_eq!(component.name(), "memory");
        assert!(!component.is_mock());
        assert!(component.as_any().downcast_ref::<BasicComponent>().is_some());
    }

    #[test]
    fn unknown_entry_yields_none() {
        let catalog = FactoryCatalog::builtin();
        assert!(catalog.build("missing", &manifest("")).is_none());
    }

    #[test]
    fn basic_component_enforces_request_limit() {
        let component = BasicComponent::from_manifest(&manifest("max_requests = 1")).unwrap();
        assert!(component.process(&json!({ "q": 1 })).is_ok());
        assert!(component.process(&json!({ "q": 2 })).is_err());
        assert!(component.status().is_err());
        assert_eq!(component.processed(), 1);
    }

    #[test]
    fn basic_component_rejects_bad_settings() {
        let err = BasicComponent::from_manifest(&manifest("label = 3")).unwrap_err();
        assert!(matches!(err, ComponentError::InvalidSettings(_)));
    }
}
