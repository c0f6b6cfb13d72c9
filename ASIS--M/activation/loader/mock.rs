use std::{any::Any, sync::Arc};

use serde_json::Value;

use super::catalog::{Component, ComponentError};

/// Health ceiling reported by mocks. Below a loaded component's 1.0 so that
/// degraded components are visible on the dashboard.
pub const MOCK_HEALTH: f32 = 0.8;

/// Status label returned by mock probes.
pub const MOCK_STATUS: &str = "mock_active";

/// Constant reply of [`MockComponent::process`].
pub const MOCK_RESPONSE: &str = "mock component: request acknowledged";

/// Placeholder standing in for a component that failed to load.
#[derive(Debug, Clone)]
pub struct MockComponent {
    name: String,
    reason: String,
}

impl MockComponent {
    /// Why the real component is missing.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Component for MockComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Result<String, ComponentError> {
        Ok(MOCK_STATUS.into())
    }

    fn process(&self, _input: &Value) -> Result<String, ComponentError> {
        Ok(MOCK_RESPONSE.into())
    }

    fn health(&self) -> f32 {
        MOCK_HEALTH
    }

    fn is_mock(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds a mock for `component_id`. Never fails.
#[must_use]
pub fn make_mock(component_id: &str, reason: impl Into<String>) -> Arc<dyn Component> {
    Arc::new(MockComponent {
        name: component_id.to_string(),
        reason: reason.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mock_has_fixed_shape() {
        let mock = make_mock("memory_network", "no manifest");
        assert_eq!(mock.name(), "memory_network");
        assert_eq!(mock.status().unwrap(), "mock_active");
        assert!((mock.health() - 0.8).abs() < f32::EPSILON);
        assert!(mock.is_mock());
        let reply = mock.process(&json!({ "anything": true })).unwrap();
        assert_eq!(reply, MOCK_RESPONSE);
        let concrete = mock.as_any().downcast_ref::<MockComponent>().unwrap();
        assert_eq!(concrete.reason(), "no manifest");
    }
}
