use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, RotationPolicy};
use tokio::runtime::{Builder, Handle};

/// Builder for activation telemetry sinks.
pub struct ActivationTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    rotation: Option<RotationPolicy>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl ActivationTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            rotation: None,
            min_level: LogLevel::Info,
            event_publisher: None,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Enables size-based log rotation.
    #[must_use]
    pub const fn rotation(mut self, policy: RotationPolicy) -> Self {
        self.rotation = Some(policy);
        self
    }

    /// Lowest level written to the log file.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<ActivationTelemetry> {
        let logger = match self.log_path {
            Some(path) => {
                let mut logger = JsonLogger::new(path)?.with_min_level(self.min_level);
                if let Some(policy) = self.rotation {
                    logger = logger.with_rotation(policy);
                }
                Some(logger)
            }
            None => None,
        };
        Ok(ActivationTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared across the controller, sequencer, and cycle.
#[derive(Clone)]
pub struct ActivationTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for ActivationTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationTelemetry")
            .field("module", &self.inner.module)
            .field("logs", &self.inner.logger.as_ref().map(JsonLogger::path))
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl ActivationTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> ActivationTelemetryBuilder {
        ActivationTelemetryBuilder::new(module)
    }

    /// Telemetry that only forwards to `tracing`.
    #[must_use]
    pub fn disabled(module: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: module.into(),
                logger: None,
                publisher: None,
            }),
        }
    }

    /// Logs structured metadata to `tracing` and the JSON log file.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        let module = self.inner.module.as_str();
        match level {
            LogLevel::Debug => tracing::debug!(module, fields = %metadata, "{message}"),
            LogLevel::Info => tracing::info!(module, fields = %metadata, "{message}"),
            LogLevel::Warn => tracing::warn!(module, fields = %metadata, "{message}"),
            LogLevel::Error => tracing::error!(module, fields = %metadata, "{message}"),
        }
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(module, level, message).with_metadata(&metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Publishes an event and waits for the publisher.
    pub async fn emit(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(publisher) = &self.inner.publisher {
            publisher.publish(self.record(event_type, payload)).await?;
        }
        Ok(())
    }

    /// Publishes an event from synchronous code. Inside a runtime the publish
    /// is spawned; otherwise it runs to completion on a temporary runtime.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        let Some(publisher) = self.inner.publisher.clone() else {
            return Ok(());
        };
        let record = self.record(event_type, payload);
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    tracing::warn!("telemetry event publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(publisher.publish(record))
        }
    }

    fn record(&self, event_type: &str, payload: Value) -> EventRecord {
        EventRecord::new(self.inner.module.clone(), event_type, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("activation.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = ActivationTelemetry::builder("activation")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "activation.phase.started", json!({ "phase": 1 }))
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "activation.noise", json!({}))
            .unwrap();
        telemetry
            .event("activation.phase.completed", json!({ "phase": 1 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("activation.phase.started"));
        assert!(!content.contains("activation.noise"));
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn emit_awaits_publisher() {
        let bus = Arc::new(MemoryEventBus::new(4));
        let telemetry = ActivationTelemetry::builder("activation")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .emit("activation.shutdown", json!({ "components": 0 }))
            .await
            .unwrap();
        assert_eq!(bus.events_with_prefix("activation.shutdown").len(), 1);
    }

    #[test]
    fn disabled_telemetry_is_silent() {
        let telemetry = ActivationTelemetry::disabled("activation");
        telemetry.log(LogLevel::Warn, "nothing", json!({})).unwrap();
        telemetry.event("nothing", json!({})).unwrap();
    }
}
