//! Store Metrics
//!
//! Prometheus counters and gauges for the store, kept in a dedicated
//! registry so several stores can coexist in one process (as in tests).

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metric collectors for one store instance
#[derive(Clone)]
pub struct StoreMetrics {
    registry: Registry,
    pub objects_written: IntCounter,
    pub write_failures: IntCounterVec,
    pub tenants_created: IntCounter,
    pub tenants_deleted: IntCounter,
    pub routing_failures: IntCounter,
    pub status_requests: IntCounter,
    pub classes: IntGauge,
}

impl std::fmt::Debug for StoreMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreMetrics")
            .field("objects_written", &self.objects_written.get())
            .field("tenants_created", &self.tenants_created.get())
            .finish()
    }
}

fn metric_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

impl StoreMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("tenant_store".into()), None).map_err(metric_error)?;

        let objects_written = IntCounter::new("objects_written_total", "Objects written to shards")
            .map_err(metric_error)?;
        let write_failures = IntCounterVec::new(
            Opts::new("write_failures_total", "Rejected or failed object writes by error code"),
            &["code"],
        )
        .map_err(metric_error)?;
        let tenants_created =
            IntCounter::new("tenants_created_total", "Tenants created").map_err(metric_error)?;
        let tenants_deleted =
            IntCounter::new("tenants_deleted_total", "Tenants deleted").map_err(metric_error)?;
        let routing_failures = IntCounter::new(
            "routing_failures_total",
            "Calls to other nodes that timed out or failed in transport",
        )
        .map_err(metric_error)?;
        let status_requests =
            IntCounter::new("status_requests_total", "Cluster status requests").map_err(metric_error)?;
        let classes = IntGauge::new("classes", "Registered classes").map_err(metric_error)?;

        registry.register(Box::new(objects_written.clone())).map_err(metric_error)?;
        registry.register(Box::new(write_failures.clone())).map_err(metric_error)?;
        registry.register(Box::new(tenants_created.clone())).map_err(metric_error)?;
        registry.register(Box::new(tenants_deleted.clone())).map_err(metric_error)?;
        registry.register(Box::new(routing_failures.clone())).map_err(metric_error)?;
        registry.register(Box::new(status_requests.clone())).map_err(metric_error)?;
        registry.register(Box::new(classes.clone())).map_err(metric_error)?;

        Ok(Self {
            registry,
            objects_written,
            write_failures,
            tenants_created,
            tenants_deleted,
            routing_failures,
            status_requests,
            classes,
        })
    }

    /// Record a failed call, by wire code
    pub fn record_failure(&self, err: &Error) {
        self.write_failures.with_label_values(&[err.code()]).inc();
        if matches!(err, Error::Routing { .. }) {
            self.routing_failures.inc();
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_registries() {
        let a = StoreMetrics::new().unwrap();
        let b = StoreMetrics::new().unwrap();
        a.objects_written.inc();
        assert_eq!(a.objects_written.get(), 1);
        assert_eq!(b.objects_written.get(), 0);
    }

    #[test]
    fn test_encode() {
        let metrics = StoreMetrics::new().unwrap();
        metrics.record_failure(&Error::routing("node-2", "timeout"));
        metrics.tenants_created.inc_by(3);

        let (content_type, body) = metrics.encode().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("tenant_store_tenants_created_total 3"));
        assert!(text.contains("tenant_store_routing_failures_total 1"));
        assert!(text.contains(r#"code="routing_error""#));
    }
}
