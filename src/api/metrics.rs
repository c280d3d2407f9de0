//! Gateway Metrics
//!
//! Request counters exposed in Prometheus text format on `/metrics`. Each
//! gateway owns its own registry so several can coexist in one process.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for requests handled by the volume gateway
pub struct GatewayMetrics {
    registry: Registry,
    requests: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new(
                "volume_gateway_requests_total",
                "Volume gateway requests by operation and outcome",
            ),
            &["driver", "operation", "outcome"],
        )
        .map_err(|e| Error::Internal(format!("metric definition: {}", e)))?;
        registry
            .register(Box::new(requests.clone()))
            .map_err(|e| Error::Internal(format!("metric registration: {}", e)))?;

        Ok(Self { registry, requests })
    }

    /// Count one request; `outcome` is `ok` or an error kind
    pub fn observe(&self, driver: &str, operation: &str, outcome: &str) {
        self.requests
            .with_label_values(&[driver, operation, outcome])
            .inc();
    }

    pub fn count(&self, driver: &str, operation: &str, outcome: &str) -> u64 {
        self.requests
            .with_label_values(&[driver, operation, outcome])
            .get()
    }

    /// Render all metrics in the text exposition format
    pub fn encode(&self) -> Result<(String, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("metric encoding: {}", e)))?;
        let body = String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("metric encoding: {}", e)))?;
        Ok((encoder.format_type().to_string(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_and_encode() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.observe("vfs", "create", "ok");
        metrics.observe("vfs", "create", "ok");
        metrics.observe("vfs", "mount", "conflict");

        assert_eq!(metrics.count("vfs", "create", "ok"), 2);

        let (content_type, body) = metrics.encode().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("volume_gateway_requests_total"));
        assert!(body.contains("outcome=\"conflict\""));
    }

    #[test]
    fn test_independent_registries() {
        let a = GatewayMetrics::new().unwrap();
        let b = GatewayMetrics::new().unwrap();
        a.observe("vfs", "delete", "ok");
        assert_eq!(b.count("vfs", "delete", "ok"), 0);
    }
}
