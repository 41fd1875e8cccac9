//! Request counters exposed at `/metrics`.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;
use std::sync::Mutex;

/// Process-level request metrics.
pub struct Metrics {
    registry: Mutex<Registry>,
    /// Requests received.
    pub requests: Counter,
    /// Responses written.
    pub responses: Counter,
    /// Responses that ended in an error status.
    pub response_errors: Counter,
    /// Repository clones performed.
    pub clones: Counter,
}

impl Metrics {
    /// Creates and registers the counters.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let requests = Counter::default();
        let responses = Counter::default();
        let response_errors = Counter::default();
        let clones = Counter::default();
        registry.register("repostore_requests", "Requests received", requests.clone());
        registry.register("repostore_responses", "Responses written", responses.clone());
        registry.register(
            "repostore_response_errors",
            "Responses with an error status",
            response_errors.clone(),
        );
        registry.register(
            "repostore_clones",
            "Repository clones performed",
            clones.clone(),
        );
        Self {
            registry: Mutex::new(registry),
            requests,
            responses,
            response_errors,
            clones,
        }
    }

    /// Renders the registry in OpenMetrics text format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Ok(registry) = self.registry.lock() {
            let _ = encode(&mut out, &registry);
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
