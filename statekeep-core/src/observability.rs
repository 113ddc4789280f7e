/*!
Observability for the statekeep core.

This module provides:
- Structured logging setup through `tracing-subscriber`
- Prometheus counters for save and load outcomes (behind the `metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, StateError};

/// Filter applied when `RUST_LOG` is not set
pub const DEFAULT_LOG_DIRECTIVE: &str = "statekeep=info,statekeep_core=info";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<StateMetrics>> = OnceLock::new();

/// Metrics collected by save and load operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct StateMetrics {
    pub saves_total: Counter,
    pub save_failures_total: Counter,
    pub loads_total: Counter,
    pub load_failures_total: Counter,
    pub dangling_references_total: Counter,
    pub payload_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| StateError::validation(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| StateError::validation(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
impl StateMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let saves_total = counter(
            &registry,
            "statekeep_saves_total",
            "Save payloads produced",
        )?;
        let save_failures_total = counter(
            &registry,
            "statekeep_save_failures_total",
            "Saves that failed before producing a payload",
        )?;
        let loads_total = counter(&registry, "statekeep_loads_total", "Payloads applied")?;
        let load_failures_total = counter(
            &registry,
            "statekeep_load_failures_total",
            "Loads rejected before touching any object",
        )?;
        let dangling_references_total = counter(
            &registry,
            "statekeep_dangling_references_total",
            "References left unresolved after a load",
        )?;

        let payload_size_bytes = Histogram::with_opts(
            HistogramOpts::new("statekeep_payload_size_bytes", "Size of save payloads in bytes")
                .buckets(prometheus::exponential_buckets(256.0, 4.0, 10).map_err(|e| {
                    StateError::validation(format!("Invalid payload size buckets: {e}"))
                })?),
        )
        .map_err(|e| {
            StateError::validation(format!("Failed to create payload_size_bytes metric: {e}"))
        })?;
        registry
            .register(Box::new(payload_size_bytes.clone()))
            .map_err(|e| {
                StateError::validation(format!("Failed to register payload_size_bytes: {e}"))
            })?;

        Ok(Self {
            saves_total,
            save_failures_total,
            loads_total,
            load_failures_total,
            dangling_references_total,
            payload_size_bytes,
            registry,
        })
    }

    /// Global metrics instance, or `None` if registration failed
    pub fn global() -> Option<&'static StateMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::warn!(error = %e, "Metrics disabled");
                    None
                }
            })
            .as_ref()
    }

    pub fn record_save(&self, payload_len: usize) {
        self.saves_total.inc();
        self.payload_size_bytes.observe(payload_len as f64);
    }

    pub fn record_save_failure(&self) {
        self.save_failures_total.inc();
    }

    /// Record an applied load and the dangling references it reported
    pub fn record_load(&self, dangling: usize) {
        self.loads_total.inc();
        self.dangling_references_total.inc_by(dangling as f64);
    }

    pub fn record_load_failure(&self) {
        self.load_failures_total.inc();
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| StateError::validation(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            StateError::validation(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

/// Gather the global metrics in Prometheus text format
#[cfg(feature = "metrics")]
pub fn gather_metrics() -> Result<String> {
    StateMetrics::global()
        .ok_or_else(|| StateError::validation("metrics are not available"))?
        .gather_metrics()
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` overrides the default filter ([`DEFAULT_LOG_DIRECTIVE`]).
///
/// # Arguments
/// * `json` - Emit JSON lines instead of human-readable output
///
/// # Returns
/// An error if a global subscriber is already installed
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    StateMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_DIRECTIVE))
        .map_err(|e| StateError::validation(format!("Invalid log filter: {e}")))?;

    let installed = if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        set_global_default(TracingRegistry::default().with(filter).with(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer().with_target(false);
        set_global_default(TracingRegistry::default().with(filter).with(layer))
    };
    installed.map_err(|e| {
        StateError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!(json, "statekeep observability initialized");
    Ok(())
}

/// Initialize observability with human-readable output
pub fn init_default_observability() -> Result<()> {
    init_observability(false)
}
