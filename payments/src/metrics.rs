//! Payment outcome counters.
//!
//! Recorded through the global `OpenTelemetry` meter when the `telemetry`
//! feature is enabled; a no-op otherwise.

#[cfg(feature = "telemetry")]
use std::sync::OnceLock;

#[cfg(feature = "telemetry")]
use opentelemetry::{KeyValue, global, metrics::Counter};

#[cfg(feature = "telemetry")]
fn outcomes() -> &'static Counter<u64> {
    static OUTCOMES: OnceLock<Counter<u64>> = OnceLock::new();
    OUTCOMES.get_or_init(|| {
        global::meter(env!("CARGO_PKG_NAME"))
            .u64_counter("payments.outcomes")
            .with_description("Payment operations by resulting provider status")
            .build()
    })
}

/// Counts one finished payment operation.
pub fn record_outcome(operation: &'static str, status: &str) {
    #[cfg(feature = "telemetry")]
    outcomes().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("status", status.to_owned()),
        ],
    );
    #[cfg(not(feature = "telemetry"))]
    let _ = (operation, status);
}
