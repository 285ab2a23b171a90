// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
    Seconds,
}

// Macros for metrics when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

// Macros for describe_* functions when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

// Re-export macros for use in this module when observability is disabled
#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use once_cell::sync::OnceCell;

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Initializes the descriptions for all the metrics in the SDK.
/// Safe to call more than once; only the first call registers anything.
pub fn describe_metrics() {
    DESCRIBED.get_or_init(|| {
        describe_counter!(
            "zap_operations_total",
            Unit::Count,
            "Completed open/close/claim operations, labeled by operation."
        );
        describe_counter!(
            "zap_aborts_total",
            Unit::Count,
            "Aborted (fully reverted) operations, labeled by operation and error kind."
        );
        describe_counter!(
            "zap_swaps_total",
            Unit::Count,
            "Executed swaps, labeled by hop count (single/multi)."
        );
        describe_counter!(
            "zap_expected_output_source_total",
            Unit::Count,
            "Where expected swap output came from (quoter/projection)."
        );
        describe_counter!("cache_hits_total", Unit::Count, "Cache hits, labeled by cache.");
        describe_counter!("cache_miss_total", Unit::Count, "Cache misses, labeled by cache.");
        describe_gauge!("cache_size_gauge", "Entries currently held, labeled by cache.");
        describe_counter!(
            "oracle_connector_fallbacks_total",
            Unit::Count,
            "Oracle lookups that needed a connector asset."
        );
        describe_histogram!(
            "zap_operation_duration_seconds",
            Unit::Seconds,
            "Wall-clock duration of open/close operations."
        );
    });
}

pub fn increment_operation(operation: &'static str) {
    counter!("zap_operations_total", 1, "operation" => operation);
}

pub fn increment_abort(operation: &'static str, error_kind: &'static str) {
    counter!("zap_aborts_total", 1, "operation" => operation, "kind" => error_kind);
}

pub fn increment_swap(hops: usize) {
    let label = if hops > 1 { "multi" } else { "single" };
    counter!("zap_swaps_total", 1, "hops" => label);
}

pub fn increment_expected_output_source(source: &'static str) {
    counter!("zap_expected_output_source_total", 1, "source" => source);
}

pub fn increment_connector_fallback() {
    counter!("oracle_connector_fallbacks_total", 1);
}

pub fn increment_cache_hit(cache_name: &str) {
    counter!("cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("cache_miss_total", 1, "cache" => cache_name.to_string());
}

pub fn set_cache_size(cache_name: &str, size: f64) {
    gauge!("cache_size_gauge", size, "cache" => cache_name.to_string());
}

pub fn record_operation_duration(operation: &'static str, duration: std::time::Duration) {
    histogram!("zap_operation_duration_seconds", duration.as_secs_f64(), "operation" => operation);
}
