use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::GaugeVec;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref LEASE_ACQUIRED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("lease_acquired_total", "lease_acquired_total"),
        &["instance"]
    )
    .expect("Should succeed to create metric");

    pub static ref LEASE_CONTENTION_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("lease_contention_total", "lease_contention_total"),
        &["instance"]
    )
    .expect("Should succeed to create metric");

    pub static ref LEASE_LOST_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("lease_lost_total", "lease_lost_total"),
        &["instance"]
    )
    .expect("Should succeed to create metric");

    pub static ref BATCHES_DELIVERED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("batches_delivered_total", "batches_delivered_total"),
        &["partition"]
    )
    .expect("Should succeed to create metric");

    pub static ref RECORDS_DELIVERED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("records_delivered_total", "records_delivered_total"),
        &["partition"]
    )
    .expect("Should succeed to create metric");

    pub static ref HANDLER_RETRY_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("handler_retry_total", "handler_retry_total"),
        &["partition"]
    )
    .expect("Should succeed to create metric");

    pub static ref PARTITION_FATAL_METRIC: GaugeVec = GaugeVec::new(
        Opts::new("partition_fatal", "partition_fatal"),
        &["partition"]
    )
    .expect("Should succeed to create metric");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Register every collector into [`REGISTRY`] so it can be gathered and
/// exported. Idempotent; duplicate registration would otherwise fail.
pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(LEASE_ACQUIRED_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(LEASE_CONTENTION_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(LEASE_LOST_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(BATCHES_DELIVERED_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(RECORDS_DELIVERED_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(HANDLER_RETRY_METRIC.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(PARTITION_FATAL_METRIC.clone()))
            .expect("collector can be registered");
    });
}
