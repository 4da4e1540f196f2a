use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::info;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Watcher metrics
    pub static ref REGISTRIES_SCANNED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "slipstream_registries_scanned_total",
            "Total number of registry scans performed"
        ),
        &["registry", "image"]
    ).unwrap();

    pub static ref IMAGES_TRACKED: IntGauge = IntGauge::new(
        "slipstream_images_tracked",
        "Number of image repositories being watched"
    ).unwrap();

    pub static ref EVENTS_SUBMITTED_TOTAL: IntCounter = IntCounter::new(
        "slipstream_events_submitted_total",
        "Total number of update events submitted to providers"
    ).unwrap();

    pub static ref SCAN_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "slipstream_scan_errors_total",
        "Total number of registry scan errors"
    ).unwrap();

    // Approval metrics
    pub static ref APPROVALS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "slipstream_approvals_created_total",
        "Total number of approval requests created"
    ).unwrap();

    pub static ref APPROVALS_APPROVED_TOTAL: IntCounter = IntCounter::new(
        "slipstream_approvals_approved_total",
        "Total number of approval requests that collected enough votes"
    ).unwrap();

    pub static ref APPROVALS_REJECTED_TOTAL: IntCounter = IntCounter::new(
        "slipstream_approvals_rejected_total",
        "Total number of approval requests rejected"
    ).unwrap();
}

pub fn register_metrics() {
    REGISTRY
        .register(Box::new(REGISTRIES_SCANNED_TOTAL.clone()))
        .ok();
    REGISTRY.register(Box::new(IMAGES_TRACKED.clone())).ok();
    REGISTRY
        .register(Box::new(EVENTS_SUBMITTED_TOTAL.clone()))
        .ok();
    REGISTRY.register(Box::new(SCAN_ERRORS_TOTAL.clone())).ok();
    REGISTRY
        .register(Box::new(APPROVALS_CREATED_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(APPROVALS_APPROVED_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(APPROVALS_REJECTED_TOTAL.clone()))
        .ok();

    info!("Metrics registered");
}

/// Encode current metrics in the Prometheus text format
pub fn gather() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
