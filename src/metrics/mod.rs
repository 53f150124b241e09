//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Oracle cursor height per platform
//! - Detected swaps and delivery outcomes
//! - Fee-settlement transitions
//! - Scan faults and health checks

use crate::error::{BridgeError, BridgeResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref CURSOR_HEIGHT: GaugeVec = register_gauge_vec!(
        "swap_bridge_cursor_height",
        "Last fully processed block height per platform",
        &["platform"]
    ).unwrap();

    pub static ref SWAPS_DETECTED: CounterVec = register_counter_vec!(
        "swap_bridge_swaps_detected_total",
        "Incoming swaps added to the pending index",
        &["platform"]
    ).unwrap();

    pub static ref DELIVERIES: CounterVec = register_counter_vec!(
        "swap_bridge_deliveries_total",
        "Outbound delivery attempts by outcome",
        &["platform", "outcome"]
    ).unwrap();

    pub static ref FEE_TRANSITIONS: CounterVec = register_counter_vec!(
        "swap_bridge_fee_transitions_total",
        "Fee-settlement state changes",
        &["status"]
    ).unwrap();

    pub static ref SCAN_FAULTS: CounterVec = register_counter_vec!(
        "swap_bridge_scan_faults_total",
        "Scan tasks that ended in an error",
        &["platform"]
    ).unwrap();

    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "swap_bridge_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "swap_bridge_health_check_failure_total",
        "Total failed health checks",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> BridgeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Config(format!("Cannot bind metrics on {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| BridgeError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))
}

// Helper functions to record metrics

pub fn record_cursor_height(platform: &str, height: u64) {
    CURSOR_HEIGHT
        .with_label_values(&[platform])
        .set(height as f64);
}

pub fn record_swap_detected(platform: &str) {
    SWAPS_DETECTED.with_label_values(&[platform]).inc();
}

pub fn record_delivery(platform: &str, outcome: &str) {
    DELIVERIES.with_label_values(&[platform, outcome]).inc();
}

pub fn record_fee_transition(status: &str) {
    FEE_TRANSITIONS.with_label_values(&[status]).inc();
}

pub fn record_scan_fault(platform: &str) {
    SCAN_FAULTS.with_label_values(&[platform]).inc();
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}

pub fn record_health_check_failure() {
    HEALTH_CHECK_FAILURE.with_label_values(&[]).inc();
}
