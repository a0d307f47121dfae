//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Route runs and their outcomes
//! - Source and treasury balances
//! - Bridged amounts and attached value
//! - Error rates and RPC failovers

use crate::error::{ExecutorError, ExecutorResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

lazy_static! {
    // Run metrics
    pub static ref ROUTE_RUNS: CounterVec = register_counter_vec!(
        "bridge_executor_route_runs_total",
        "Route runs by outcome (bridged, skipped, failed)",
        &["route", "outcome"]
    ).expect("metric registration");

    pub static ref ROUTE_FAILURES: CounterVec = register_counter_vec!(
        "bridge_executor_route_failures_total",
        "Route failures by error kind",
        &["route", "kind"]
    ).expect("metric registration");

    // Balance metrics
    pub static ref SOURCE_BALANCE: GaugeVec = register_gauge_vec!(
        "bridge_executor_source_balance",
        "Jetton balance of the source wallet in jetton units",
        &["route"]
    ).expect("metric registration");

    pub static ref TREASURY_BALANCE: GaugeVec = register_gauge_vec!(
        "bridge_executor_treasury_balance_nanoton",
        "Native balance of the treasury contract",
        &["route"]
    ).expect("metric registration");

    // Bridge metrics
    pub static ref BRIDGED_AMOUNT: CounterVec = register_counter_vec!(
        "bridge_executor_bridged_amount_total",
        "Jetton units bridged",
        &["route"]
    ).expect("metric registration");

    pub static ref ATTACHED_VALUE: CounterVec = register_counter_vec!(
        "bridge_executor_attached_value_nanoton_total",
        "Native value attached to bridge messages",
        &["route"]
    ).expect("metric registration");

    pub static ref LAST_SUCCESS: GaugeVec = register_gauge_vec!(
        "bridge_executor_last_success_timestamp_seconds",
        "Unix time of the last successful bridge",
        &["route"]
    ).expect("metric registration");

    pub static ref FEE_REFRESHES: CounterVec = register_counter_vec!(
        "bridge_executor_fee_snapshot_refreshes_total",
        "Fee snapshot reads from the treasury",
        &["route"]
    ).expect("metric registration");

    // Chain metrics
    pub static ref RPC_FAILOVERS: CounterVec = register_counter_vec!(
        "bridge_executor_rpc_failovers_total",
        "Switches to the next toncenter endpoint",
        &[]
    ).expect("metric registration");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Serve `/metrics` until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) -> ExecutorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ExecutorError::Config(format!("cannot bind metrics port {}: {}", self.port, e)))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ExecutorError::Config(format!("metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Text exposition of every registered collector
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

// Helper functions to record metrics

pub fn record_run(route: &str, outcome: &str) {
    ROUTE_RUNS.with_label_values(&[route, outcome]).inc();
}

pub fn record_failure(route: &str, err: &ExecutorError) {
    ROUTE_RUNS.with_label_values(&[route, "failed"]).inc();
    ROUTE_FAILURES.with_label_values(&[route, err.kind()]).inc();
}

pub fn record_source_balance(route: &str, balance: u128) {
    SOURCE_BALANCE.with_label_values(&[route]).set(balance as f64);
}

pub fn record_treasury_balance(route: &str, balance: u128) {
    TREASURY_BALANCE.with_label_values(&[route]).set(balance as f64);
}

pub fn record_bridge(route: &str, amount: u128, value: u128) {
    BRIDGED_AMOUNT.with_label_values(&[route]).inc_by(amount as f64);
    ATTACHED_VALUE.with_label_values(&[route]).inc_by(value as f64);
    LAST_SUCCESS
        .with_label_values(&[route])
        .set(chrono::Utc::now().timestamp() as f64);
}

pub fn record_fee_refresh(route: &str) {
    FEE_REFRESHES.with_label_values(&[route]).inc();
}

pub fn record_rpc_failover() {
    RPC_FAILOVERS.with_label_values(&[]).inc();
}
