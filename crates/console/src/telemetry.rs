//! Tracing and metrics bootstrap shared by every subcommand.

use std::io;
use std::net::SocketAddr;
use std::thread;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. Safe to call more than once; later calls are
/// no-ops.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .try_init();
}

/// Expose Prometheus metrics over HTTP when an address is configured.
/// Without one no recorder is installed and the metrics macros stay inert.
pub fn init_metrics(addr: Option<SocketAddr>) -> Result<()> {
    let Some(addr) = addr else {
        return Ok(());
    };
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start metrics exporter on {addr}"))?;
    describe_metrics();
    tracing::info!("Prometheus metrics available at http://{addr}/metrics");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("vision_frames_total", "Frames run through the detection pipeline");
    describe_counter!("vision_detections_total", "Detections surviving suppression");
    describe_histogram!("vision_cycle_seconds", "Wall time of one pipeline cycle");
    describe_gauge!("vision_fps", "Smoothed pipeline frame rate");
    describe_counter!("feed_events_total", "Change events forwarded to the console");
    describe_counter!("feed_suppressed_total", "Pose events dropped by the throttle");
    describe_counter!("feed_listener_errors_total", "Watch callbacks that reported an error");
    describe_counter!("feed_writes_total", "Outbound document writes attempted");
    describe_counter!("feed_write_failures_total", "Outbound document writes that failed");
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}
