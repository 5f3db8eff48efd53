//! Prometheus metrics: HTTP request instrumentation plus auth counters.

use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static LOGIN_ATTEMPTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static REFRESH_REUSE_TOTAL: OnceLock<IntCounter> = OnceLock::new();

fn must<T>(result: Result<T, prometheus::Error>, name: &str) -> T {
    match result {
        Ok(metric) => metric,
        Err(e) => {
            tracing::error!(metric = %name, error = %e, "Failed to build metric");
            panic!("Failed to initialize metrics: {}", e);
        }
    }
}

fn must_register(registry: &Registry, collector: Box<dyn Collector>) {
    if let Err(e) = registry.register(collector) {
        tracing::error!(error = %e, "Failed to register metrics collector");
        panic!("Failed to initialize metrics: {}", e);
    }
}

/// Build and register all collectors. Called once at startup; metrics left
/// uninitialized (as in unit tests) make every recording helper a no-op.
pub fn init_metrics() {
    let registry = Registry::new();

    let http_requests = must(
        IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        ),
        "http_requests_total",
    );
    let http_duration = must(
        HistogramVec::new(
            prometheus::HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "path", "status"],
        ),
        "http_request_duration_seconds",
    );
    let login_attempts = must(
        IntCounterVec::new(
            Opts::new("auth_login_attempts_total", "Login attempts by outcome"),
            &["outcome"],
        ),
        "auth_login_attempts_total",
    );
    let refresh_reuse = must(
        IntCounter::new(
            "auth_refresh_reuse_total",
            "Refresh secrets presented again after revocation",
        ),
        "auth_refresh_reuse_total",
    );

    must_register(&registry, Box::new(http_requests.clone()));
    must_register(&registry, Box::new(http_duration.clone()));
    must_register(&registry, Box::new(login_attempts.clone()));
    must_register(&registry, Box::new(refresh_reuse.clone()));

    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(http_requests);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(http_duration);
    let _ = LOGIN_ATTEMPTS_TOTAL.set(login_attempts);
    let _ = REFRESH_REUSE_TOTAL.set(refresh_reuse);
}

pub fn observe_http(method: &str, path: &str, status: &str, seconds: f64) {
    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[method, path, status]).inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&[method, path, status])
            .observe(seconds);
    }
}

pub fn record_login_attempt(success: bool) {
    if let Some(counter) = LOGIN_ATTEMPTS_TOTAL.get() {
        let outcome = if success { "success" } else { "failure" };
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_refresh_reuse() {
    if let Some(counter) = REFRESH_REUSE_TOTAL.get() {
        counter.inc();
    }
}

/// Render the registry in Prometheus text exposition format.
pub fn get_metrics() -> String {
    let registry = match REGISTRY.get() {
        Some(registry) => registry,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
