use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static RIGHTS_CHECKS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static EVENTS_DROPPED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;
    let request_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;
    let rights_checks = IntCounterVec::new(
        Opts::new("rights_checks_total", "Rights checks by outcome"),
        &["outcome"],
    )?;
    let events_dropped = IntCounterVec::new(
        Opts::new(
            "events_dropped_total",
            "Events and notifications dropped because the dispatch queue was full",
        ),
        &["kind"],
    )?;

    registry.register(Box::new(requests_total.clone()))?;
    registry.register(Box::new(request_duration.clone()))?;
    registry.register(Box::new(rights_checks.clone()))?;
    registry.register(Box::new(events_dropped.clone()))?;

    // A second init keeps the first registry.
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = RIGHTS_CHECKS_TOTAL.set(rights_checks);
    let _ = EVENTS_DROPPED_TOTAL.set(events_dropped);
    Ok(())
}

pub fn record_rights_check(outcome: &str) {
    if let Some(counter) = RIGHTS_CHECKS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_dropped(kind: &str) {
    if let Some(counter) = EVENTS_DROPPED_TOTAL.get() {
        counter.with_label_values(&[kind]).inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to UTF-8: {}", e);
        format!("# Failed to convert metrics to UTF-8: {}\n", e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rights_checks_exported() {
        init_metrics().unwrap();
        record_rights_check("granted");
        record_dropped("event");

        let body = get_metrics();
        assert!(body.contains("rights_checks_total"));
        assert!(body.contains("events_dropped_total"));
    }
}
