use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // REST Metrics
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "api_requests_total",
        "Total number of REST requests issued by the client",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "api_request_duration_seconds",
        "REST request duration in seconds",
        &["method", "endpoint"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Code Battle Metrics
    pub static ref BATTLE_SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "battle_sessions_total",
        "Code Battle sessions by mode and outcome",
        &["mode", "outcome"]
    )
    .unwrap();

    pub static ref AUTO_SUBMITS_TOTAL: IntCounter = register_int_counter!(
        "auto_submits_total",
        "Submissions triggered by countdown expiry"
    )
    .unwrap();

    pub static ref AI_STATUS_POLLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_status_polls_total",
        "AI opponent status polls by result",
        &["result"]
    )
    .unwrap();

    pub static ref PVP_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "pvp_events_total",
        "Socket events received from the PvP server",
        &["event"]
    )
    .unwrap();

    // Reviews
    pub static ref REVIEW_ROLLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "review_rollbacks_total",
        "Optimistic review changes reverted after a server failure",
        &["kind"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a REST call with metrics.
///
/// `endpoint` is the route template (`/codebattle/sessions/:id/submit`), not
/// the concrete path, to keep label cardinality bounded.
pub async fn track_request<F, T>(
    method: &str,
    endpoint: &str,
    future: F,
) -> crate::error::Result<T>
where
    F: std::future::Future<Output = crate::error::Result<T>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = match &result {
        Ok(_) => "success".to_string(),
        Err(crate::error::ClientError::Http { status, .. }) => status.to_string(),
        Err(_) => "error".to_string(),
    };

    API_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, status.as_str()])
        .inc();

    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration);

    result
}

pub fn record_session_outcome(mode: &str, outcome: &str) {
    BATTLE_SESSIONS_TOTAL
        .with_label_values(&[mode, outcome])
        .inc();
}

pub fn record_pvp_event(event: &str) {
    PVP_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

pub fn record_review_rollback(kind: &str) {
    REVIEW_ROLLBACKS_TOTAL.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[test]
    fn test_metrics_registration() {
        let _ = API_REQUESTS_TOTAL
            .with_label_values(&["GET", "/codebattle/tasks", "success"])
            .get();
        let _ = AUTO_SUBMITS_TOTAL.get();
    }

    #[tokio::test]
    async fn test_track_request_labels_http_status() {
        let result: crate::error::Result<()> = track_request("POST", "/metrics-test", async {
            Err(ClientError::Http {
                status: 409,
                message: "conflict".to_string(),
            })
        })
        .await;
        assert!(result.is_err());

        let count = API_REQUESTS_TOTAL
            .with_label_values(&["POST", "/metrics-test", "409"])
            .get();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_render_metrics() {
        record_pvp_event("match-found");

        let output = render_metrics().unwrap();
        assert!(output.contains("pvp_events_total"));
    }
}
