//! Prometheus metrics for the gateway and the consumer loops.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
};
use metrics::Unit;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

use super::AppState;

const REQUEST_DURATION: &str = "http_requests_duration_seconds";

fn prometheus_builder() -> Result<PrometheusBuilder, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), EXPONENTIAL_SECONDS)
}

fn describe() {
    metrics::describe_counter!("http_requests_total", "Gateway requests by route and status.");
    metrics::describe_histogram!(REQUEST_DURATION, Unit::Seconds, "Gateway request latency.");
    metrics::describe_counter!(
        "relay_messages_total",
        "Consumed messages by queue and outcome."
    );
    metrics::describe_gauge!(
        "relay_broker_connected",
        "1 while a broker session is installed for the gateway."
    );
}

/// Install the global Prometheus recorder.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = prometheus_builder()?.install_recorder()?;
    describe();
    Ok(handle)
}

/// Count and time every request on the routes it wraps.
pub async fn track_metrics(req: Request, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let path = match req.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_owned(),
        None => req.uri().path().to_owned(),
    };
    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!(REQUEST_DURATION, &labels).record(latency);

    response
}

/// `GET /metrics`: Prometheus text format, or 404 when no recorder is
/// installed.
pub async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::queue::Publisher;
    use crate::web::router;

    #[tokio::test]
    async fn test_publish_requests_are_counted() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let app = router(AppState::new(Publisher::new()).with_metrics(handle));

        let publish = Request::builder()
            .method("POST")
            .uri("/publish")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"queue_name":"notification","body":"b@x.com;1"}"#))
            .unwrap();
        let response = app.clone().oneshot(publish).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let scrape = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.oneshot(scrape).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let line = text
            .lines()
            .find(|line| line.starts_with("http_requests_total{"))
            .expect("request counter missing");
        assert!(line.contains(r#"path="/publish""#));
        assert!(line.contains(r#"status="503""#));
        assert!(line.ends_with(" 1"));
        assert!(text.contains(REQUEST_DURATION));
    }

    #[tokio::test]
    async fn test_metrics_route_without_recorder() {
        let app = router(AppState::new(Publisher::new()));

        let scrape = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.oneshot(scrape).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
