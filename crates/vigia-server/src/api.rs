use crate::{ws, AppState};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;
use vigia_monitor::{AlertThresholdConfig, MetricContext, MetricType, NotificationConfig, MAX_WINDOW_SECS};

const DEFAULT_WINDOW_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
pub struct RecordMetricRequest {
    pub metric: MetricType,
    pub value: f64,
    #[serde(default)]
    pub context: Option<MetricContext>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub window_secs: Option<u64>,
}

impl WindowQuery {
    fn secs(&self) -> u64 {
        self.window_secs.unwrap_or(DEFAULT_WINDOW_SECS)
    }

    /// 超出允许范围的窗口返回 400
    fn window(&self) -> Result<Duration, Response> {
        let secs = self.secs();
        if secs > MAX_WINDOW_SECS {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("window_secs cannot exceed {}", MAX_WINDOW_SECS),
            ));
        }
        i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "window_secs is out of range"))
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    fn range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start, self.end) {
            (None, None) => None,
            (start, end) => Some((
                start.unwrap_or(DateTime::<Utc>::MIN_UTC),
                end.unwrap_or(DateTime::<Utc>::MAX_UTC),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub acknowledged_by: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchTrendRequest {
    pub query: String,
    pub latency: f64,
    pub success: bool,
}

fn parse_metric(metric: &str) -> Result<MetricType, Response> {
    metric
        .parse()
        .map_err(|e| error_response(StatusCode::NOT_FOUND, format!("{}", e)))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn record_metric(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordMetricRequest>,
) -> impl IntoResponse {
    state.monitor.record_metric(req.metric, req.value, req.context).await;
    (StatusCode::ACCEPTED, Json(json!({ "status": "recorded" })))
}

async fn metric_stats(
    State(state): State<Arc<AppState>>,
    Path(metric): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Response {
    let metric = match parse_metric(&metric) {
        Ok(metric) => metric,
        Err(response) => return response,
    };
    let window = match query.window() {
        Ok(window) => window,
        Err(response) => return response,
    };

    let stats = state.monitor.get_metric_stats(metric, window).await;
    Json(json!({
        "metric": metric,
        "window_secs": query.secs(),
        "stats": stats,
    }))
    .into_response()
}

async fn metric_history(
    State(state): State<Arc<AppState>>,
    Path(metric): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let metric = match parse_metric(&metric) {
        Ok(metric) => metric,
        Err(response) => return response,
    };

    Json(state.monitor.get_historical_metrics(metric, query.range()).await).into_response()
}

async fn performance_report(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.generate_performance_report().await)
}

async fn system_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.get_system_health().await)
}

async fn health_report(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.generate_health_report().await)
}

async fn monitor_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.status().await)
}

async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WindowQuery>,
) -> Response {
    match query.window() {
        Ok(window) => Json(state.monitor.get_recent_alerts(window).await).into_response(),
        Err(response) => response,
    }
}

async fn alert_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(state.monitor.get_alert_history(query.limit.unwrap_or(100)).await)
}

async fn active_alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.get_active_alerts().await)
}

async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(alert_id): Path<String>,
    Json(req): Json<AcknowledgeRequest>,
) -> Response {
    if state
        .monitor
        .acknowledge_alert(&alert_id, &req.acknowledged_by)
        .await
    {
        Json(json!({ "id": alert_id, "acknowledged": true })).into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("Alert not found: {}", alert_id))
    }
}

async fn list_thresholds(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.thresholds().await)
}

async fn update_threshold(
    State(state): State<Arc<AppState>>,
    Json(config): Json<AlertThresholdConfig>,
) -> Response {
    match state.monitor.set_threshold(config.clone()).await {
        Ok(()) => Json(config).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn record_trend(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchTrendRequest>,
) -> impl IntoResponse {
    state
        .monitor
        .record_search_trend(&req.query, req.latency, req.success)
        .await;
    (StatusCode::ACCEPTED, Json(json!({ "status": "recorded" })))
}

async fn list_trends(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(state.monitor.get_search_trends(query.limit.unwrap_or(20)).await)
}

async fn list_anomalies(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.get_anomalies().await)
}

async fn get_notifications(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.notification_config().await)
}

async fn configure_notifications(
    State(state): State<Arc<AppState>>,
    Json(config): Json<NotificationConfig>,
) -> impl IntoResponse {
    state.monitor.configure_notifications(config.clone()).await;
    Json(config)
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.monitor.export_prometheus().await {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/v1/metrics", post(record_metric))
        .route("/api/v1/metrics/:metric/stats", get(metric_stats))
        .route("/api/v1/metrics/:metric/history", get(metric_history))
        .route("/api/v1/report", get(performance_report))
        .route("/api/v1/status", get(monitor_status))
        .route("/api/v1/system/health", get(system_health))
        .route("/api/v1/system/health/report", get(health_report))
        .route("/api/v1/alerts", get(recent_alerts))
        .route("/api/v1/alerts/active", get(active_alerts))
        .route("/api/v1/alerts/history", get(alert_history))
        .route("/api/v1/alerts/:id/ack", post(acknowledge_alert))
        .route("/api/v1/thresholds", get(list_thresholds).put(update_threshold))
        .route("/api/v1/trends", post(record_trend).get(list_trends))
        .route("/api/v1/anomalies", get(list_anomalies))
        .route(
            "/api/v1/notifications",
            put(configure_notifications).get(get_notifications),
        )
        .route("/api/v1/stream", get(ws::stream_handler))
        .with_state(state)
}
