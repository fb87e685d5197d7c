//! API route definitions.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::drift::DriftReport;
use crate::error::InferenceError;
use crate::features::TelemetryRecord;
use crate::scoring::PredictionResult;

/// Unversioned endpoints scraped by health checks and Prometheus.
pub fn root_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/predict/sequence", post(predict_sequence))
        .route("/drift", get(drift_report))
        .route("/drift/reset", post(drift_reset))
}

/// Inference failure rendered as `{"error": {"kind", "message"}}`.
pub struct ApiError(InferenceError);

impl From<InferenceError> for ApiError {
    fn from(e: InferenceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_caller_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let summary = state.service.artifact_summary();
    let status = if summary.models_loaded { "ok" } else { "degraded" };
    Json(json!({
        "data": {
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "variant": state.service.variant().to_string(),
            "artifacts": summary,
            "sequence_available": state.service.sequence_available(),
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn predict(
    State(state): State<AppState>,
    Json(record): Json<TelemetryRecord>,
) -> Result<Json<PredictionResult>, ApiError> {
    Ok(Json(state.service.predict(&record)?))
}

#[derive(Debug, Deserialize)]
struct SequenceRequest {
    records: Vec<TelemetryRecord>,
}

async fn predict_sequence(
    State(state): State<AppState>,
    Json(request): Json<SequenceRequest>,
) -> Result<Json<PredictionResult>, ApiError> {
    let score = state.service.predict_sequence(&request.records)?;
    Ok(Json(score.result))
}

async fn drift_report(State(state): State<AppState>) -> Json<DriftReport> {
    Json(state.service.drift_report())
}

async fn drift_reset(State(state): State<AppState>) -> StatusCode {
    state.service.reset_drift();
    StatusCode::NO_CONTENT
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, state.service.metrics_content_type())],
        state.service.render_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::config::ServiceConfig;
    use crate::features::DomainVariant;
    use crate::model::{LogisticModel, ModelArtifactSet, StandardScaler, ZScoreEnvelope};
    use crate::service::InferenceService;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn app(artifacts: ModelArtifactSet) -> Router {
        let mut config = ServiceConfig::default();
        config.features.variant = DomainVariant::Engine;
        let service = InferenceService::new(artifacts, &config).unwrap();
        router(AppState::new(Arc::new(service)))
    }

    fn loaded() -> ModelArtifactSet {
        ModelArtifactSet::default()
            .with_version("v1")
            .with_scaler(StandardScaler::new(vec![0.0; 5], vec![1.0; 5]))
            .with_anomaly_detector(ZScoreEnvelope::new(3.0))
            .with_classifier(LogisticModel::new(vec![0.0, -1.0, 0.0, 1.0, 0.0], -2.0))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 100_000)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn parse(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_artifacts() {
        let (status, body) = send(app(loaded()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let json = parse(&body);
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["variant"], "engine");
        assert_eq!(json["data"]["artifacts"]["version"], "v1");
        assert_eq!(json["data"]["sequence_available"], true);

        let (_, body) = send(app(ModelArtifactSet::default()), "GET", "/api/v1/health", None).await;
        let json = parse(&body);
        assert_eq!(json["data"]["status"], "degraded");
        assert_eq!(json["data"]["sequence_available"], false);
    }

    #[tokio::test]
    async fn test_predict_returns_result() {
        let record = json!({"id": "E-1", "vibration_level": 6.0});
        let (status, body) = send(app(loaded()), "POST", "/api/v1/predict", Some(record)).await;
        assert_eq!(status, StatusCode::OK);
        let json = parse(&body);
        assert_eq!(json["anomaly"], true);
        assert_eq!(json["prediction"], 1);
        assert!(json["failure_probability"].as_f64().unwrap() > 0.5);
    }

    #[tokio::test]
    async fn test_models_not_loaded_is_server_error() {
        let record = json!({"vibration_level": 1.0});
        let (status, body) = send(app(ModelArtifactSet::default()), "POST", "/api/v1/predict", Some(record)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(parse(&body)["error"]["kind"], "models_not_loaded");
    }

    #[tokio::test]
    async fn test_empty_sequence_is_unprocessable() {
        let (status, body) = send(
            app(loaded()),
            "POST",
            "/api/v1/predict/sequence",
            Some(json!({"records": []})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(parse(&body)["error"]["kind"], "insufficient_data");
    }

    #[tokio::test]
    async fn test_sequence_predict() {
        let records: Vec<Value> = (0..10)
            .map(|t| json!({"oil_pressure_psi": -(t as f64) / 3.0}))
            .collect();
        let (status, body) = send(
            app(loaded()),
            "POST",
            "/api/v1/predict/sequence",
            Some(json!({ "records": records })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse(&body)["prediction"], 1);
    }

    #[tokio::test]
    async fn test_drift_without_reference() {
        let (status, body) = send(app(loaded()), "GET", "/api/v1/drift", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse(&body)["status"], "no_reference_data");

        let (status, _) = send(app(loaded()), "POST", "/api/v1/drift/reset", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let app = app(loaded());
        let record = json!({"vibration_level": 0.0});
        send(app.clone(), "POST", "/api/v1/predict", Some(record)).await;

        let (status, body) = send(app, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("predictions_total 1\n"));
        assert!(text.contains("anomalies_total 0\n"));
        assert!(text.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _) = send(app(loaded()), "GET", "/api/v2/predict", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
