//! Inference server boundary using axum.
//!
//! Endpoints:
//! - POST /predict         - encrypted feature record in, diagnosis out
//! - GET  /download-model  - current model artifact for edge devices
//! - GET  /health          - liveness check

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ecgedge_ai::InferenceService;
use ecgedge_core::{Diagnosis, EncryptedEnvelope, PayloadCipher};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared request-side state. Everything here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InferenceService>,
    pub cipher: Arc<PayloadCipher>,
    /// Artifact served to edge devices.
    pub model_path: PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/download-model", get(download_model))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(bind: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(addr = %bind, "inference server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;
    info!("inference server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}

// ── Request / Response types ──

#[derive(Deserialize)]
pub struct PredictRequest {
    /// Base64 AES-CBC ciphertext of a JSON feature record.
    pub data: String,
}

/// `{"prediction": label}` on success, `{"error": message}` otherwise.
#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictResponse {
    Prediction(Diagnosis),
    Error(String),
}

// ── Handlers ──

/// Decrypt, parse and classify. Failures are reported in the body with
/// status 200, as existing clients expect.
async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Json<PredictResponse> {
    let outcome = tokio::task::spawn_blocking(move || classify_envelope(&state, &req.data)).await;
    let response = match outcome {
        Ok(Ok(label)) => PredictResponse::Prediction(label),
        Ok(Err(e)) => {
            warn!(error = %e, "prediction request rejected");
            PredictResponse::Error(e.to_string())
        }
        Err(e) => {
            warn!(error = %e, "prediction task failed");
            PredictResponse::Error("internal error".to_string())
        }
    };
    Json(response)
}

fn classify_envelope(state: &AppState, data: &str) -> anyhow::Result<Diagnosis> {
    let envelope = EncryptedEnvelope::from_base64(data)?;
    let record = state.cipher.decrypt(&envelope)?;
    let prediction = state.service.classify(&record)?;
    info!(
        label = %prediction.label,
        confidence = prediction.confidence,
        "classified payload"
    );
    Ok(prediction.label)
}

async fn download_model(State(state): State<AppState>) -> Response {
    match tokio::fs::read(&state.model_path).await {
        Ok(bytes) => {
            info!(bytes = bytes.len(), "serving model artifact");
            let disposition = format!(
                "attachment; filename=\"{}\"",
                ecgedge_store::artifact::CURRENT_FILE
            );
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "model file not found" })),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, path = %state.model_path.display(), "could not read model artifact");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "detail": format!("could not read model: {e}") })),
            )
                .into_response()
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ecgedge_ai::{Classifier, InferenceError, Scaler};
    use ecgedge_core::{FEATURE_COUNT, FeatureRecord, SharedSecret};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
    const IV: &[u8] = b"abcdef9876543210";

    /// Picks Heart Block for fast hearts and Normal otherwise.
    struct RateRule;

    impl Classifier for RateRule {
        fn scores(&self, features: &[f32; FEATURE_COUNT]) -> Result<Vec<f32>, InferenceError> {
            let mut scores = vec![0.0; Diagnosis::COUNT];
            if features[0] > 100.0 {
                scores[2] = 0.9;
            } else {
                scores[4] = 0.8;
            }
            Ok(scores)
        }
    }

    fn cipher() -> PayloadCipher {
        PayloadCipher::new(SharedSecret::new(KEY, IV).unwrap())
    }

    fn create_test_state() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let state = AppState {
            service: Arc::new(InferenceService::new(Arc::new(RateRule), Scaler::identity())),
            cipher: Arc::new(cipher()),
            model_path: dir.path().join("ecg_model.onnx"),
        };
        (dir, state)
    }

    fn record(heart_rate: f64) -> FeatureRecord {
        FeatureRecord {
            heart_rate,
            pr_interval: 160.0,
            qrs_duration: 90.0,
            st_segment: 0.1,
            qtc_interval: 400.0,
            electrical_axis: 30.0,
            rhythm: "Sinus".into(),
            t_wave: "Normal".into(),
        }
    }

    async fn post_predict(state: &AppState, data: &str) -> (StatusCode, serde_json::Value) {
        let body = serde_json::json!({ "data": data }).to_string();
        let resp = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state) = create_test_state();
        let resp = router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_predict_valid_payload() {
        let (_dir, state) = create_test_state();
        let envelope = cipher().encrypt(&record(75.0)).unwrap();

        let (status, body) = post_predict(&state, &envelope.to_base64()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "prediction": "Normal" }));
    }

    #[tokio::test]
    async fn test_predict_uses_classifier_output() {
        let (_dir, state) = create_test_state();
        let envelope = cipher().encrypt(&record(180.0)).unwrap();

        let (_, body) = post_predict(&state, &envelope.to_base64()).await;
        assert_eq!(body["prediction"], "Heart Block");
    }

    #[tokio::test]
    async fn test_predict_misaligned_ciphertext_reports_error() {
        let (_dir, state) = create_test_state();
        // 15 bytes of ciphertext.
        let (status, body) = post_predict(&state, "AAAAAAAAAAAAAAAAAAAA").await;
        assert_eq!(status, StatusCode::OK);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("multiple of 16"), "got {message}");
        assert!(body.get("prediction").is_none());
    }

    #[tokio::test]
    async fn test_predict_bad_base64_reports_error() {
        let (_dir, state) = create_test_state();
        let (status, body) = post_predict(&state, "not base64 !!").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["error"].as_str().unwrap().contains("base64"));
    }

    #[tokio::test]
    async fn test_predict_wrong_key_reports_error() {
        let (_dir, state) = create_test_state();
        let other = PayloadCipher::new(
            SharedSecret::new(b"ffffffffffffffffffffffffffffffff", IV).unwrap(),
        );
        let envelope = other.encrypt(&record(75.0)).unwrap();

        let (status, body) = post_predict(&state, &envelope.to_base64()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("error").is_some(), "got {body}");
    }

    #[tokio::test]
    async fn test_download_model_missing_is_404() {
        let (_dir, state) = create_test_state();
        let resp = router(state)
            .oneshot(Request::builder().uri("/download-model").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_model_serves_bytes() {
        let (_dir, state) = create_test_state();
        std::fs::write(&state.model_path, b"model-bytes").unwrap();

        let resp = router(state)
            .oneshot(Request::builder().uri("/download-model").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"model-bytes");
    }
}
