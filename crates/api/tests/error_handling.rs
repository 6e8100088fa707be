//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no HTTP server
//! is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use mediagate_api::error::AppError;
use mediagate_core::error::CoreError;
use mediagate_pipeline::PipelineError;
use mediagate_providers::ProviderError;

async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Model",
        id: 42,
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Model with id 42 not found");
}

#[tokio::test]
async fn pipeline_not_found_keeps_entity_message() {
    let err = AppError::Pipeline(PipelineError::Core(CoreError::NotFound {
        entity: "Provider",
        id: 7,
    }));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Provider with id 7 not found");
}

#[tokio::test]
async fn inactive_provider_returns_400() {
    let (status, json) = error_to_response(PipelineError::ProviderInactive(3).into()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "PROVIDER_INACTIVE");
    assert_eq!(json["error"], "Provider 3 is not active");
}

#[tokio::test]
async fn unsupported_driver_returns_400() {
    let err = PipelineError::Provider(ProviderError::DriverUnsupported("nope".into()));

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "UNSUPPORTED_DRIVER");
    assert_eq!(json["error"], "Unsupported provider driver 'nope'");
}

#[tokio::test]
async fn provider_validation_returns_400_with_message() {
    let err = PipelineError::Provider(ProviderError::Validation("at most 9 images".into()));

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "at most 9 images");
}

#[tokio::test]
async fn upstream_failures_are_sanitized() {
    let err = PipelineError::Provider(ProviderError::Api {
        status: 503,
        body: "secret upstream detail".into(),
    });

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn bad_request_returns_400() {
    let (status, json) =
        error_to_response(AppError::BadRequest("client_id is required".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "client_id is required");
}

#[tokio::test]
async fn internal_error_hides_details() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Internal("pool exhausted".into()))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "An internal error occurred");
}
