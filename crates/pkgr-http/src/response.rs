//! Turning pipeline results into HTTP responses.

use crate::error::ApiError;
use axum::http::{StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use pkgr_core::{ApplyResponse, Encoding, Object, PkgError};
use pkgr_runtime::ApplyOutcome;
use serde::Serialize;

/// Content type of every apply response.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Map an [`ApplyOutcome`] to its status code and body.
///
/// | outcome                     | status | body                        |
/// |-----------------------------|--------|-----------------------------|
/// | dry run completed           | 200    | diff, summary               |
/// | validation failed           | 422    | diff, summary, errors       |
/// | applied with partial errors | 201    | diff, summary, errors       |
/// | applied clean               | 201    | diff, summary               |
/// | hard failure                | mapped | error body                  |
pub fn assemble(outcome: ApplyOutcome) -> Response {
    match outcome {
        ApplyOutcome::DryRunCompleted { diff, summary } => json_response(
            StatusCode::OK,
            &ApplyResponse {
                diff,
                summary,
                errors: Vec::new(),
            },
        ),
        ApplyOutcome::ValidationFailed {
            diff,
            summary,
            errors,
        } => json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &ApplyResponse {
                diff,
                summary,
                errors,
            },
        ),
        ApplyOutcome::AppliedWithPartialErrors {
            diff,
            summary,
            errors,
        } => json_response(
            StatusCode::CREATED,
            &ApplyResponse {
                diff,
                summary,
                errors,
            },
        ),
        ApplyOutcome::AppliedClean { diff, summary } => json_response(
            StatusCode::CREATED,
            &ApplyResponse {
                diff,
                summary,
                errors: Vec::new(),
            },
        ),
        ApplyOutcome::HardFailure(err) => ApiError(err).into_response(),
    }
}

/// Write an exported package in the caller's encoding: YAML when they asked
/// for YAML, JSON otherwise.
pub fn encode_package(objects: &[Object], encoding: Encoding) -> Response {
    match encoding {
        Encoding::Yaml => match serde_yaml::to_string(objects) {
            Ok(text) => (
                StatusCode::OK,
                [(CONTENT_TYPE, Encoding::Yaml.media_type())],
                text,
            )
                .into_response(),
            Err(err) => marshal_failure(Encoding::Yaml, err),
        },
        _ => json_response(StatusCode::OK, &objects),
    }
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec_pretty(body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response(),
        Err(err) => marshal_failure(Encoding::Json, err),
    }
}

fn marshal_failure(encoding: Encoding, err: impl std::fmt::Display) -> Response {
    tracing::error!(%encoding, error = %err, "Failed to encode response");
    ApiError(PkgError::Internal(anyhow::anyhow!(
        "unable to marshal {encoding}; Err: {err}"
    )))
    .into_response()
}
