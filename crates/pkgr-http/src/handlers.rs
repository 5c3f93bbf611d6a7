//! HTTP handlers for the package API.

use crate::error::ApiError;
use crate::response;
use crate::state::AppState;
use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use pkgr_core::{ApplyRequest, CreatePackageRequest, Encoding, Id, PkgError};
use pkgr_runtime::{Authorizer, CreatePackageOptions, MAX_PACKAGE_BYTES};

/// Upper bound on a request body, inline packages included. Remote packages
/// are held to the same limit by the fetcher.
pub const MAX_BODY_BYTES: usize = MAX_PACKAGE_BYTES;

/// Media types the export endpoint accepts its request in.
const EXPORT_CONTENT_TYPES: &[&str] = &["text/yml", "application/x-yaml", "application/json"];

/// Encoding of the request body, from its `Content-Type` header.
pub fn request_encoding(headers: &HeaderMap) -> Encoding {
    Encoding::from_content_type(headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()))
}

/// `POST /api/v2/packages/apply`
pub async fn apply_package(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let encoding = request_encoding(&parts.headers);
    let authorizer = parts.extensions.get::<Authorizer>().copied();

    let bytes = read_body(body, encoding).await?;
    let apply: ApplyRequest = state.parser().decode_document(encoding, &bytes)?;

    tracing::debug!(
        org_id = %apply.org_id,
        dry_run = apply.dry_run,
        remote = apply.remote.is_set(),
        %encoding,
        "Applying package"
    );

    let outcome = state
        .orchestrator()
        .orchestrate(apply, encoding, authorizer.as_ref())
        .await;
    Ok(response::assemble(outcome))
}

/// `POST /api/v2/packages`
///
/// Exports existing resources as a package, written in YAML when the request
/// was YAML and JSON otherwise.
pub async fn create_package(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    if parts.extensions.get::<Authorizer>().is_none() {
        return Err(PkgError::Unauthorized("authorizer not found on request".to_string()).into());
    }
    let encoding = export_encoding(&parts.headers)?;

    let bytes = read_body(body, encoding).await?;
    let create: CreatePackageRequest = state.parser().decode_document(encoding, &bytes)?;
    if create.org_ids.is_empty() && create.resources.is_empty() {
        return Err(PkgError::Unprocessable(
            "at least 1 resource or 1 org id must be provided".to_string(),
        )
        .into());
    }

    let org_ids = create
        .org_ids
        .iter()
        .filter_map(|raw| match raw.parse::<Id>() {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::debug!(org_id = %raw, error = %err, "Skipping invalid org id");
                None
            }
        })
        .collect();

    let opts = CreatePackageOptions {
        org_ids,
        resources: create.resources,
    };
    let pkg = state.service().create_package(opts).await.map_err(|err| {
        tracing::error!(error = %err, "Failed to create package");
        err
    })?;

    Ok(response::encode_package(pkg.objects(), encoding))
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pkgr",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn read_body(body: Body, encoding: Encoding) -> Result<Vec<u8>, PkgError> {
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|err| PkgError::Decode {
            encoding,
            message: err.to_string(),
        })?;
    Ok(bytes.to_vec())
}

/// Encoding of an export request.
///
/// A missing header is JSON; anything present must be one of
/// [`EXPORT_CONTENT_TYPES`]. Parameters are ignored here, so unlike
/// [`request_encoding`] a `text/yml; charset=utf-8` export is YAML.
fn export_encoding(headers: &HeaderMap) -> Result<Encoding, PkgError> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(Encoding::Json);
    };
    let raw = value.to_str().unwrap_or_default();
    let media_type = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if EXPORT_CONTENT_TYPES.contains(&media_type.as_str()) {
        Ok(Encoding::from_content_type(Some(media_type.as_str())))
    } else {
        Err(PkgError::UnsupportedMediaType(format!(
            "unsupported content type {raw:?}"
        )))
    }
}
