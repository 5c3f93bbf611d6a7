//! [`PackageService`] over a remote pkgr server.
//!
//! The server folds dry run and apply into one request, so this client does
//! too: [`PackageService::dry_run`] sends `dryRun: true` and
//! [`PackageService::apply`] sends the full pipeline. Status codes are mapped
//! back into the same [`PkgError`] kinds the server started from.

use crate::error::code_for_status;
use crate::routes::{APPLY_PATH, PACKAGES_PATH};
use async_trait::async_trait;
use axum::http::StatusCode;
use pkgr_core::{
    ApplyRequest, ApplyResponse, CreatePackageRequest, Diff, ErrorBody, ErrorCode, Id, Object,
    Package, ParseError, PkgError, Summary,
};
use pkgr_runtime::{ApplyOptions, CreatePackageOptions, PackageService};

/// HTTP client for the package endpoints.
#[derive(Debug, Clone)]
pub struct HttpPackageClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpPackageClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            http,
        }
    }

    /// Send `Authorization: Token <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Post an apply request as-is and return the status alongside the body.
    ///
    /// 200, 201 and 422 carrying a diff and summary come back as `Ok`;
    /// everything else is an error rebuilt from the response.
    pub async fn send_apply(
        &self,
        request: &ApplyRequest,
    ) -> Result<(StatusCode, ApplyResponse), PkgError> {
        let response = self
            .post(APPLY_PATH)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if (status.is_success() || status == StatusCode::UNPROCESSABLE_ENTITY)
            && let Ok(body) = serde_json::from_slice::<ApplyResponse>(&bytes)
        {
            return Ok((status, body));
        }
        Err(error_from_response(status, &bytes))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.post(format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Token {token}")),
            None => builder,
        }
    }

    fn apply_request(org_id: Id, pkg: &Package, dry_run: bool) -> ApplyRequest {
        ApplyRequest {
            dry_run,
            org_id: org_id.to_string(),
            raw_package: Some(pkg.to_value()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PackageService for HttpPackageClient {
    // The user id comes from the token on the server side.
    async fn dry_run(
        &self,
        org_id: Id,
        _user_id: Id,
        pkg: &Package,
    ) -> (Summary, Diff, Result<(), PkgError>) {
        match self.send_apply(&Self::apply_request(org_id, pkg, true)).await {
            Ok((status, body)) if status == StatusCode::UNPROCESSABLE_ENTITY => {
                let err = ParseError::new(body.errors).into();
                (body.summary, body.diff, Err(err))
            }
            Ok((_, body)) => (body.summary, body.diff, Ok(())),
            Err(err) => (Summary::default(), Diff::default(), Err(err)),
        }
    }

    async fn apply(
        &self,
        org_id: Id,
        _user_id: Id,
        pkg: &Package,
        opts: ApplyOptions,
    ) -> (Summary, Result<(), PkgError>) {
        let mut request = Self::apply_request(org_id, pkg, false);
        request.secrets = opts.secrets;

        match self.send_apply(&request).await {
            // The server's dry run refused the package: nothing was applied.
            Ok((status, body)) if status == StatusCode::UNPROCESSABLE_ENTITY => {
                (Summary::default(), Err(rejected_before_apply(&body)))
            }
            Ok((_, body)) if !body.errors.is_empty() => {
                (body.summary, Err(ParseError::new(body.errors).into()))
            }
            Ok((_, body)) => (body.summary, Ok(())),
            Err(err) => (Summary::default(), Err(err)),
        }
    }

    async fn create_package(&self, opts: CreatePackageOptions) -> Result<Package, PkgError> {
        let request = CreatePackageRequest {
            org_ids: opts.org_ids.iter().map(Id::to_string).collect(),
            resources: opts.resources,
        };
        let response = self
            .post(PACKAGES_PATH)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(error_from_response(status, &bytes));
        }

        let objects: Vec<Object> = serde_json::from_slice(&bytes).map_err(|err| {
            PkgError::Internal(anyhow::anyhow!("unable to decode exported package: {err}"))
        })?;
        Ok(Package::from_trusted(objects))
    }
}

/// A 422 on apply is not a partial failure, so it must not come back as
/// [`PkgError::Parse`].
fn rejected_before_apply(body: &ApplyResponse) -> PkgError {
    let reasons: Vec<&str> = body.errors.iter().map(|e| e.reason.as_str()).collect();
    PkgError::Api {
        code: ErrorCode::UnprocessableEntity,
        message: format!("package rejected by dry run: {}", reasons.join("; ")),
    }
}

fn transport_error(err: reqwest::Error) -> PkgError {
    PkgError::Internal(err.into())
}

fn error_from_response(status: StatusCode, bytes: &[u8]) -> PkgError {
    match serde_json::from_slice::<ErrorBody>(bytes) {
        Ok(body) => PkgError::from_body(body),
        Err(_) => PkgError::Api {
            code: code_for_status(status),
            message: format!("unexpected status {status}: {}", String::from_utf8_lossy(bytes)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgr_core::{DiffAction, DiffEntry, Kind, SummaryEntry, ValidationErr};
    use serde_json::{Map, json};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn org() -> Id {
        "00000000000000aa".parse().unwrap()
    }

    fn user() -> Id {
        "00000000000000bb".parse().unwrap()
    }

    fn package() -> Package {
        Package::from_trusted(vec![Object::new(Kind::Label, "team", Map::new())])
    }

    fn response_body(errors: Vec<ValidationErr>) -> ApplyResponse {
        ApplyResponse {
            diff: Diff {
                resources: vec![DiffEntry {
                    kind: Kind::Label,
                    name: "team".into(),
                    action: DiffAction::New,
                    id: None,
                    old: None,
                    new: Map::new(),
                }],
            },
            summary: Summary {
                resources: vec![SummaryEntry {
                    kind: Kind::Label,
                    name: "team".into(),
                    id: None,
                    spec: Map::new(),
                    associations: Vec::new(),
                }],
                missing_secrets: Vec::new(),
            },
            errors,
        }
    }

    #[tokio::test]
    async fn test_dry_run_sends_token_and_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(APPLY_PATH))
            .and(header("Authorization", "Token secret"))
            .and(body_partial_json(json!({ "dryRun": true, "orgID": "00000000000000aa" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body(Vec::new())))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpPackageClient::new(server.uri()).with_token("secret");
        let (summary, diff, result) = client.dry_run(org(), user(), &package()).await;
        assert!(result.is_ok());
        assert_eq!(summary.resources.len(), 1);
        assert_eq!(diff.resources[0].action, DiffAction::New);
    }

    #[tokio::test]
    async fn test_dry_run_validation_failure_is_parse_error() {
        let server = MockServer::start().await;
        let errors = vec![ValidationErr::new("bad color").kind("Label")];
        Mock::given(method("POST"))
            .and(path(APPLY_PATH))
            .respond_with(ResponseTemplate::new(422).set_body_json(response_body(errors)))
            .mount(&server)
            .await;

        let client = HttpPackageClient::new(server.uri());
        let (summary, _, result) = client.dry_run(org(), user(), &package()).await;
        let err = result.unwrap_err();
        assert!(err.is_parse_error());
        assert_eq!(err.validation_errors()[0].reason, "bad color");
        assert_eq!(summary.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_apply_is_parse_error() {
        let server = MockServer::start().await;
        let errors = vec![ValidationErr::new("missing secret").kind("Variable")];
        Mock::given(method("POST"))
            .and(path(APPLY_PATH))
            .and(body_partial_json(json!({ "dryRun": false, "secrets": { "k": "v" } })))
            .respond_with(ResponseTemplate::new(201).set_body_json(response_body(errors)))
            .mount(&server)
            .await;

        let client = HttpPackageClient::new(server.uri());
        let opts = ApplyOptions::with_secrets([("k".to_string(), "v".to_string())].into());
        let (summary, result) = client.apply(org(), user(), &package(), opts).await;
        assert!(result.unwrap_err().is_parse_error());
        assert_eq!(summary.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_apply_differs_from_partial_apply() {
        let errors = vec![ValidationErr::new("retention too short").kind("Bucket")];

        let rejected = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(APPLY_PATH))
            .respond_with(ResponseTemplate::new(422).set_body_json(response_body(errors.clone())))
            .mount(&rejected)
            .await;
        let partial = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(APPLY_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(response_body(errors)))
            .mount(&partial)
            .await;

        let (summary, result) = HttpPackageClient::new(rejected.uri())
            .apply(org(), user(), &package(), ApplyOptions::default())
            .await;
        let err = result.unwrap_err();
        assert!(!err.is_parse_error());
        assert_eq!(err.code(), ErrorCode::UnprocessableEntity);
        assert!(err.to_string().contains("retention too short"), "{err}");
        assert!(summary.resources.is_empty());

        let (summary, result) = HttpPackageClient::new(partial.uri())
            .apply(org(), user(), &package(), ApplyOptions::default())
            .await;
        assert!(result.unwrap_err().is_parse_error());
        assert_eq!(summary.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_error_body_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(APPLY_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "unauthorized",
                "message": "authorizer not found on request"
            })))
            .mount(&server)
            .await;

        let client = HttpPackageClient::new(server.uri());
        let (_, result) = client
            .apply(org(), user(), &package(), ApplyOptions::default())
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert!(err.to_string().contains("authorizer not found"), "{err}");
    }

    #[tokio::test]
    async fn test_create_package() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PACKAGES_PATH))
            .and(body_partial_json(json!({ "orgIDs": ["00000000000000aa"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(package().objects()))
            .mount(&server)
            .await;

        let client = HttpPackageClient::new(format!("{}/", server.uri()));
        let pkg = client
            .create_package(CreatePackageOptions {
                org_ids: vec![org()],
                resources: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(pkg, package());
    }

    #[tokio::test]
    async fn test_status_without_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpPackageClient::new(server.uri());
        let err = client
            .create_package(CreatePackageOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
