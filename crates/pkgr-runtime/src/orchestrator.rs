use crate::fetch::RemoteFetcher;
use crate::service::{ApplyOptions, PackageService};
use crate::source::resolve_package;
use pkgr_core::{ApplyRequest, Diff, Encoding, Id, PackageParser, PkgError, Summary, ValidationErr};
use std::sync::Arc;

/// Identity of the acting user, attached to a request by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorizer {
    pub user_id: Id,
}

/// Terminal state of one apply request.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Dry run succeeded and the caller asked for nothing more.
    DryRunCompleted { diff: Diff, summary: Summary },

    /// The package failed the engine's semantic checks during dry run.
    /// Nothing was changed.
    ValidationFailed {
        diff: Diff,
        summary: Summary,
        errors: Vec<ValidationErr>,
    },

    /// Apply ran and some resources were rejected. The summary reflects
    /// what was applied.
    AppliedWithPartialErrors {
        diff: Diff,
        summary: Summary,
        errors: Vec<ValidationErr>,
    },

    AppliedClean { diff: Diff, summary: Summary },

    /// Nothing useful to report beyond the error.
    HardFailure(PkgError),
}

/// Sequences identity, parse, dry run and apply for one request.
pub struct Orchestrator {
    service: Arc<dyn PackageService>,
    fetcher: Arc<dyn RemoteFetcher>,
    parser: PackageParser,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn PackageService>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            service,
            fetcher,
            parser: PackageParser::default(),
        }
    }

    pub fn with_parser(mut self, parser: PackageParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn parser(&self) -> &PackageParser {
        &self.parser
    }

    pub fn service(&self) -> &Arc<dyn PackageService> {
        &self.service
    }

    /// Run the apply pipeline for `request`, whose inline payload (if any) is
    /// in `encoding`.
    pub async fn orchestrate(
        &self,
        request: ApplyRequest,
        encoding: Encoding,
        authorizer: Option<&Authorizer>,
    ) -> ApplyOutcome {
        let Ok(org_id) = request.org_id.parse::<Id>() else {
            return ApplyOutcome::HardFailure(PkgError::InvalidOrg(request.org_id));
        };
        let Some(user_id) = authorizer.map(|auth| auth.user_id) else {
            return ApplyOutcome::HardFailure(PkgError::Unauthorized(
                "authorizer not found on request".to_string(),
            ));
        };

        let pkg = match resolve_package(&request, encoding, &self.parser, self.fetcher.as_ref()).await {
            Ok(pkg) => pkg,
            Err(err) => {
                tracing::debug!(%org_id, error = %err, "Failed to resolve package");
                return ApplyOutcome::HardFailure(err);
            }
        };

        let (summary, diff, dry_run) = self.service.dry_run(org_id, user_id, &pkg).await;
        if let Err(err) = dry_run {
            if err.is_parse_error() {
                return ApplyOutcome::ValidationFailed {
                    diff,
                    summary,
                    errors: err.validation_errors(),
                };
            }
            tracing::error!(%org_id, %user_id, error = %err, "Failed to dry run package");
            return ApplyOutcome::HardFailure(err);
        }

        // Nothing destructive happens before this point.
        if request.dry_run {
            return ApplyOutcome::DryRunCompleted { diff, summary };
        }

        let opts = ApplyOptions::with_secrets(request.secrets);
        let (summary, applied) = self.service.apply(org_id, user_id, &pkg, opts).await;
        match applied {
            Ok(()) => {
                tracing::info!(
                    %org_id,
                    %user_id,
                    resources = summary.resources.len(),
                    "Applied package"
                );
                ApplyOutcome::AppliedClean { diff, summary }
            }
            Err(err) if err.is_parse_error() => {
                let errors = err.validation_errors();
                tracing::warn!(
                    %org_id,
                    %user_id,
                    rejected = errors.len(),
                    "Applied package with errors"
                );
                ApplyOutcome::AppliedWithPartialErrors {
                    diff,
                    summary,
                    errors,
                }
            }
            Err(err) => {
                tracing::error!(%org_id, %user_id, error = %err, "Failed to apply package");
                ApplyOutcome::HardFailure(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::CreatePackageOptions;
    use async_trait::async_trait;
    use pkgr_core::{DiffAction, DiffEntry, Package, PackageRemote, ParseError, SummaryEntry};
    use serde_json::json;
    use std::sync::Mutex;

    const ORG: &str = "00000000000000aa";

    fn user() -> Authorizer {
        Authorizer {
            user_id: "00000000000000bb".parse().unwrap(),
        }
    }

    fn package_json(names: &[&str]) -> serde_json::Value {
        json!(names
            .iter()
            .map(|name| json!({
                "apiVersion": "pkgr.dev/v1alpha1",
                "kind": "Label",
                "metadata": { "name": name }
            }))
            .collect::<Vec<_>>())
    }

    fn summary_of(pkg: &Package) -> Summary {
        Summary {
            resources: pkg
                .objects()
                .iter()
                .map(|o| SummaryEntry {
                    kind: o.kind,
                    name: o.name().to_string(),
                    id: None,
                    spec: o.spec.clone(),
                    associations: Vec::new(),
                })
                .collect(),
            missing_secrets: Vec::new(),
        }
    }

    fn diff_of(pkg: &Package) -> Diff {
        Diff {
            resources: pkg
                .objects()
                .iter()
                .map(|o| DiffEntry {
                    kind: o.kind,
                    name: o.name().to_string(),
                    action: DiffAction::New,
                    id: None,
                    old: None,
                    new: o.spec.clone(),
                })
                .collect(),
        }
    }

    #[derive(Clone, Copy)]
    enum Script {
        Ok,
        ParseFail,
        HardFail,
    }

    /// Engine double with scripted results and call recording.
    struct MockService {
        dry_run: Script,
        apply: Script,
        /// Names rejected by apply when `apply` is `ParseFail`.
        reject: Vec<&'static str>,
        calls: Mutex<Vec<&'static str>>,
        secrets: Mutex<Option<ApplyOptions>>,
    }

    impl MockService {
        fn new(dry_run: Script, apply: Script) -> Self {
            Self {
                dry_run,
                apply,
                reject: Vec::new(),
                calls: Mutex::new(Vec::new()),
                secrets: Mutex::new(None),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn rejection(reason: &str) -> PkgError {
        ParseError::single(ValidationErr::new(reason).kind("Label")).into()
    }

    #[async_trait]
    impl PackageService for MockService {
        async fn dry_run(
            &self,
            _org_id: Id,
            _user_id: Id,
            pkg: &Package,
        ) -> (Summary, Diff, Result<(), PkgError>) {
            self.calls.lock().unwrap().push("dry_run");
            let result = match self.dry_run {
                Script::Ok => Ok(()),
                Script::ParseFail => Err(rejection("engine rejected label")),
                Script::HardFail => Err(PkgError::Internal(anyhow::anyhow!("engine down"))),
            };
            (summary_of(pkg), diff_of(pkg), result)
        }

        async fn apply(
            &self,
            _org_id: Id,
            _user_id: Id,
            pkg: &Package,
            opts: ApplyOptions,
        ) -> (Summary, Result<(), PkgError>) {
            self.calls.lock().unwrap().push("apply");
            *self.secrets.lock().unwrap() = Some(opts);
            match self.apply {
                Script::Ok => {
                    let mut summary = summary_of(pkg);
                    for entry in &mut summary.resources {
                        entry.id = Some(Id::generate());
                    }
                    (summary, Ok(()))
                }
                Script::ParseFail => {
                    let applied: Vec<_> = pkg
                        .objects()
                        .iter()
                        .filter(|o| !self.reject.iter().any(|name| *name == o.name()))
                        .cloned()
                        .collect();
                    let errs = self
                        .reject
                        .iter()
                        .map(|name| ValidationErr::new(format!("{name} rejected")).kind("Label"))
                        .collect();
                    (
                        summary_of(&Package::from_trusted(applied)),
                        Err(ParseError::new(errs).into()),
                    )
                }
                Script::HardFail => (
                    Summary::default(),
                    Err(PkgError::Internal(anyhow::anyhow!("write failed"))),
                ),
            }
        }

        async fn create_package(&self, _opts: CreatePackageOptions) -> Result<Package, PkgError> {
            unreachable!("not used by the orchestrator")
        }
    }

    struct NoFetch;

    #[async_trait]
    impl RemoteFetcher for NoFetch {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, PkgError> {
            Err(PkgError::Fetch {
                url: url.to_string(),
                message: "offline".to_string(),
            })
        }
    }

    fn orchestrator(service: Arc<MockService>) -> Orchestrator {
        Orchestrator::new(service, Arc::new(NoFetch))
    }

    fn request(dry_run: bool, names: &[&str]) -> ApplyRequest {
        ApplyRequest {
            dry_run,
            org_id: ORG.to_string(),
            raw_package: Some(package_json(names)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dry_run_never_applies() {
        let service = Arc::new(MockService::new(Script::Ok, Script::Ok));
        let outcome = orchestrator(service.clone())
            .orchestrate(request(true, &["a", "b"]), Encoding::Json, Some(&user()))
            .await;

        match outcome {
            ApplyOutcome::DryRunCompleted { diff, summary } => {
                assert_eq!(diff.resources.len(), 2);
                assert_eq!(summary.resources.len(), 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(service.calls(), vec!["dry_run"]);
    }

    #[tokio::test]
    async fn test_clean_apply_replaces_summary() {
        let service = Arc::new(MockService::new(Script::Ok, Script::Ok));
        let mut req = request(false, &["a"]);
        req.secrets.insert("token".to_string(), "t0k".to_string());

        let outcome = orchestrator(service.clone())
            .orchestrate(req, Encoding::Json, Some(&user()))
            .await;

        match outcome {
            ApplyOutcome::AppliedClean { diff, summary } => {
                assert_eq!(diff.resources[0].action, DiffAction::New);
                assert!(summary.resources[0].id.is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(service.calls(), vec!["dry_run", "apply"]);
        let opts = service.secrets.lock().unwrap().clone().unwrap();
        assert_eq!(opts.secrets["token"], "t0k");
    }

    #[tokio::test]
    async fn test_dry_run_validation_failure_keeps_diff() {
        let service = Arc::new(MockService::new(Script::ParseFail, Script::Ok));
        let outcome = orchestrator(service.clone())
            .orchestrate(request(false, &["a"]), Encoding::Json, Some(&user()))
            .await;

        match outcome {
            ApplyOutcome::ValidationFailed {
                diff,
                summary,
                errors,
            } => {
                assert_eq!(diff.resources.len(), 1);
                assert_eq!(summary.resources.len(), 1);
                assert_eq!(errors[0].reason, "engine rejected label");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(service.calls(), vec!["dry_run"]);
    }

    #[tokio::test]
    async fn test_dry_run_hard_failure_stops() {
        let service = Arc::new(MockService::new(Script::HardFail, Script::Ok));
        let outcome = orchestrator(service.clone())
            .orchestrate(request(false, &["a"]), Encoding::Json, Some(&user()))
            .await;

        assert!(matches!(outcome, ApplyOutcome::HardFailure(PkgError::Internal(_))));
        assert_eq!(service.calls(), vec!["dry_run"]);
    }

    #[tokio::test]
    async fn test_partial_apply() {
        let mut mock = MockService::new(Script::Ok, Script::ParseFail);
        mock.reject = vec!["b", "d"];
        let service = Arc::new(mock);

        let outcome = orchestrator(service.clone())
            .orchestrate(request(false, &["a", "b", "c", "d"]), Encoding::Json, Some(&user()))
            .await;

        match outcome {
            ApplyOutcome::AppliedWithPartialErrors {
                diff,
                summary,
                errors,
            } => {
                assert_eq!(diff.resources.len(), 4);
                assert_eq!(errors.len(), 2);
                let applied: Vec<&str> = summary.resources.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(applied, vec!["a", "c"]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_apply_hard_failure() {
        let service = Arc::new(MockService::new(Script::Ok, Script::HardFail));
        let outcome = orchestrator(service)
            .orchestrate(request(false, &["a"]), Encoding::Json, Some(&user()))
            .await;
        assert!(matches!(outcome, ApplyOutcome::HardFailure(PkgError::Internal(_))));
    }

    #[tokio::test]
    async fn test_invalid_org_makes_no_engine_call() {
        let service = Arc::new(MockService::new(Script::Ok, Script::Ok));
        let mut req = request(false, &["a"]);
        req.org_id = "not-an-id".to_string();

        let outcome = orchestrator(service.clone())
            .orchestrate(req, Encoding::Json, Some(&user()))
            .await;

        assert!(matches!(outcome, ApplyOutcome::HardFailure(PkgError::InvalidOrg(ref id)) if id == "not-an-id"));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_authorizer() {
        let service = Arc::new(MockService::new(Script::Ok, Script::Ok));
        let outcome = orchestrator(service.clone())
            .orchestrate(request(false, &["a"]), Encoding::Json, None)
            .await;

        assert!(matches!(outcome, ApplyOutcome::HardFailure(PkgError::Unauthorized(_))));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_package_is_terminal() {
        let service = Arc::new(MockService::new(Script::Ok, Script::Ok));
        let mut req = request(false, &[]);
        req.raw_package = Some(json!("[{ broken"));

        let outcome = orchestrator(service.clone())
            .orchestrate(req, Encoding::Json, Some(&user()))
            .await;

        match outcome {
            ApplyOutcome::HardFailure(err) => {
                assert!(err.is_parse_error());
                assert!(!err.validation_errors().is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_fetch_failure() {
        let service = Arc::new(MockService::new(Script::Ok, Script::Ok));
        let mut req = request(false, &["a"]);
        req.remote = PackageRemote::new("https://example.com/pkg.json");

        let outcome = orchestrator(service.clone())
            .orchestrate(req, Encoding::Json, Some(&user()))
            .await;

        assert!(matches!(outcome, ApplyOutcome::HardFailure(PkgError::Fetch { .. })));
        assert!(service.calls().is_empty());
    }
}
