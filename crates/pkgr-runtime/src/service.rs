//! The reconciliation engine seam.
//!
//! The pipeline never decides what a package changes; it asks a
//! [`PackageService`] and interprets the answer.

use async_trait::async_trait;
use pkgr_core::{Diff, Id, Package, PkgError, ResourceToClone, Summary};
use std::collections::BTreeMap;

/// Options for the state-changing apply call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Secret values referenced by the package, by key.
    pub secrets: BTreeMap<String, String>,
}

impl ApplyOptions {
    pub fn with_secrets(secrets: BTreeMap<String, String>) -> Self {
        Self { secrets }
    }
}

/// What an export should contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatePackageOptions {
    /// Every resource of these organizations.
    pub org_ids: Vec<Id>,
    /// Specific resources, in addition to the organizations above.
    pub resources: Vec<ResourceToClone>,
}

#[async_trait]
pub trait PackageService: Send + Sync {
    /// Compute what applying `pkg` would change, without changing anything.
    ///
    /// The summary and diff are returned even when the result is an error,
    /// so callers can show what would have happened. A
    /// [`PkgError::Parse`] means the package failed the engine's semantic
    /// checks.
    async fn dry_run(
        &self,
        org_id: Id,
        user_id: Id,
        pkg: &Package,
    ) -> (Summary, Diff, Result<(), PkgError>);

    /// Persist the changes described by `pkg`.
    ///
    /// Apply is partially tolerant: a [`PkgError::Parse`] lists the resources
    /// that were rejected while the returned summary reflects those that were
    /// applied. Nothing is rolled back.
    async fn apply(
        &self,
        org_id: Id,
        user_id: Id,
        pkg: &Package,
        opts: ApplyOptions,
    ) -> (Summary, Result<(), PkgError>);

    /// Export existing resources as a package.
    async fn create_package(&self, opts: CreatePackageOptions) -> Result<Package, PkgError>;
}
