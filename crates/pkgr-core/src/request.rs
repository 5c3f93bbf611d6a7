//! Wire shapes of the package endpoints, shared by server and client.

use crate::diff::{Diff, Summary};
use crate::encoding::PackageRemote;
use crate::error::ValidationErr;
use crate::id::Id;
use crate::package::Kind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Body of `POST /api/v2/packages/apply`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyRequest {
    #[serde(rename = "dryRun", default)]
    pub dry_run: bool,

    #[serde(rename = "orgID", default)]
    pub org_id: String,

    #[serde(default)]
    pub remote: PackageRemote,

    /// Inline package, used only when `remote` has no URL. Either encoded
    /// text or an already structured document.
    #[serde(rename = "package", default, skip_serializing_if = "Option::is_none")]
    pub raw_package: Option<Value>,

    /// Secret values injected at apply time, by key.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// Body of a successful (or partially successful) apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub diff: Diff,
    pub summary: Summary,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationErr>,
}

/// An existing resource to include in an exported package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceToClone {
    pub kind: Kind,
    pub id: Id,

    /// Name to give the resource in the package; defaults to its current name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of `POST /api/v2/packages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatePackageRequest {
    #[serde(rename = "orgIDs", default)]
    pub org_ids: Vec<String>,

    #[serde(default)]
    pub resources: Vec<ResourceToClone>,
}
