//! Engine results carried through the pipeline untouched.

use crate::id::Id;
use crate::package::{Association, Kind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a dry run decided to do with a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    New,
    Update,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub kind: Kind,
    pub name: String,
    pub action: DiffAction,

    /// Identifier of the existing resource, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Map<String, Value>>,

    #[serde(default)]
    pub new: Map<String, Value>,
}

/// Proposed changes, in package order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub resources: Vec<DiffEntry>,
}

impl Diff {
    pub fn count(&self, action: DiffAction) -> usize {
        self.resources
            .iter()
            .filter(|entry| entry.action == action)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub kind: Kind,
    pub name: String,

    /// Assigned once the resource exists; absent for resources a dry run
    /// would create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub spec: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

/// The resource set that would result, or did result, from a package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub resources: Vec<SummaryEntry>,

    /// Secret keys referenced by the package that are not yet known.
    #[serde(rename = "missingSecrets", default)]
    pub missing_secrets: Vec<String>,
}
