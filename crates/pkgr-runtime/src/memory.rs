//! In-process reconciliation engine.
//!
//! Keeps resources per organization in memory. Good enough for a single
//! server instance and for exercising the pipeline end to end.

use crate::service::{ApplyOptions, CreatePackageOptions, PackageService};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pkgr_core::{
    Diff, DiffAction, DiffEntry, Id, Kind, Object, Package, ParseError, PkgError, Summary,
    SummaryEntry, ValidationErr,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Shortest retention a bucket may have, in seconds. Zero means forever.
pub const MIN_RETENTION_SECONDS: u64 = 3600;

#[derive(Debug, Clone)]
struct StoredResource {
    id: Id,
    kind: Kind,
    name: String,
    spec: Map<String, Value>,
    updated_by: Id,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct OrgState {
    resources: Vec<StoredResource>,
    secrets: BTreeMap<String, String>,
}

impl OrgState {
    fn find(&self, kind: Kind, name: &str) -> Option<&StoredResource> {
        self.resources
            .iter()
            .find(|r| r.kind == kind && r.name == name)
    }
}

/// [`PackageService`] backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryPackageService {
    orgs: RwLock<HashMap<Id, OrgState>>,
}

impl MemoryPackageService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resources stored for an organization.
    pub async fn resource_count(&self, org_id: Id) -> usize {
        self.orgs
            .read()
            .await
            .get(&org_id)
            .map(|org| org.resources.len())
            .unwrap_or(0)
    }

    /// Identifier of a stored resource.
    pub async fn resource_id(&self, org_id: Id, kind: Kind, name: &str) -> Option<Id> {
        self.orgs
            .read()
            .await
            .get(&org_id)
            .and_then(|org| org.find(kind, name))
            .map(|r| r.id)
    }

    /// Who last wrote a stored resource, and when.
    pub async fn last_update(&self, org_id: Id, kind: Kind, name: &str) -> Option<(Id, DateTime<Utc>)> {
        self.orgs
            .read()
            .await
            .get(&org_id)
            .and_then(|org| org.find(kind, name))
            .map(|r| (r.updated_by, r.updated_at))
    }
}

/// Engine-level checks that go beyond document validation.
fn engine_errors(index: usize, object: &Object) -> Option<ValidationErr> {
    if object.kind != Kind::Bucket {
        return None;
    }
    let retention = object.spec.get("retentionSeconds").and_then(Value::as_u64)?;
    (retention != 0 && retention < MIN_RETENTION_SECONDS).then(|| {
        ValidationErr::new(format!(
            "retentionSeconds must be 0 or at least {MIN_RETENTION_SECONDS}, got {retention}"
        ))
        .kind(Kind::Bucket.as_str())
        .field("spec")
        .field("retentionSeconds")
        .index(index)
    })
}

fn secret_ref(object: &Object) -> Option<&str> {
    (object.kind == Kind::Variable && object.spec_str("type") == Some("secret"))
        .then(|| object.spec_str("secretRef"))
        .flatten()
}

fn summary_entry(object: &Object, id: Option<Id>) -> SummaryEntry {
    SummaryEntry {
        kind: object.kind,
        name: object.name().to_string(),
        id,
        spec: object.spec.clone(),
        associations: object.associations(),
    }
}

#[async_trait]
impl PackageService for MemoryPackageService {
    async fn dry_run(
        &self,
        org_id: Id,
        user_id: Id,
        pkg: &Package,
    ) -> (Summary, Diff, Result<(), PkgError>) {
        let orgs = self.orgs.read().await;
        let empty = OrgState::default();
        let org = orgs.get(&org_id).unwrap_or(&empty);

        let mut diff = Diff::default();
        let mut summary = Summary::default();
        let mut missing = BTreeSet::new();
        let mut errs = Vec::new();

        for (index, object) in pkg.objects().iter().enumerate() {
            let existing = org.find(object.kind, object.name());
            let action = match existing {
                None => DiffAction::New,
                Some(stored) if stored.spec == object.spec => DiffAction::Unchanged,
                Some(_) => DiffAction::Update,
            };
            diff.resources.push(DiffEntry {
                kind: object.kind,
                name: object.name().to_string(),
                action,
                id: existing.map(|r| r.id),
                old: existing.map(|r| r.spec.clone()),
                new: object.spec.clone(),
            });
            summary
                .resources
                .push(summary_entry(object, existing.map(|r| r.id)));

            if let Some(key) = secret_ref(object)
                && !org.secrets.contains_key(key)
            {
                missing.insert(key.to_string());
            }
            errs.extend(engine_errors(index, object));
        }
        summary.missing_secrets = missing.into_iter().collect();

        tracing::debug!(
            %org_id,
            %user_id,
            new = diff.count(DiffAction::New),
            update = diff.count(DiffAction::Update),
            unchanged = diff.count(DiffAction::Unchanged),
            "Dry run computed"
        );

        let result = if errs.is_empty() {
            Ok(())
        } else {
            Err(ParseError::new(errs).into())
        };
        (summary, diff, result)
    }

    async fn apply(
        &self,
        org_id: Id,
        user_id: Id,
        pkg: &Package,
        opts: ApplyOptions,
    ) -> (Summary, Result<(), PkgError>) {
        let mut orgs = self.orgs.write().await;
        let org = orgs.entry(org_id).or_default();
        org.secrets.extend(opts.secrets);

        let mut summary = Summary::default();
        let mut errs = Vec::new();
        let now = Utc::now();

        for (index, object) in pkg.objects().iter().enumerate() {
            if let Some(err) = engine_errors(index, object) {
                errs.push(err);
                continue;
            }
            if let Some(key) = secret_ref(object)
                && !org.secrets.contains_key(key)
            {
                errs.push(
                    ValidationErr::new(format!("secret {key:?} was not provided"))
                        .kind(Kind::Variable.as_str())
                        .field("spec")
                        .field("secretRef")
                        .index(index),
                );
                continue;
            }

            let position = org
                .resources
                .iter()
                .position(|r| r.kind == object.kind && r.name == object.name());
            let id = match position {
                Some(pos) => {
                    let stored = &mut org.resources[pos];
                    stored.spec = object.spec.clone();
                    stored.updated_by = user_id;
                    stored.updated_at = now;
                    stored.id
                }
                None => {
                    let id = Id::generate();
                    org.resources.push(StoredResource {
                        id,
                        kind: object.kind,
                        name: object.name().to_string(),
                        spec: object.spec.clone(),
                        updated_by: user_id,
                        updated_at: now,
                    });
                    id
                }
            };
            summary.resources.push(summary_entry(object, Some(id)));
        }

        if errs.is_empty() {
            (summary, Ok(()))
        } else {
            (summary, Err(ParseError::new(errs).into()))
        }
    }

    async fn create_package(&self, opts: CreatePackageOptions) -> Result<Package, PkgError> {
        let orgs = self.orgs.read().await;
        let mut objects: Vec<Object> = Vec::new();
        let mut push = |object: Object| {
            if !objects
                .iter()
                .any(|o| o.kind == object.kind && o.name() == object.name())
            {
                objects.push(object);
            }
        };

        for org_id in &opts.org_ids {
            let Some(org) = orgs.get(org_id) else {
                continue;
            };
            for stored in &org.resources {
                push(Object::new(stored.kind, stored.name.clone(), stored.spec.clone()));
            }
        }

        for clone in &opts.resources {
            let (org, stored) = orgs
                .values()
                .flat_map(|org| org.resources.iter().map(move |r| (org, r)))
                .find(|(_, r)| r.id == clone.id && r.kind == clone.kind)
                .ok_or_else(|| {
                    PkgError::NotFound(format!("{} with id {} does not exist", clone.kind, clone.id))
                })?;
            let name = clone.name.clone().unwrap_or_else(|| stored.name.clone());
            let object = Object::new(stored.kind, name, stored.spec.clone());

            // Associated labels travel with the resource so the export applies on its own.
            for association in object.associations() {
                if let Some(label) = org.find(association.kind, &association.name) {
                    push(Object::new(label.kind, label.name.clone(), label.spec.clone()));
                }
            }
            push(object);
        }

        tracing::debug!(resources = objects.len(), "Exported package");
        Ok(Package::from_trusted(objects))
    }
}
