//! The declarative package model and its semantic validation.
//!
//! A package is an ordered list of resource objects:
//!
//! ```yaml
//! - apiVersion: pkgr.dev/v1alpha1
//!   kind: Bucket
//!   metadata:
//!     name: telemetry
//!   spec:
//!     retentionSeconds: 86400
//!     associations:
//!       - kind: Label
//!         name: team-a
//! ```
//!
//! Validation walks the whole document and reports every defect it finds.

use crate::error::{ParseError, ValidationErr};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// The only supported document version.
pub const API_VERSION: &str = "pkgr.dev/v1alpha1";

const MAX_NAME_LENGTH: usize = 63;

/// Resource kinds a package may declare. Deserialization is
/// case-insensitive, like [`Kind::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Kind {
    Bucket,
    Dashboard,
    Label,
    Variable,
}

const KINDS: &[(&str, Kind)] = &[
    ("bucket", Kind::Bucket),
    ("dashboard", Kind::Dashboard),
    ("label", Kind::Label),
    ("variable", Kind::Variable),
];

const VARIABLE_TYPES: &[&str] = &["constant", "map", "query", "secret"];

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Kind::parse(&raw).ok_or_else(|| {
            de::Error::unknown_variant(&raw, &["Bucket", "Dashboard", "Label", "Variable"])
        })
    }
}

impl Kind {
    /// Case-insensitive lookup of a kind name.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.to_ascii_lowercase();
        KINDS
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Bucket => "Bucket",
            Kind::Dashboard => "Dashboard",
            Kind::Label => "Label",
            Kind::Variable => "Variable",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
}

/// A single resource declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: Kind,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub spec: Map<String, Value>,
}

/// A label attached to a resource through `spec.associations`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Association {
    pub kind: Kind,
    pub name: String,
}

impl Object {
    pub fn new(kind: Kind, name: impl Into<String>, spec: Map<String, Value>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind,
            metadata: Metadata { name: name.into() },
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn spec_str(&self, key: &str) -> Option<&str> {
        self.spec.get(key).and_then(Value::as_str)
    }

    /// Associations declared in the spec. Malformed entries are skipped; a
    /// validated package never has any.
    pub fn associations(&self) -> Vec<Association> {
        self.spec
            .get("associations")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A parsed and validated package.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Package {
    objects: Vec<Object>,
}

impl Package {
    /// Validate a decoded document.
    ///
    /// The document is either a single object or a list of objects.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(_) => vec![value],
            Value::Null => Vec::new(),
            other => {
                return Err(ParseError::single(
                    ValidationErr::new(format!(
                        "package must be an object or a list of objects, got {}",
                        type_name(&other)
                    ))
                    .field("root"),
                ));
            }
        };

        if items.is_empty() {
            return Err(ParseError::single(
                ValidationErr::new("package has no resources").field("root"),
            ));
        }

        let mut errs = Vec::new();
        let mut objects = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match read_object(index, item) {
                Ok(object) => objects.push((index, object)),
                Err(mut object_errs) => errs.append(&mut object_errs),
            }
        }

        check_unique_names(&objects, &mut errs);
        check_associations(&objects, &mut errs);

        if !errs.is_empty() {
            return Err(ParseError::new(errs));
        }

        Ok(Self {
            objects: objects.into_iter().map(|(_, object)| object).collect(),
        })
    }

    /// Wrap objects produced by a trusted source (an engine export) without
    /// re-validating them.
    pub fn from_trusted(objects: Vec<Object>) -> Self {
        Self { objects }
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn into_objects(self) -> Vec<Object> {
        self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn find(&self, kind: Kind, name: &str) -> Option<&Object> {
        self.objects
            .iter()
            .find(|object| object.kind == kind && object.name() == name)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.objects).unwrap_or(Value::Array(Vec::new()))
    }
}

fn read_object(index: usize, item: Value) -> Result<Object, Vec<ValidationErr>> {
    let mut errs = Vec::new();

    let mut fields = match item {
        Value::Object(fields) => fields,
        other => {
            return Err(vec![
                ValidationErr::new(format!(
                    "resource must be an object, got {}",
                    type_name(&other)
                ))
                .field("root")
                .index(index),
            ]);
        }
    };

    let kind = match fields.get("kind") {
        Some(Value::String(raw)) => match Kind::parse(raw) {
            Some(kind) => Some(kind),
            None => {
                errs.push(
                    ValidationErr::new(format!("unsupported kind {raw:?}"))
                        .field("kind")
                        .index(index),
                );
                None
            }
        },
        _ => {
            errs.push(ValidationErr::new("kind is required").field("kind").index(index));
            None
        }
    };
    let kind_name = kind.map(Kind::as_str).unwrap_or_default();

    match fields.get("apiVersion") {
        Some(Value::String(version)) if version == API_VERSION => {}
        Some(Value::String(version)) => errs.push(
            ValidationErr::new(format!(
                "unsupported apiVersion {version:?}, expected {API_VERSION:?}"
            ))
            .kind(kind_name)
            .field("apiVersion")
            .index(index),
        ),
        _ => errs.push(
            ValidationErr::new("apiVersion is required")
                .kind(kind_name)
                .field("apiVersion")
                .index(index),
        ),
    }

    let name = fields
        .get("metadata")
        .and_then(|metadata| metadata.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    match &name {
        Some(name) => {
            if let Some(reason) = invalid_name(name) {
                errs.push(
                    ValidationErr::new(reason)
                        .kind(kind_name)
                        .field("metadata")
                        .field("name")
                        .index(index),
                );
            }
        }
        None => errs.push(
            ValidationErr::new("metadata.name is required")
                .kind(kind_name)
                .field("metadata")
                .field("name")
                .index(index),
        ),
    }

    let spec = match fields.remove("spec") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(spec)) => spec,
        Some(other) => {
            errs.push(
                ValidationErr::new(format!("spec must be an object, got {}", type_name(&other)))
                    .kind(kind_name)
                    .field("spec")
                    .index(index),
            );
            Map::new()
        }
    };

    if let Some(kind) = kind {
        check_spec(kind, index, &spec, &mut errs);
    }

    match (kind, name) {
        (Some(kind), Some(name)) if errs.is_empty() => Ok(Object {
            api_version: API_VERSION.to_string(),
            kind,
            metadata: Metadata { name },
            spec,
        }),
        _ => Err(errs),
    }
}

fn check_spec(kind: Kind, index: usize, spec: &Map<String, Value>, errs: &mut Vec<ValidationErr>) {
    let spec_err = |field: &str, reason: String| {
        ValidationErr::new(reason)
            .kind(kind.as_str())
            .field("spec")
            .field(field)
            .index(index)
    };

    if let Some(description) = spec.get("description")
        && !description.is_string()
    {
        errs.push(spec_err("description", "description must be a string".to_string()));
    }

    match kind {
        Kind::Label => {
            if let Some(color) = spec.get("color")
                && !color.as_str().is_some_and(is_hex_color)
            {
                errs.push(spec_err("color", "color must be of the form #rrggbb".to_string()));
            }
        }
        Kind::Bucket => {
            if let Some(retention) = spec.get("retentionSeconds")
                && retention.as_u64().is_none()
            {
                errs.push(spec_err(
                    "retentionSeconds",
                    "retentionSeconds must be a non-negative integer".to_string(),
                ));
            }
        }
        Kind::Variable => check_variable(spec, &spec_err, errs),
        Kind::Dashboard => {}
    }

    if let Some(associations) = spec.get("associations") {
        if kind == Kind::Label {
            errs.push(spec_err(
                "associations",
                "labels cannot have associations".to_string(),
            ));
            return;
        }
        let Some(entries) = associations.as_array() else {
            errs.push(spec_err(
                "associations",
                "associations must be a list".to_string(),
            ));
            return;
        };
        for entry in entries {
            match serde_json::from_value::<Association>(entry.clone()) {
                Ok(association) if association.kind != Kind::Label => errs.push(spec_err(
                    "associations",
                    format!("cannot associate with kind {}", association.kind),
                )),
                Ok(association) if association.name.is_empty() => errs.push(spec_err(
                    "associations",
                    "association name is required".to_string(),
                )),
                Ok(_) => {}
                Err(err) => errs.push(spec_err(
                    "associations",
                    format!("malformed association: {err}"),
                )),
            }
        }
    }
}

fn check_variable(
    spec: &Map<String, Value>,
    spec_err: &dyn Fn(&str, String) -> ValidationErr,
    errs: &mut Vec<ValidationErr>,
) {
    let Some(var_type) = spec.get("type").and_then(Value::as_str) else {
        errs.push(spec_err("type", "type is required".to_string()));
        return;
    };
    if !VARIABLE_TYPES.contains(&var_type) {
        errs.push(spec_err(
            "type",
            format!(
                "unsupported variable type {var_type:?}, expected one of {}",
                VARIABLE_TYPES.join(", ")
            ),
        ));
        return;
    }

    let values = spec.get("values");
    let valid = match var_type {
        "constant" => values
            .and_then(Value::as_array)
            .is_some_and(|list| !list.is_empty() && list.iter().all(Value::is_string)),
        "map" => values
            .and_then(Value::as_object)
            .is_some_and(|map| !map.is_empty() && map.values().all(Value::is_string)),
        "query" => values
            .and_then(|values| values.get("query"))
            .and_then(Value::as_str)
            .is_some_and(|query| !query.trim().is_empty()),
        _ => true,
    };
    if !valid {
        errs.push(spec_err(
            "values",
            format!("values are missing or malformed for a {var_type} variable"),
        ));
    }

    if var_type == "secret"
        && !spec
            .get("secretRef")
            .and_then(Value::as_str)
            .is_some_and(|key| !key.is_empty())
    {
        errs.push(spec_err(
            "secretRef",
            "secretRef is required for a secret variable".to_string(),
        ));
    }
}

fn check_unique_names(objects: &[(usize, Object)], errs: &mut Vec<ValidationErr>) {
    let mut seen: HashSet<(Kind, &str)> = HashSet::new();
    for (index, object) in objects {
        if !seen.insert((object.kind, object.name())) {
            errs.push(
                ValidationErr::new(format!("duplicate name {:?}", object.name()))
                    .kind(object.kind.as_str())
                    .field("metadata")
                    .field("name")
                    .index(*index),
            );
        }
    }
}

fn check_associations(objects: &[(usize, Object)], errs: &mut Vec<ValidationErr>) {
    let labels: HashSet<&str> = objects
        .iter()
        .filter(|(_, object)| object.kind == Kind::Label)
        .map(|(_, object)| object.name())
        .collect();

    for (index, object) in objects {
        for association in object.associations() {
            if !labels.contains(association.name.as_str()) {
                errs.push(
                    ValidationErr::new(format!(
                        "label {:?} is not defined in the package",
                        association.name
                    ))
                    .kind(object.kind.as_str())
                    .field("spec")
                    .field("associations")
                    .index(*index),
                );
            }
        }
    }
}

fn invalid_name(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("metadata.name must not be empty".to_string());
    }
    if name.len() > MAX_NAME_LENGTH {
        return Some(format!(
            "metadata.name must be at most {MAX_NAME_LENGTH} characters"
        ));
    }
    let starts_alnum = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let charset_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !starts_alnum || !charset_ok {
        return Some(format!(
            "metadata.name {name:?} must be lowercase alphanumerics, '-' or '_', starting with an alphanumeric"
        ));
    }
    None
}

fn is_hex_color(raw: &str) -> bool {
    raw.len() == 7
        && raw.starts_with('#')
        && raw[1..].bytes().all(|b| b.is_ascii_hexdigit())
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
