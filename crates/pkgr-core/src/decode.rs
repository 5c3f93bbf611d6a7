//! Decoding of packages and request envelopes.
//!
//! [`PackageParser`] is the single place where bytes meet a grammar. Grammar
//! failures on package content come back as [`ParseError`]; failures on a
//! request envelope come back as [`PkgError::Decode`], since nothing about the
//! package is known yet at that point.

use crate::encoding::Encoding;
use crate::error::{ParseError, PkgError};
use crate::jsonnet::{TemplateEvaluator, VmEvaluator};
use crate::package::Package;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Decodes documents in any supported [`Encoding`].
#[derive(Clone)]
pub struct PackageParser {
    evaluator: Arc<dyn TemplateEvaluator>,
}

impl Default for PackageParser {
    fn default() -> Self {
        Self::new(Arc::new(VmEvaluator))
    }
}

impl std::fmt::Debug for PackageParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageParser").finish_non_exhaustive()
    }
}

impl PackageParser {
    pub fn new(evaluator: Arc<dyn TemplateEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Decode and validate a package.
    pub fn parse(&self, encoding: Encoding, bytes: &[u8]) -> Result<Package, ParseError> {
        let value = self.decode_value(encoding, bytes)?;
        Package::from_value(value)
    }

    /// Validate a package that arrived already structured, e.g. nested in a
    /// YAML request envelope.
    pub fn parse_value(&self, value: Value) -> Result<Package, ParseError> {
        Package::from_value(value)
    }

    /// Decode bytes into a generic document without validating it.
    pub fn decode_value(&self, encoding: Encoding, bytes: &[u8]) -> Result<Value, ParseError> {
        match encoding {
            Encoding::Json => {
                serde_json::from_slice(bytes).map_err(|err| ParseError::syntax(encoding, err))
            }
            Encoding::Yaml => decode_yaml_stream(bytes),
            Encoding::Jsonnet => {
                let source =
                    std::str::from_utf8(bytes).map_err(|err| ParseError::syntax(encoding, err))?;
                self.evaluator
                    .evaluate(source)
                    .map_err(|err| ParseError::syntax(encoding, err))
            }
            Encoding::Source => self.decode_value(sniff(bytes), bytes),
        }
    }

    /// Decode a request envelope.
    pub fn decode_document<T: DeserializeOwned>(
        &self,
        encoding: Encoding,
        bytes: &[u8],
    ) -> Result<T, PkgError> {
        let decode_err = |message: String| PkgError::Decode { encoding, message };
        match encoding {
            Encoding::Json => serde_json::from_slice(bytes).map_err(|err| decode_err(err.to_string())),
            Encoding::Yaml => serde_yaml::from_slice(bytes).map_err(|err| decode_err(err.to_string())),
            Encoding::Jsonnet => {
                let source = std::str::from_utf8(bytes).map_err(|err| decode_err(err.to_string()))?;
                let value = self.evaluator.evaluate(source).map_err(decode_err)?;
                serde_json::from_value(value).map_err(|err| decode_err(err.to_string()))
            }
            Encoding::Source => self.decode_document(sniff(bytes), bytes),
        }
    }
}

/// Source text is JSON when it opens with a brace or bracket, YAML otherwise.
fn sniff(bytes: &[u8]) -> Encoding {
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => Encoding::Json,
        _ => Encoding::Yaml,
    }
}

/// Read every document of a YAML stream. Each document is an object or a
/// list of objects; the result is one flat list.
fn decode_yaml_stream(bytes: &[u8]) -> Result<Value, ParseError> {
    let mut items = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(bytes) {
        let value =
            Value::deserialize(document).map_err(|err| ParseError::syntax(Encoding::Yaml, err))?;
        match value {
            Value::Null => {}
            Value::Array(mut list) => items.append(&mut list),
            other => items.push(other),
        }
    }
    Ok(Value::Array(items))
}
