//! Error taxonomy for the package pipeline.
//!
//! [`PkgError`] is the one error type that crosses crate boundaries. Every
//! variant maps onto an [`ErrorCode`], which is what survives transport: the
//! HTTP layer turns the code into a status and writes an [`ErrorBody`], and the
//! client mirror turns an [`ErrorBody`] back into a [`PkgError`] without losing
//! the validation entries.

use crate::encoding::Encoding;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One structured defect found while parsing or validating a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErr {
    /// Resource kind the defect belongs to; empty when it applies to the document.
    #[serde(default)]
    pub kind: String,

    /// Path to the offending field, outermost first.
    #[serde(default)]
    pub fields: Vec<String>,

    /// Position of the offending resource in the package.
    #[serde(default)]
    pub indexes: Vec<usize>,

    pub reason: String,
}

impl ValidationErr {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            kind: String::new(),
            fields: Vec::new(),
            indexes: Vec::new(),
            reason: reason.into(),
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.indexes.push(index);
        self
    }
}

impl fmt::Display for ValidationErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.kind.is_empty() {
            write!(f, "kind={} ", self.kind)?;
        }
        if let Some(index) = self.indexes.first() {
            write!(f, "resource[{index}] ")?;
        }
        if !self.fields.is_empty() {
            write!(f, "field={} ", self.fields.join("."))?;
        }
        f.write_str(&self.reason)
    }
}

/// A package that does not match its grammar or fails semantic validation.
///
/// Always carries at least one entry, so that every defect in a payload is
/// reported in a single round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    errs: Vec<ValidationErr>,
}

impl ParseError {
    /// Build from collected entries. An empty list gets a generic entry.
    pub fn new(errs: Vec<ValidationErr>) -> Self {
        if errs.is_empty() {
            return Self::single(ValidationErr::new("invalid package"));
        }
        Self { errs }
    }

    pub fn single(err: ValidationErr) -> Self {
        Self { errs: vec![err] }
    }

    /// A grammar failure reported by a decoder.
    pub fn syntax(encoding: Encoding, message: impl fmt::Display) -> Self {
        Self::single(
            ValidationErr::new(format!("unable to parse {encoding}: {message}")).field("root"),
        )
    }

    pub fn validation_errs(&self) -> &[ValidationErr] {
        &self.errs
    }

    pub fn into_validation_errs(self) -> Vec<ValidationErr> {
        self.errs
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "package has {} validation error(s)", self.errs.len())?;
        for err in &self.errs {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Transport-stable classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "unauthorized")]
    Unauthorized,
    #[serde(rename = "not found")]
    NotFound,
    #[serde(rename = "conflict")]
    Conflict,
    #[serde(rename = "unprocessable entity")]
    UnprocessableEntity,
    #[serde(rename = "unsupported media type")]
    UnsupportedMediaType,
    #[serde(rename = "internal error")]
    Internal,
}

/// Errors produced anywhere in the package pipeline.
#[derive(Debug, Error)]
pub enum PkgError {
    /// The organization identifier is not well formed.
    #[error("invalid organization ID provided: {0:?}")]
    InvalidOrg(String),

    /// No acting user could be established for the request.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Grammar or semantic failures in a package.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The request envelope could not be decoded.
    #[error("unable to unmarshal {encoding}; Err: {message}")]
    Decode { encoding: Encoding, message: String },

    /// A remote package could not be retrieved.
    #[error("failed to fetch package from {url}: {message}")]
    Fetch { url: String, message: String },

    /// The request is well formed but cannot be acted upon.
    #[error("{0}")]
    Unprocessable(String),

    /// The request body uses a media type the endpoint does not accept.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// A referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An error reported by a remote pkgr server, as decoded by a client.
    #[error("{message}")]
    Api { code: ErrorCode, message: String },

    /// Engine or infrastructure fault.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PkgError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PkgError::InvalidOrg(_) => ErrorCode::Conflict,
            PkgError::Unauthorized(_) => ErrorCode::Unauthorized,
            PkgError::Parse(_) | PkgError::Decode { .. } | PkgError::Fetch { .. } => {
                ErrorCode::Invalid
            }
            PkgError::Unprocessable(_) => ErrorCode::UnprocessableEntity,
            PkgError::UnsupportedMediaType(_) => ErrorCode::UnsupportedMediaType,
            PkgError::NotFound(_) => ErrorCode::NotFound,
            PkgError::Api { code, .. } => *code,
            PkgError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, PkgError::Parse(_))
    }

    /// Validation entries of a parse error; empty for every other kind.
    pub fn validation_errors(&self) -> Vec<ValidationErr> {
        match self {
            PkgError::Parse(err) => err.validation_errs().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Rebuild an error from a response body written by a pkgr server.
    pub fn from_body(body: ErrorBody) -> Self {
        match body.errors {
            Some(errs) if !errs.is_empty() => PkgError::Parse(ParseError::new(errs)),
            _ => PkgError::Api {
                code: body.code,
                message: body.message,
            },
        }
    }
}

/// Wire form of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationErr>>,
}

impl From<&PkgError> for ErrorBody {
    fn from(err: &PkgError) -> Self {
        let errors = err.is_parse_error().then(|| err.validation_errors());
        let message = match err {
            PkgError::Parse(_) => "failed to parse package".to_string(),
            other => other.to_string(),
        };
        Self {
            code: err.code(),
            message,
            errors,
        }
    }
}
