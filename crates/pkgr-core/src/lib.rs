//! # pkgr-core
//!
//! Shared vocabulary of the package apply pipeline:
//!
//! - [`Encoding`] and [`PackageRemote`]: which grammar governs a payload
//! - [`Package`]: the validated, declarative resource set
//! - [`PackageParser`]: JSON, YAML, Jsonnet and sniffed source decoding
//! - [`Diff`] and [`Summary`]: engine results passed through to callers
//! - [`PkgError`], [`ParseError`], [`ValidationErr`]: the error taxonomy
//! - wire shapes of the HTTP endpoints

pub mod decode;
pub mod diff;
pub mod encoding;
pub mod error;
pub mod id;
pub mod jsonnet;
pub mod package;
pub mod request;

pub use decode::PackageParser;
pub use diff::{Diff, DiffAction, DiffEntry, Summary, SummaryEntry};
pub use encoding::{Encoding, PackageRemote};
pub use error::{ErrorBody, ErrorCode, ParseError, PkgError, ValidationErr};
pub use id::{Id, InvalidId};
pub use jsonnet::{TemplateEvaluator, VmEvaluator};
pub use package::{API_VERSION, Association, Kind, Metadata, Object, Package};
pub use request::{ApplyRequest, ApplyResponse, CreatePackageRequest, ResourceToClone};
