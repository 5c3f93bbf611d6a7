//! # pkgr-runtime
//!
//! The package apply pipeline.
//!
//! [`Orchestrator`] takes a decoded [`pkgr_core::ApplyRequest`] through
//! identity resolution, package resolution ([`resolve_package`]), a dry run
//! and, unless the caller only asked for a preview, an apply. The state
//! changes themselves are delegated to a [`PackageService`]; remote packages
//! are downloaded through a [`RemoteFetcher`].
//!
//! [`MemoryPackageService`] is a self-contained engine used by the server
//! binary and by tests.

pub mod fetch;
pub mod memory;
pub mod orchestrator;
pub mod service;
pub mod source;

pub use fetch::{DEFAULT_FETCH_TIMEOUT, HttpFetcher, MAX_PACKAGE_BYTES, RemoteFetcher};
pub use memory::MemoryPackageService;
pub use orchestrator::{ApplyOutcome, Authorizer, Orchestrator};
pub use service::{ApplyOptions, CreatePackageOptions, PackageService};
pub use source::resolve_package;
