//! # pkgr-http
//!
//! HTTP surface of the package apply pipeline.
//!
//! - [`create_router`]: `POST /api/v2/packages/apply`, `POST /api/v2/packages`
//!   and `GET /health`
//! - [`response::assemble`]: the outcome-to-status table
//! - [`HttpPackageClient`]: the same endpoints as a [`pkgr_runtime::PackageService`]
//!
//! Authentication is not handled here. Whatever sits in front of the router
//! inserts a [`pkgr_runtime::Authorizer`] into the request extensions.

pub mod client;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod state;

pub use client::HttpPackageClient;
pub use error::{ApiError, status_for};
pub use handlers::request_encoding;
pub use routes::{APPLY_PATH, PACKAGES_PATH, create_router};
pub use state::AppState;
