//! Shared state of the package routes.

use pkgr_core::PackageParser;
use pkgr_runtime::{Orchestrator, PackageService};
use std::sync::Arc;

/// Shared application state for the package routes.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            inner: Arc::new(orchestrator),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner
    }

    pub fn parser(&self) -> &PackageParser {
        self.inner.parser()
    }

    pub fn service(&self) -> &Arc<dyn PackageService> {
        self.inner.service()
    }
}
