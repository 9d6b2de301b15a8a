// Built-in manifest for the plancake deployment

use super::{Manifest, ProcessSpec};
use crate::error::{PmError, Result};
use serde::Deserialize;
use std::path::Path;

/// Manifest source shipped with the binary
pub const PLANCAKE_MANIFEST: &str = include_str!("../../manifests/plancake.toml");

/// Web frontend
pub const SITE: &str = "plancake-site";
/// API server
pub const API: &str = "plancake-api";
/// Task-queue worker
pub const CELERY_WORKER: &str = "celery-worker";
/// Task-queue scheduler
pub const CELERY_BEAT: &str = "celery-beat";

/// The plancake manifest resolved against `root` and validated.
///
/// Fails when `root` does not contain the `frontend` and `backend`
/// directories the records run from.
pub fn manifest(root: &Path) -> Result<Manifest> {
    Manifest::from_toml_str(PLANCAKE_MANIFEST, root)
}

/// The raw records as written, without path resolution or validation
pub fn records() -> Result<Vec<ProcessSpec>> {
    #[derive(Deserialize)]
    struct Embedded {
        processes: Vec<ProcessSpec>,
    }

    let embedded: Embedded = toml::from_str(PLANCAKE_MANIFEST).map_err(|e| {
        PmError::InvalidConfig(format!("Built-in manifest does not parse: {}", e))
    })?;

    Ok(embedded.processes)
}
