//! CLI subcommands.

pub mod experiment;
pub mod goal;
pub mod report;
pub mod serve;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use cohort_core::TursoStore;

/// Default embedded database path, matching the server default.
pub const DEFAULT_DATABASE: &str = "cohort.db";

/// Open the embedded database the commands operate on.
pub async fn open_store(path: &Path) -> Result<Arc<TursoStore>> {
    Ok(Arc::new(TursoStore::new_local(path).await?))
}
