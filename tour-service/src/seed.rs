//! Development data import
//!
//! A seed directory holds `tours.json`, `users.json` and `reviews.json`, each
//! an array of documents. They are imported in that order so reviews can
//! update the ratings of tours that already exist. Users skip validation but
//! their passwords are still hashed.

use std::path::Path;

use crate::error::{Error, Result};
use crate::repository::{Collection, Resource};
use crate::resources::{Review, Tour, User};
use crate::state::AppState;
use crate::store::Document;

/// Documents imported per collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub tours: usize,
    pub users: usize,
    pub reviews: usize,
}

/// Import every seed file found in `dir`
pub async fn import_dir(state: &AppState, dir: &Path) -> Result<SeedReport> {
    let report = SeedReport {
        tours: import_file(&state.collection::<Tour>(), dir).await?,
        users: import_file(&state.collection::<User>(), dir).await?,
        reviews: import_file(&state.collection::<Review>(), dir).await?,
    };

    tracing::info!(
        dir = %dir.display(),
        tours = report.tours,
        users = report.users,
        reviews = report.reviews,
        "Development data imported"
    );
    Ok(report)
}

/// Drop every seeded collection
pub async fn delete_all(state: &AppState) -> Result<u64> {
    let removed = state.collection::<Tour>().clear().await?
        + state.collection::<User>().clear().await?
        + state.collection::<Review>().clear().await?;
    tracing::info!(removed, "Development data deleted");
    Ok(removed)
}

/// Import `<dir>/<collection>.json`; a missing file imports nothing
async fn import_file<R: Resource>(collection: &Collection<R>, dir: &Path) -> Result<usize> {
    let path = dir.join(format!("{}.json", R::COLLECTION));
    if !tokio::fs::try_exists(&path).await? {
        tracing::warn!(path = %path.display(), "seed file not found, skipping");
        return Ok(0);
    }

    let raw = tokio::fs::read_to_string(&path).await?;
    let docs: Vec<Document> = serde_json::from_str(&raw)
        .map_err(|e| Error::Internal(format!("Invalid seed file {}: {e}", path.display())))?;

    let count = docs.len();
    for doc in docs {
        collection.import(doc).await?;
    }
    tracing::debug!(collection = R::COLLECTION, count, "seed file imported");
    Ok(count)
}
