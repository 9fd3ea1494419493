//! JSON files for market lists, equivalence classes and opportunities.
//!
//! Layout under the data directory:
//! - `markets/<venue>.json`
//! - `question_map/active.json`
//! - `opportunities/active.json`
//!
//! Writes go to a sibling temporary file which is then renamed over the
//! target, so readers never see a partial file.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::arbitrage::Opportunity;
use crate::equivalence::EquivalenceClasses;
use crate::error::StoreError;
use crate::market::{MarketRef, Venue};

/// File-backed repository rooted at a data directory.
#[derive(Debug, Clone)]
pub struct JsonRepository {
    root: PathBuf,
}

impl JsonRepository {
    /// Create a repository rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn markets_path(&self, venue: Venue) -> PathBuf {
        self.root.join("markets").join(format!("{}.json", venue))
    }

    fn classes_path(&self) -> PathBuf {
        self.root.join("question_map").join("active.json")
    }

    fn opportunities_path(&self) -> PathBuf {
        self.root.join("opportunities").join("active.json")
    }

    /// Save the active market list of a venue.
    pub async fn save_markets(&self, venue: Venue, markets: &[MarketRef]) -> Result<(), StoreError> {
        write_json(&self.markets_path(venue), &markets).await
    }

    /// Load the saved market list of a venue; empty when never saved.
    pub async fn load_markets(&self, venue: Venue) -> Result<Vec<MarketRef>, StoreError> {
        Ok(read_json(&self.markets_path(venue)).await?.unwrap_or_default())
    }

    /// Save equivalence classes.
    pub async fn save_classes(&self, classes: &EquivalenceClasses) -> Result<(), StoreError> {
        write_json(&self.classes_path(), classes).await
    }

    /// Load equivalence classes; empty when never saved.
    pub async fn load_classes(&self) -> Result<EquivalenceClasses, StoreError> {
        Ok(read_json(&self.classes_path()).await?.unwrap_or_default())
    }

    /// Save opportunities.
    pub async fn save_opportunities(&self, opportunities: &[Opportunity]) -> Result<(), StoreError> {
        write_json(&self.opportunities_path(), &opportunities).await
    }

    /// Load opportunities; empty when never saved.
    pub async fn load_opportunities(&self) -> Result<Vec<Opportunity>, StoreError> {
        Ok(read_json(&self.opportunities_path()).await?.unwrap_or_default())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.display().to_string(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await.map_err(|e| io_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| io_error(path, e))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote JSON file");
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path, e)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })
}
