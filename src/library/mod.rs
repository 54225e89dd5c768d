//! Catalog - canonical asset storage and its relationship/audit stores
//!
//! One `Catalog` owns one SQLite database. All mutations of the canonical
//! asset table and its full-text shadow go through `AssetStore`, which keeps
//! the pair transactionally consistent.

pub mod assets;
pub mod error;
pub mod history;
pub mod lineage;
pub mod tags;

pub use assets::{AssetStore, IndexParity};
pub use error::{CatalogError, Result};
pub use history::HistoryLog;
pub use tags::TagStore;

use crate::infrastructure::database::Database;
use std::sync::Arc;

/// A catalog: asset store, tag store, and audit log over one database
pub struct Catalog {
    db: Arc<Database>,
    pub assets: AssetStore,
    pub tags: TagStore,
    pub history: HistoryLog,
}

impl Catalog {
    pub fn new(db: Arc<Database>) -> Self {
        let pool = db.pool().clone();
        Self {
            assets: AssetStore::new(pool.clone()),
            tags: TagStore::new(pool.clone()),
            history: HistoryLog::new(pool),
            db,
        }
    }

    /// Resolve the full bidirectional lineage closure for an asset.
    pub async fn lineage(&self, asset_id: &str) -> Result<Vec<crate::domain::Asset>> {
        lineage::get_lineage(&self.assets, asset_id).await
    }

    /// Close the underlying database
    pub async fn close(&self) {
        self.db.close().await;
    }
}
