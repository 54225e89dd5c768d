//! Asset store - canonical asset table plus its full-text shadow
//!
//! The FTS5 shadow is maintained manually: every mutation performs matching
//! delete+insert index operations inside the same transaction as the
//! canonical write, so no reader ever observes the pair out of step.

use crate::domain::{Asset, AssetKind, AssetMetadata, Tag};
use crate::library::error::{CatalogError, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Canonical asset storage for a catalog
pub struct AssetStore {
    pool: SqlitePool,
}

/// Parity report between the asset table and the full-text index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexParity {
    /// Canonical rows under the root
    pub asset_rows: i64,
    /// Index rows whose asset exists under the root
    pub index_rows: i64,
    /// Index rows pointing at no canonical row at all
    pub orphan_rows: i64,
    /// Index rows whose indexed content disagrees with the canonical row
    pub stale_rows: i64,
}

impl IndexParity {
    pub fn is_consistent(&self) -> bool {
        self.asset_rows == self.index_rows && self.orphan_rows == 0 && self.stale_rows == 0
    }
}

impl AssetStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All assets under a root, newest-first, joined with their tags.
    pub async fn get_assets(&self, root_path: &str) -> Result<Vec<Asset>> {
        let rows = sqlx::query(
            "SELECT * FROM assets WHERE root_path = ? ORDER BY created_at DESC, id",
        )
        .bind(root_path)
        .fetch_all(&self.pool)
        .await?;

        let mut assets = Vec::with_capacity(rows.len());
        for row in &rows {
            assets.push(asset_from_row(row)?);
        }

        let mut tags_by_asset = self.tags_for_root(root_path).await?;
        for asset in &mut assets {
            if let Some(tags) = tags_by_asset.remove(&asset.id) {
                asset.tags = tags;
            }
        }

        Ok(assets)
    }

    /// A single asset with its tags, or `None`.
    pub async fn get_asset(&self, id: &str) -> Result<Option<Asset>> {
        let row = sqlx::query("SELECT * FROM assets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };

        let mut asset = asset_from_row(&row)?;
        asset.tags = self.tags_for_asset(id).await?;
        Ok(Some(asset))
    }

    /// Look up an asset by its `(root_path, path)` address.
    pub async fn get_asset_by_path(&self, root_path: &str, path: &str) -> Result<Option<Asset>> {
        let row = sqlx::query("SELECT * FROM assets WHERE root_path = ? AND path = ?")
            .bind(root_path)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(asset_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Insert or update an asset, keeping the full-text shadow in step.
    ///
    /// Existing id: full-column update. New id colliding on
    /// `(root_path, path)`: the path already belongs to a different id, so
    /// the update is absorbed under the existing id (conflict policy, not an
    /// error). Both branches commit the canonical row and its index row in
    /// one transaction.
    pub async fn upsert_asset(&self, asset: &Asset) -> Result<()> {
        let metadata_json = serde_json::to_string(&asset.metadata)?;
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM assets WHERE id = ?")
            .bind(&asset.id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();

        let indexed_id = if exists {
            update_all_columns(&mut tx, &asset.id, asset, &metadata_json).await?;
            asset.id.clone()
        } else {
            match insert_asset(&mut tx, asset, &metadata_json).await {
                Ok(()) => asset.id.clone(),
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    debug!(
                        "Path collision on ({}, {}), absorbing update",
                        asset.root_path, asset.path
                    );
                    let row = sqlx::query("SELECT id FROM assets WHERE root_path = ? AND path = ?")
                        .bind(&asset.root_path)
                        .bind(&asset.path)
                        .fetch_one(&mut *tx)
                        .await?;
                    let existing_id: String = row.get("id");
                    update_all_columns(&mut tx, &existing_id, asset, &metadata_json).await?;
                    existing_id
                }
                Err(e) => return Err(e.into()),
            }
        };

        reindex(&mut tx, &indexed_id, asset).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Update only the thumbnail path. The thumbnail is not indexed, so the
    /// full-text shadow is untouched.
    pub async fn update_thumbnail(&self, id: &str, thumbnail_path: &str) -> Result<()> {
        let result = sqlx::query("UPDATE assets SET thumbnail_path = ?, updated_at = ? WHERE id = ?")
            .bind(thumbnail_path)
            .bind(crate::domain::now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("asset '{id}'")));
        }
        Ok(())
    }

    /// Remap assets after the catalog root was repointed to `new_root`.
    ///
    /// Every asset whose absolute path (old root + relative path) falls
    /// under the new root is moved to `(new_root, recomputed path)`. When
    /// the target address is already taken by a different id, the shadowed
    /// asset is deleted first (tags cascade, its index row is removed here;
    /// history is retained). The whole remap is one transaction.
    pub async fn rehome_assets(&self, new_root: &Path) -> Result<usize> {
        let new_root_str = new_root.to_string_lossy().to_string();

        let rows = sqlx::query("SELECT * FROM assets WHERE root_path != ?")
            .bind(&new_root_str)
            .fetch_all(&self.pool)
            .await?;

        let mut movers = Vec::new();
        for row in &rows {
            let asset = asset_from_row(row)?;
            let absolute = asset.absolute_path();
            if let Ok(stripped) = absolute.strip_prefix(new_root) {
                let new_path = stripped.to_string_lossy().replace('\\', "/");
                movers.push((asset, new_path));
            }
        }

        if movers.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for (asset, new_path) in &movers {
            let shadowed = sqlx::query("SELECT id FROM assets WHERE root_path = ? AND path = ?")
                .bind(&new_root_str)
                .bind(new_path)
                .fetch_optional(&mut *tx)
                .await?;

            if let Some(row) = shadowed {
                let shadowed_id: String = row.get("id");
                if shadowed_id != asset.id {
                    warn!(
                        "Rehome collision at ({}, {}): deleting shadowed asset {}",
                        new_root_str, new_path, shadowed_id
                    );
                    sqlx::query("DELETE FROM assets WHERE id = ?")
                        .bind(&shadowed_id)
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query("DELETE FROM assets_fts WHERE asset_id = ?")
                        .bind(&shadowed_id)
                        .execute(&mut *tx)
                        .await?;
                }
            }

            sqlx::query("UPDATE assets SET root_path = ?, path = ?, updated_at = ? WHERE id = ?")
                .bind(&new_root_str)
                .bind(new_path)
                .bind(crate::domain::now_millis())
                .bind(&asset.id)
                .execute(&mut *tx)
                .await?;

            let mut moved = asset.clone();
            moved.root_path = new_root_str.clone();
            moved.path = new_path.clone();
            reindex(&mut tx, &asset.id, &moved).await?;
        }

        tx.commit().await?;
        Ok(movers.len())
    }

    /// Full-text search over `(path, metadata)` for a root.
    pub async fn search_assets(&self, root_path: &str, query: &str) -> Result<Vec<Asset>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT a.*
            FROM assets_fts
            JOIN assets a ON a.id = assets_fts.asset_id
            WHERE assets_fts MATCH ? AND a.root_path = ?
            ORDER BY bm25(assets_fts), a.created_at DESC
            "#,
        )
        .bind(query)
        .bind(root_path)
        .fetch_all(&self.pool)
        .await?;

        let mut assets = Vec::with_capacity(rows.len());
        for row in &rows {
            assets.push(asset_from_row(row)?);
        }
        Ok(assets)
    }

    /// Compare the asset table and the full-text index for a root.
    pub async fn index_parity(&self, root_path: &str) -> Result<IndexParity> {
        let asset_rows: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM assets WHERE root_path = ?")
                .bind(root_path)
                .fetch_one(&self.pool)
                .await?;

        let index_rows: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM assets_fts f JOIN assets a ON a.id = f.asset_id WHERE a.root_path = ?",
        )
        .bind(root_path)
        .fetch_one(&self.pool)
        .await?;

        let orphan_rows: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM assets_fts f LEFT JOIN assets a ON a.id = f.asset_id WHERE a.id IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        // Stale detection needs the canonical metadata re-derived into its
        // searchable form, which SQL cannot do, so those rows are compared
        // here instead of in the query.
        let pairs = sqlx::query(
            "SELECT a.path AS asset_path, a.metadata AS asset_metadata, \
                    f.path AS index_path, f.metadata AS index_metadata \
             FROM assets_fts f JOIN assets a ON a.id = f.asset_id \
             WHERE a.root_path = ?",
        )
        .bind(root_path)
        .fetch_all(&self.pool)
        .await?;

        let mut stale_rows = 0i64;
        for row in &pairs {
            let metadata: AssetMetadata = row
                .get::<Option<String>, _>("asset_metadata")
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default();
            let path_matches =
                row.get::<String, _>("index_path") == row.get::<String, _>("asset_path");
            let metadata_matches =
                row.get::<String, _>("index_metadata") == metadata.searchable_text();
            if !path_matches || !metadata_matches {
                stale_rows += 1;
            }
        }

        Ok(IndexParity {
            asset_rows: asset_rows.0,
            index_rows: index_rows.0,
            orphan_rows: orphan_rows.0,
            stale_rows,
        })
    }

    async fn tags_for_asset(&self, asset_id: &str) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT t.id, t.name, t.color FROM asset_tags at \
             JOIN tags t ON t.id = at.tag_id WHERE at.asset_id = ? ORDER BY t.name",
        )
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(tag_from_row).collect())
    }

    async fn tags_for_root(&self, root_path: &str) -> Result<HashMap<String, Vec<Tag>>> {
        let rows = sqlx::query(
            "SELECT at.asset_id, t.id, t.name, t.color FROM asset_tags at \
             JOIN tags t ON t.id = at.tag_id \
             JOIN assets a ON a.id = at.asset_id \
             WHERE a.root_path = ? ORDER BY t.name",
        )
        .bind(root_path)
        .fetch_all(&self.pool)
        .await?;

        let mut map: HashMap<String, Vec<Tag>> = HashMap::new();
        for row in &rows {
            let asset_id: String = row.get("asset_id");
            map.entry(asset_id).or_default().push(tag_from_row(row));
        }
        Ok(map)
    }
}

async fn insert_asset(
    tx: &mut Transaction<'_, Sqlite>,
    asset: &Asset,
    metadata_json: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO assets (id, root_path, path, kind, status, created_at, updated_at, metadata, thumbnail_path)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&asset.id)
    .bind(&asset.root_path)
    .bind(&asset.path)
    .bind(asset.kind.to_string())
    .bind(&asset.status)
    .bind(asset.created_at)
    .bind(asset.updated_at)
    .bind(metadata_json)
    .bind(&asset.thumbnail_path)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_all_columns(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    asset: &Asset,
    metadata_json: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE assets SET
            root_path = ?, path = ?, kind = ?, status = ?,
            created_at = ?, updated_at = ?, metadata = ?, thumbnail_path = ?
        WHERE id = ?
        "#,
    )
    .bind(&asset.root_path)
    .bind(&asset.path)
    .bind(asset.kind.to_string())
    .bind(&asset.status)
    .bind(asset.created_at)
    .bind(asset.updated_at)
    .bind(metadata_json)
    .bind(&asset.thumbnail_path)
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Delete+insert the index row for an asset. FTS5 has no reliable partial
/// update, so content parity is guaranteed by full replacement.
async fn reindex(tx: &mut Transaction<'_, Sqlite>, id: &str, asset: &Asset) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM assets_fts WHERE asset_id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await?;

    sqlx::query("INSERT INTO assets_fts (asset_id, path, metadata) VALUES (?, ?, ?)")
        .bind(id)
        .bind(&asset.path)
        .bind(asset.metadata.searchable_text())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn asset_from_row(row: &SqliteRow) -> Result<Asset> {
    let metadata: AssetMetadata = row
        .get::<Option<String>, _>("metadata")
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(Asset {
        id: row.get("id"),
        root_path: row.get("root_path"),
        path: row.get("path"),
        kind: AssetKind::from_str(row.get::<&str, _>("kind")).unwrap_or_default(),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        metadata,
        thumbnail_path: row.get("thumbnail_path"),
        tags: Vec::new(),
    })
}

fn tag_from_row(row: &SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        color: row.get("color"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::Database;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> AssetStore {
        let db = Database::open(&dir.path().join("catalog.db")).await.unwrap();
        AssetStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_upsert_insert_then_update_keeps_parity() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut asset = Asset::new("/root", "img/a.png", AssetKind::Image);
        store.upsert_asset(&asset).await.unwrap();

        asset.status = "approved".to_string();
        asset.metadata.description = Some("golden hour".to_string());
        store.upsert_asset(&asset).await.unwrap();

        let loaded = store.get_asset(&asset.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, "approved");

        let parity = store.index_parity("/root").await.unwrap();
        assert!(parity.is_consistent(), "parity: {parity:?}");
        assert_eq!(parity.asset_rows, 1);

        let hits = store.search_assets("/root", "golden").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, asset.id);
    }

    #[tokio::test]
    async fn test_parity_flags_index_row_with_drifted_metadata() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut asset = Asset::new("/root", "img/a.png", AssetKind::Image);
        asset.metadata.description = Some("golden hour".to_string());
        store.upsert_asset(&asset).await.unwrap();
        assert!(store.index_parity("/root").await.unwrap().is_consistent());

        // Corrupt the index row's content without touching its path. Count
        // parity still holds; only content comparison can catch this.
        sqlx::query("UPDATE assets_fts SET metadata = 'drifted' WHERE asset_id = ?")
            .bind(&asset.id)
            .execute(&store.pool)
            .await
            .unwrap();

        let parity = store.index_parity("/root").await.unwrap();
        assert!(!parity.is_consistent(), "parity: {parity:?}");
        assert_eq!(parity.stale_rows, 1);
        assert_eq!(parity.asset_rows, parity.index_rows);
    }

    #[tokio::test]
    async fn test_upsert_path_collision_absorbs_under_existing_id() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let original = Asset::new("/root", "img/a.png", AssetKind::Image);
        store.upsert_asset(&original).await.unwrap();

        // Same address, different id: the collision is absorbed.
        let mut intruder = Asset::new("/root", "img/a.png", AssetKind::Image);
        intruder.status = "approved".to_string();
        store.upsert_asset(&intruder).await.unwrap();

        assert!(store.get_asset(&intruder.id).await.unwrap().is_none());
        let kept = store.get_asset(&original.id).await.unwrap().unwrap();
        assert_eq!(kept.status, "approved");

        let parity = store.index_parity("/root").await.unwrap();
        assert!(parity.is_consistent(), "parity: {parity:?}");
        assert_eq!(parity.asset_rows, 1);
    }

    #[tokio::test]
    async fn test_rehome_collision_deletes_shadowed_asset_but_not_its_history() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("catalog.db")).await.unwrap();
        let store = AssetStore::new(db.pool().clone());
        let history = crate::library::HistoryLog::new(db.pool().clone());

        // The mover lives under the old root; the shadowed asset already
        // occupies the mover's target address under the new root.
        let mover = Asset::new("/data/old", "a.png", AssetKind::Image);
        let shadowed = Asset::new("/data", "old/a.png", AssetKind::Image);
        store.upsert_asset(&mover).await.unwrap();
        store.upsert_asset(&shadowed).await.unwrap();

        let row = crate::domain::HistoryEvent::new(
            &shadowed.id,
            crate::domain::HistoryAction::Created,
        );
        history.record(&row).await.unwrap();

        let moved = store.rehome_assets(Path::new("/data")).await.unwrap();
        assert_eq!(moved, 1);

        // Mover wins the address; the shadowed asset is gone.
        assert!(store.get_asset(&shadowed.id).await.unwrap().is_none());
        let kept = store.get_asset(&mover.id).await.unwrap().unwrap();
        assert_eq!(kept.root_path, "/data");
        assert_eq!(kept.path, "old/a.png");

        let parity = store.index_parity("/data").await.unwrap();
        assert!(parity.is_consistent(), "parity: {parity:?}");
        assert_eq!(parity.asset_rows, 1);

        // The shadowed asset's audit trail survives the hard delete.
        let rows = history.for_asset(&shadowed.id, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_thumbnail_update_skips_index() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let asset = Asset::new("/root", "img/a.png", AssetKind::Image);
        store.upsert_asset(&asset).await.unwrap();
        store.update_thumbnail(&asset.id, "thumbs/a.webp").await.unwrap();

        let loaded = store.get_asset(&asset.id).await.unwrap().unwrap();
        assert_eq!(loaded.thumbnail_path.as_deref(), Some("thumbs/a.webp"));
        assert!(store.index_parity("/root").await.unwrap().is_consistent());
    }
}
