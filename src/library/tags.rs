//! Tag store - tags and asset-tag associations
//!
//! Pure relation mutation; sync-event emission for these operations lives
//! in the core facade so replayed events can suppress re-publication.

use crate::domain::Tag;
use crate::library::error::{CatalogError, Result};
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct TagStore {
    pool: SqlitePool,
}

impl TagStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a tag. On a duplicate name the pre-existing tag is returned,
    /// so concurrent create races converge instead of failing.
    pub async fn create_tag(&self, tag: &Tag) -> Result<Tag> {
        let result = sqlx::query("INSERT INTO tags (id, name, color) VALUES (?, ?, ?)")
            .bind(&tag.id)
            .bind(&tag.name)
            .bind(&tag.color)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(tag.clone()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!("Tag '{}' already exists, returning existing", tag.name);
                self.get_tag_by_name(&tag.name)
                    .await?
                    .ok_or_else(|| CatalogError::NotFound(format!("tag '{}'", tag.name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_tags(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name, color FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| Tag {
                id: row.get("id"),
                name: row.get("name"),
                color: row.get("color"),
            })
            .collect())
    }

    pub async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, color FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Tag {
            id: row.get("id"),
            name: row.get("name"),
            color: row.get("color"),
        }))
    }

    /// Delete a tag; its asset associations cascade.
    pub async fn delete_tag(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Associate a tag with an asset. Already-present associations are a
    /// no-op, which makes replayed events idempotent.
    pub async fn add_tag_to_asset(&self, asset_id: &str, tag_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO asset_tags (asset_id, tag_id) VALUES (?, ?)")
            .bind(asset_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_tag_from_asset(&self, asset_id: &str, tag_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM asset_tags WHERE asset_id = ? AND tag_id = ?")
            .bind(asset_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::Database;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_tag_converges_on_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("catalog.db")).await.unwrap();
        let store = TagStore::new(db.pool().clone());

        let first = store
            .create_tag(&Tag::new("portfolio", Some("#00ff00".to_string())))
            .await
            .unwrap();
        let second = store.create_tag(&Tag::new("portfolio", None)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.get_tags().await.unwrap().len(), 1);
    }
}
