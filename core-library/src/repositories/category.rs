//! Category repository trait and implementations

use crate::db::{decode_timestamp, encode_timestamp};
use crate::error::{LibraryError, Result};
use crate::models::Category;
use async_trait::async_trait;
use bridge_traits::storage::SettingsStore;
use sqlx::{query, query_as, SqlitePool};
use std::sync::Arc;
use tracing::warn;

/// Settings key of the single-document category list.
pub const CATEGORIES_DOCUMENT_KEY: &str = "tracker.categories";

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// All categories ordered by `sort_order`, then name.
    async fn list(&self) -> Result<Vec<Category>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Category>>;

    /// Insert or replace `category`.
    ///
    /// # Errors
    /// Returns `InvalidInput` when the category fails validation.
    async fn save(&self, category: &Category) -> Result<()>;

    /// # Returns
    /// - `Ok(true)` if the category was deleted
    /// - `Ok(false)` if it did not exist
    async fn delete(&self, id: &str) -> Result<bool>;
}

fn validate(category: &Category) -> Result<()> {
    category.validate().map_err(|message| LibraryError::InvalidInput {
        field: "Category".to_string(),
        message,
    })
}

fn sort(categories: &mut [Category]) {
    categories.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// SQLite implementation of CategoryRepository
pub struct SqliteCategoryRepository {
    pool: SqlitePool,
}

impl SqliteCategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

type CategoryRow = (String, String, i64, i64);

fn from_row((id, name, sort_order, created_at): CategoryRow) -> Category {
    Category {
        id,
        name,
        sort_order,
        created_at: decode_timestamp(created_at),
    }
}

#[async_trait]
impl CategoryRepository for SqliteCategoryRepository {
    async fn list(&self) -> Result<Vec<Category>> {
        let rows = query_as::<_, CategoryRow>(
            "SELECT id, name, sort_order, created_at FROM categories ORDER BY sort_order ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Category>> {
        let row = query_as::<_, CategoryRow>(
            "SELECT id, name, sort_order, created_at FROM categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(from_row))
    }

    async fn save(&self, category: &Category) -> Result<()> {
        validate(category)?;

        query(
            r#"
            INSERT INTO categories (id, name, sort_order, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, sort_order = excluded.sort_order
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(category.sort_order)
        .bind(encode_timestamp(category.created_at)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Categories as one ordered JSON array under [`CATEGORIES_DOCUMENT_KEY`].
pub struct DocumentCategoryRepository {
    settings: Arc<dyn SettingsStore>,
}

impl DocumentCategoryRepository {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    async fn read(&self) -> Result<Vec<Category>> {
        let Some(json) = self.settings.get_string(CATEGORIES_DOCUMENT_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&json) {
            Ok(categories) => Ok(categories),
            Err(e) => {
                warn!(error = %e, "Malformed category document, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn write(&self, categories: &[Category]) -> Result<()> {
        let json = serde_json::to_string(categories)?;
        self.settings
            .set_string(CATEGORIES_DOCUMENT_KEY, &json)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for DocumentCategoryRepository {
    async fn list(&self) -> Result<Vec<Category>> {
        let mut categories = self.read().await?;
        sort(&mut categories);
        Ok(categories)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Category>> {
        Ok(self.read().await?.into_iter().find(|c| c.id == id))
    }

    async fn save(&self, category: &Category) -> Result<()> {
        validate(category)?;

        let mut categories = self.read().await?;
        match categories.iter_mut().find(|c| c.id == category.id) {
            Some(existing) => {
                existing.name = category.name.clone();
                existing.sort_order = category.sort_order;
            }
            None => categories.push(category.clone()),
        }
        self.write(&categories).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut categories = self.read().await?;
        let before = categories.len();
        categories.retain(|c| c.id != id);
        if categories.len() == before {
            return Ok(false);
        }
        self.write(&categories).await?;
        Ok(true)
    }
}
