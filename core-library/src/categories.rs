//! User categories and the default-category preference.

use crate::error::{LibraryError, Result};
use crate::models::Category;
use crate::repositories::CategoryRepository;
use crate::store::EntryStore;
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Settings key of the default category id.
pub const DEFAULT_CATEGORY_KEY: &str = "library.default_category";

pub struct CategoryStore {
    repository: Arc<dyn CategoryRepository>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl CategoryStore {
    pub fn new(
        repository: Arc<dyn CategoryRepository>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            settings,
            clock,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn publish(&self, category_id: &str, change_type: &str) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Library(LibraryEvent::CategoryChanged {
                category_id: category_id.to_string(),
                change_type: change_type.to_string(),
            }));
        }
    }

    /// Categories ordered for display.
    pub async fn list(&self) -> Result<Vec<Category>> {
        self.repository.list().await
    }

    /// Create a category at the end of the current order.
    pub async fn create(&self, name: &str) -> Result<Category> {
        let existing = self.repository.list().await?;
        let sort_order = existing
            .iter()
            .map(|c| c.sort_order)
            .max()
            .map_or(0, |max| max + 1);

        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            sort_order,
            created_at: self.clock.now(),
        };
        self.repository.save(&category).await?;

        info!(category_id = %category.id, name = %category.name, "Category created");
        self.publish(&category.id, "created");
        Ok(category)
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<Category> {
        let mut category = self.find(id).await?;
        category.name = name.trim().to_string();
        self.repository.save(&category).await?;

        self.publish(id, "renamed");
        Ok(category)
    }

    /// Move a category to `sort_order`.
    pub async fn reorder(&self, id: &str, sort_order: i64) -> Result<Category> {
        let mut category = self.find(id).await?;
        category.sort_order = sort_order;
        self.repository.save(&category).await?;
        Ok(category)
    }

    /// Delete a category, detach it from every entry and clear it as the
    /// default. Deleting an unknown id is a no-op.
    pub async fn delete(&self, id: &str, entries: &EntryStore) -> Result<bool> {
        if !self.repository.delete(id).await? {
            return Ok(false);
        }

        let detached = entries.remove_category_everywhere(id).await?;
        if self.default_category().await?.as_deref() == Some(id) {
            self.settings.delete(DEFAULT_CATEGORY_KEY).await?;
        }

        info!(category_id = %id, detached, "Category deleted");
        self.publish(id, "deleted");
        Ok(true)
    }

    /// The default category, if one is set and still exists.
    pub async fn default_category(&self) -> Result<Option<String>> {
        let Some(id) = self.settings.get_string(DEFAULT_CATEGORY_KEY).await? else {
            return Ok(None);
        };
        if self.repository.find_by_id(&id).await?.is_none() {
            warn!(category_id = %id, "Default category no longer exists");
            return Ok(None);
        }
        Ok(Some(id))
    }

    /// Set or clear the default category.
    pub async fn set_default_category(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => {
                self.find(id).await?;
                self.settings.set_string(DEFAULT_CATEGORY_KEY, id).await?;
            }
            None => self.settings.delete(DEFAULT_CATEGORY_KEY).await?,
        }
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Category> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Category".to_string(),
                id: id.to_string(),
            })
    }
}
