//! In-memory item registry used by the memory backend and tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::item::model::{Item, ItemChanges, ItemQuery, ItemSort, NewItem};
use crate::item::registry::{distinct_count, ItemRegistry};
use crate::models::PageRequest;

#[derive(Clone, Default)]
pub struct InMemoryItemRegistry {
    items: Arc<RwLock<HashMap<Uuid, Item>>>,
}

impl InMemoryItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Crude relevance: title and tag hits weigh double
fn relevance(item: &Item, terms: &[String]) -> usize {
    let title = item.title.to_lowercase();
    let description = item.description.to_lowercase();
    terms
        .iter()
        .map(|term| {
            let mut score = 0;
            if title.contains(term.as_str()) {
                score += 2;
            }
            if description.contains(term.as_str()) {
                score += 1;
            }
            if item.tags.iter().any(|t| t.to_lowercase().contains(term.as_str())) {
                score += 2;
            }
            score
        })
        .sum()
}

fn matches(item: &Item, query: &ItemQuery, terms: &[String]) -> bool {
    if !item.is_available {
        return false;
    }
    if let Some(category) = &query.category {
        if item.category.as_deref() != Some(category.as_str()) {
            return false;
        }
    }
    if let Some(condition) = query.condition {
        if item.condition != condition {
            return false;
        }
    }
    terms.is_empty() || relevance(item, terms) > 0
}

#[async_trait]
impl ItemRegistry for InMemoryItemRegistry {
    async fn create(&self, item: NewItem) -> Result<Item, StoreError> {
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            title: item.title,
            description: item.description,
            condition: item.condition,
            category: item.category,
            tags: item.tags,
            image_url: item.image_url,
            owner: item.owner,
            is_available: true,
            views: 0,
            favorites: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.items.write().await.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Item>, StoreError> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn increment_views(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(item) = self.items.write().await.get_mut(&id) {
            item.views += 1;
        }
        Ok(())
    }

    async fn update(&self, id: Uuid, changes: ItemChanges) -> Result<Option<Item>, StoreError> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = changes.title {
            item.title = title;
        }
        if let Some(description) = changes.description {
            item.description = description;
        }
        if let Some(condition) = changes.condition {
            item.condition = condition;
        }
        if let Some(image_url) = changes.image_url {
            item.image_url = image_url;
        }
        if let Some(category) = changes.category {
            item.category = Some(category);
        }
        if let Some(tags) = changes.tags {
            item.tags = tags;
        }
        item.updated_at = Utc::now();

        Ok(Some(item.clone()))
    }

    async fn delete_if_available(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut items = self.items.write().await;
        match items.get(&id) {
            Some(item) if item.is_available => {
                items.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_available(
        &self,
        query: &ItemQuery,
        page: PageRequest,
    ) -> Result<(Vec<Item>, i64), StoreError> {
        let terms: Vec<String> = query
            .text
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        let items = self.items.read().await;
        let mut found: Vec<&Item> = items
            .values()
            .filter(|item| matches(item, query, &terms))
            .collect();

        match query.sort {
            ItemSort::Relevance if !terms.is_empty() => found.sort_by(|a, b| {
                relevance(b, &terms)
                    .cmp(&relevance(a, &terms))
                    .then(b.created_at.cmp(&a.created_at))
            }),
            _ => found.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }

        let total = found.len() as i64;
        let data = found
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok((data, total))
    }

    async fn verify_owned_and_available(
        &self,
        ids: &[Uuid],
        owner_id: Uuid,
    ) -> Result<bool, StoreError> {
        if ids.is_empty() {
            return Ok(false);
        }

        let items = self.items.read().await;
        Ok(ids.iter().all(|id| {
            items
                .get(id)
                .is_some_and(|item| item.is_available && item.owner.id == owner_id)
        }))
    }

    async fn set_availability(&self, ids: &[Uuid], value: bool) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let now = Utc::now();
        for id in ids {
            if let Some(item) = items.get_mut(id) {
                if item.is_available != value {
                    item.is_available = value;
                    item.updated_at = now;
                }
            }
        }
        Ok(())
    }

    async fn reserve(&self, ids: &[Uuid], owner_id: Uuid) -> Result<bool, StoreError> {
        if ids.is_empty() || distinct_count(ids) != ids.len() {
            return Ok(false);
        }

        // Check and flip under the same write guard
        let mut items = self.items.write().await;
        let all_free = ids.iter().all(|id| {
            items
                .get(id)
                .is_some_and(|item| item.is_available && item.owner.id == owner_id)
        });
        if !all_free {
            return Ok(false);
        }

        let now = Utc::now();
        for id in ids {
            if let Some(item) = items.get_mut(id) {
                item.is_available = false;
                item.updated_at = now;
            }
        }
        Ok(true)
    }

    async fn toggle_favorite(&self, id: Uuid, user_id: Uuid) -> Result<Option<Item>, StoreError> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(pos) = item.favorites.iter().position(|u| *u == user_id) {
            item.favorites.remove(pos);
        } else {
            item.favorites.push(user_id);
        }
        item.updated_at = Utc::now();

        Ok(Some(item.clone()))
    }
}
