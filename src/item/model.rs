//! Item models and data structures for UniGoods backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::models::{OwnerSnapshot, PageRequest};

/// Listed secondhand item
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub condition: ItemCondition,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image_url: String,
    pub owner: OwnerSnapshot,
    pub is_available: bool,
    pub views: i64,
    pub favorites: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Item condition as shown on the listing
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "item_condition")]
pub enum ItemCondition {
    New,
    #[sqlx(rename = "Like New")]
    #[serde(rename = "Like New")]
    LikeNew,
    Good,
    Fair,
}

/// Flat row as stored in the `items` table
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub condition: ItemCondition,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image_url: String,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub owner_university: String,
    pub is_available: bool,
    pub views: i64,
    pub favorites: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            condition: row.condition,
            category: row.category,
            tags: row.tags,
            image_url: row.image_url,
            owner: OwnerSnapshot {
                id: row.owner_id,
                name: row.owner_name,
                university: row.owner_university,
            },
            is_available: row.is_available,
            views: row.views,
            favorites: row.favorites,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Normalized input for a new listing
#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub condition: ItemCondition,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image_url: String,
    pub owner: OwnerSnapshot,
}

/// Partial field update; `None` leaves the field unchanged
#[derive(Debug, Clone, Default)]
pub struct ItemChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub condition: Option<ItemCondition>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Request DTO for listing an item
#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 5000, message = "Description is required"))]
    pub description: String,
    pub condition: ItemCondition,
    #[validate(length(min = 1, max = 2048, message = "Image URL is required"))]
    pub image_url: String,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Option<Vec<String>>,
}

/// Request DTO for editing an item
#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 200, message = "Title must not be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000, message = "Description must not be empty"))]
    pub description: Option<String>,
    pub condition: Option<ItemCondition>,
    #[validate(length(min = 1, max = 2048, message = "Image URL must not be empty"))]
    pub image_url: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Option<Vec<String>>,
}

/// Browse ordering
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemSort {
    #[default]
    Newest,
    Relevance,
}

/// Query parameters for browsing available items
#[derive(Debug, Deserialize, Default)]
pub struct ItemFilter {
    pub category: Option<String>,
    pub condition: Option<ItemCondition>,
    pub q: Option<String>,
    pub sort: Option<ItemSort>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Store-level search criteria (availability is always implied)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemQuery {
    pub category: Option<String>,
    pub condition: Option<ItemCondition>,
    pub text: Option<String>,
    pub sort: ItemSort,
}

impl ItemFilter {
    /// Split into search criteria and a normalized page.
    ///
    /// Relevance ordering is only honoured when there is search text.
    pub fn into_parts(self) -> (ItemQuery, PageRequest) {
        let text = self
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        let sort = match (self.sort.unwrap_or_default(), &text) {
            (ItemSort::Relevance, Some(_)) => ItemSort::Relevance,
            _ => ItemSort::Newest,
        };
        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        (
            ItemQuery {
                category,
                condition: self.condition,
                text,
                sort,
            },
            PageRequest::new(self.page, self.limit),
        )
    }
}
