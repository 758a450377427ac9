//! Item service layer - owner-facing catalogue operations

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ApiError, StoreError};
use crate::item::model::{
    CreateItemRequest, Item, ItemChanges, ItemFilter, NewItem, UpdateItemRequest,
};
use crate::item::registry::ItemRegistry;
use crate::models::{OwnerSnapshot, PaginatedResponse};

/// Item service errors
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("Item {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ItemError> for ApiError {
    fn from(err: ItemError) -> Self {
        match err {
            ItemError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ItemError::Forbidden(msg) => ApiError::Forbidden(msg),
            ItemError::Validation(msg) => ApiError::ValidationError(msg),
            ItemError::InvalidState(msg) => ApiError::BadRequest(msg),
            ItemError::Store(e) => e.into(),
        }
    }
}

fn required(field: &str, value: String) -> Result<String, ItemError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ItemError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trim, drop empties, and de-duplicate while keeping first-seen order
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Item service for managing listings
#[derive(Clone)]
pub struct ItemService {
    registry: Arc<dyn ItemRegistry>,
}

impl ItemService {
    pub fn new(registry: Arc<dyn ItemRegistry>) -> Self {
        Self { registry }
    }

    /// List a new item on behalf of its owner
    #[instrument(skip(self, request), fields(owner_id = %owner.id))]
    pub async fn create_item(
        &self,
        owner: OwnerSnapshot,
        request: CreateItemRequest,
    ) -> Result<Item, ItemError> {
        let item = NewItem {
            title: required("Title", request.title)?,
            description: required("Description", request.description)?,
            condition: request.condition,
            category: optional(request.category),
            tags: normalize_tags(request.tags.unwrap_or_default()),
            image_url: required("Image URL", request.image_url)?,
            owner,
        };

        let item = self.registry.create(item).await?;
        tracing::info!(item_id = %item.id, "Item listed");
        Ok(item)
    }

    /// Read an item, bumping its view counter.
    ///
    /// A failed counter update is logged and does not fail the read.
    #[instrument(skip(self))]
    pub async fn get_item(&self, id: Uuid) -> Result<Item, ItemError> {
        let mut item = self
            .registry
            .get(id)
            .await?
            .ok_or(ItemError::NotFound(id))?;

        match self.registry.increment_views(id).await {
            Ok(()) => item.views += 1,
            Err(e) => tracing::warn!(item_id = %id, error = %e, "Failed to increment view counter"),
        }

        Ok(item)
    }

    /// Edit listing fields (owner only)
    #[instrument(skip(self, request))]
    pub async fn update_item(
        &self,
        id: Uuid,
        owner_id: Uuid,
        request: UpdateItemRequest,
    ) -> Result<Item, ItemError> {
        let existing = self
            .registry
            .get(id)
            .await?
            .ok_or(ItemError::NotFound(id))?;

        if existing.owner.id != owner_id {
            return Err(ItemError::Forbidden(
                "Not authorized to update this item".to_string(),
            ));
        }

        let changes = ItemChanges {
            title: request.title.map(|v| required("Title", v)).transpose()?,
            description: request
                .description
                .map(|v| required("Description", v))
                .transpose()?,
            condition: request.condition,
            image_url: request
                .image_url
                .map(|v| required("Image URL", v))
                .transpose()?,
            category: optional(request.category),
            tags: request.tags.map(normalize_tags),
        };

        self.registry
            .update(id, changes)
            .await?
            .ok_or(ItemError::NotFound(id))
    }

    /// Remove a listing (owner only, and only while no trade holds it)
    #[instrument(skip(self))]
    pub async fn delete_item(&self, id: Uuid, owner_id: Uuid) -> Result<(), ItemError> {
        let existing = self
            .registry
            .get(id)
            .await?
            .ok_or(ItemError::NotFound(id))?;

        if existing.owner.id != owner_id {
            return Err(ItemError::Forbidden(
                "Not authorized to delete this item".to_string(),
            ));
        }

        if !self.registry.delete_if_available(id).await? {
            return Err(ItemError::InvalidState(
                "Only available items can be deleted".to_string(),
            ));
        }

        tracing::info!(item_id = %id, "Item deleted");
        Ok(())
    }

    /// Browse available items
    #[instrument(skip(self))]
    pub async fn browse(&self, filter: ItemFilter) -> Result<PaginatedResponse<Item>, ItemError> {
        let (query, page) = filter.into_parts();
        let (items, total) = self.registry.find_available(&query, page).await?;
        Ok(PaginatedResponse::new(items, total, page))
    }

    /// Toggle the caller's favourite mark on an item
    #[instrument(skip(self))]
    pub async fn toggle_favorite(&self, id: Uuid, user_id: Uuid) -> Result<Item, ItemError> {
        self.registry
            .toggle_favorite(id, user_id)
            .await?
            .ok_or(ItemError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::memory::InMemoryItemRegistry;
    use crate::item::model::ItemCondition;

    fn owner() -> OwnerSnapshot {
        OwnerSnapshot {
            id: Uuid::new_v4(),
            name: "Sam".to_string(),
            university: "State U".to_string(),
        }
    }

    fn request(title: &str) -> CreateItemRequest {
        CreateItemRequest {
            title: title.to_string(),
            description: "Barely used".to_string(),
            condition: ItemCondition::LikeNew,
            image_url: "https://img.example/x.png".to_string(),
            category: Some("  electronics ".to_string()),
            tags: Some(vec![" usb ".to_string(), "usb".to_string(), "".to_string()]),
        }
    }

    fn service() -> (ItemService, Arc<InMemoryItemRegistry>) {
        let registry = Arc::new(InMemoryItemRegistry::new());
        (ItemService::new(registry.clone()), registry)
    }

    #[tokio::test]
    async fn test_create_normalizes_fields() {
        let (service, _) = service();
        let item = service
            .create_item(owner(), request("  Charger "))
            .await
            .unwrap();

        assert_eq!(item.title, "Charger");
        assert_eq!(item.category.as_deref(), Some("electronics"));
        assert_eq!(item.tags, vec!["usb".to_string()]);
        assert!(item.is_available);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let (service, _) = service();
        let err = service.create_item(owner(), request("   ")).await.unwrap_err();
        assert!(matches!(err, ItemError::Validation(_)));
    }

    #[tokio::test]
    async fn test_get_increments_views() {
        let (service, _) = service();
        let item = service.create_item(owner(), request("Mouse")).await.unwrap();

        assert_eq!(service.get_item(item.id).await.unwrap().views, 1);
        assert_eq!(service.get_item(item.id).await.unwrap().views, 2);
    }

    #[tokio::test]
    async fn test_only_owner_can_update_or_delete() {
        let (service, _) = service();
        let seller = owner();
        let item = service
            .create_item(seller.clone(), request("Monitor"))
            .await
            .unwrap();
        let stranger = Uuid::new_v4();

        let err = service
            .update_item(item.id, stranger, UpdateItemRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::Forbidden(_)));

        let err = service.delete_item(item.id, stranger).await.unwrap_err();
        assert!(matches!(err, ItemError::Forbidden(_)));

        let updated = service
            .update_item(
                item.id,
                seller.id,
                UpdateItemRequest {
                    title: Some("4K Monitor".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "4K Monitor");
        assert_eq!(updated.description, item.description);
    }

    #[tokio::test]
    async fn test_cannot_delete_held_item() {
        let (service, registry) = service();
        let seller = owner();
        let item = service
            .create_item(seller.clone(), request("Tent"))
            .await
            .unwrap();
        registry.set_availability(&[item.id], false).await.unwrap();

        let err = service.delete_item(item.id, seller.id).await.unwrap_err();
        assert!(matches!(err, ItemError::InvalidState(_)));
    }

    #[test]
    fn test_error_mapping() {
        let api: ApiError = ItemError::NotFound(Uuid::nil()).into();
        assert_eq!(api.error_code(), "NOT_FOUND");
        let api: ApiError = ItemError::Forbidden("no".to_string()).into();
        assert_eq!(api.error_code(), "FORBIDDEN");
    }
}
