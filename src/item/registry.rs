//! Item registry - persistence boundary for listed items

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::StoreError;
use crate::item::model::{Item, ItemChanges, ItemQuery, ItemRow, ItemSort, NewItem};
use crate::models::PageRequest;

/// Storage operations over items.
///
/// `set_availability` is the low-level primitive and performs no ownership
/// checks. `reserve` is the only way to take items out of circulation for a
/// trade: it must flip every id or none.
#[async_trait]
pub trait ItemRegistry: Send + Sync {
    async fn create(&self, item: NewItem) -> Result<Item, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Item>, StoreError>;

    async fn increment_views(&self, id: Uuid) -> Result<(), StoreError>;

    async fn update(&self, id: Uuid, changes: ItemChanges) -> Result<Option<Item>, StoreError>;

    /// Delete the item only if it is still available
    async fn delete_if_available(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn find_available(
        &self,
        query: &ItemQuery,
        page: PageRequest,
    ) -> Result<(Vec<Item>, i64), StoreError>;

    async fn verify_owned_and_available(
        &self,
        ids: &[Uuid],
        owner_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn set_availability(&self, ids: &[Uuid], value: bool) -> Result<(), StoreError>;

    /// Atomically mark every id unavailable if all are owned by `owner_id`
    /// and currently available. Returns false and changes nothing otherwise.
    async fn reserve(&self, ids: &[Uuid], owner_id: Uuid) -> Result<bool, StoreError>;

    /// Add `user_id` to the item's favourites, or remove it if present
    async fn toggle_favorite(&self, id: Uuid, user_id: Uuid) -> Result<Option<Item>, StoreError>;
}

pub(crate) fn distinct_count(ids: &[Uuid]) -> usize {
    ids.iter().collect::<HashSet<_>>().len()
}

const SEARCH_DOCUMENT: &str =
    "to_tsvector('english', title || ' ' || description || ' ' || array_to_string(tags, ' '))";

/// PostgreSQL-backed item registry
#[derive(Clone)]
pub struct PgItemRegistry {
    db_pool: PgPool,
}

impl PgItemRegistry {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ItemQuery) {
        if let Some(category) = &query.category {
            builder.push(" AND category = ");
            builder.push_bind(category.clone());
        }
        if let Some(condition) = query.condition {
            builder.push(" AND condition = ");
            builder.push_bind(condition);
        }
        if let Some(text) = &query.text {
            builder.push(" AND ");
            builder.push(SEARCH_DOCUMENT);
            builder.push(" @@ plainto_tsquery('english', ");
            builder.push_bind(text.clone());
            builder.push(")");
        }
    }
}

#[async_trait]
impl ItemRegistry for PgItemRegistry {
    async fn create(&self, item: NewItem) -> Result<Item, StoreError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            INSERT INTO items (
                id, title, description, condition, category, tags, image_url,
                owner_id, owner_name, owner_university, is_available, views,
                favorites, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, 0, '{}', $11, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.condition)
        .bind(&item.category)
        .bind(&item.tags)
        .bind(&item.image_url)
        .bind(item.owner.id)
        .bind(&item.owner.name)
        .bind(&item.owner.university)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(row.into())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(row.map(Item::from))
    }

    async fn increment_views(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE items SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }

    async fn update(&self, id: Uuid, changes: ItemChanges) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            UPDATE items SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                condition = COALESCE($4, condition),
                image_url = COALESCE($5, image_url),
                category = COALESCE($6, category),
                tags = COALESCE($7, tags),
                updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.condition)
        .bind(changes.image_url)
        .bind(changes.category)
        .bind(changes.tags)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row.map(Item::from))
    }

    async fn delete_if_available(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1 AND is_available = TRUE")
            .bind(id)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_available(
        &self,
        query: &ItemQuery,
        page: PageRequest,
    ) -> Result<(Vec<Item>, i64), StoreError> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM items WHERE is_available = TRUE");
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM items WHERE is_available = TRUE");

        Self::push_filters(&mut query_builder, query);
        Self::push_filters(&mut count_builder, query);

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        match (&query.sort, &query.text) {
            (ItemSort::Relevance, Some(text)) => {
                query_builder.push(" ORDER BY ts_rank(");
                query_builder.push(SEARCH_DOCUMENT);
                query_builder.push(", plainto_tsquery('english', ");
                query_builder.push_bind(text.clone());
                query_builder.push(")) DESC, created_at DESC");
            }
            _ => {
                query_builder.push(" ORDER BY created_at DESC");
            }
        }

        query_builder.push(" LIMIT ");
        query_builder.push_bind(page.limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(page.offset());

        let rows = query_builder
            .build_query_as::<ItemRow>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok((rows.into_iter().map(Item::from).collect(), total))
    }

    async fn verify_owned_and_available(
        &self,
        ids: &[Uuid],
        owner_id: Uuid,
    ) -> Result<bool, StoreError> {
        if ids.is_empty() {
            return Ok(false);
        }

        let matched: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM items
            WHERE id = ANY($1) AND owner_id = $2 AND is_available = TRUE
            "#,
        )
        .bind(ids.to_vec())
        .bind(owner_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(matched as usize == distinct_count(ids))
    }

    async fn set_availability(&self, ids: &[Uuid], value: bool) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE items SET is_available = $2, updated_at = $3
            WHERE id = ANY($1) AND is_available <> $2
            "#,
        )
        .bind(ids.to_vec())
        .bind(value)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn reserve(&self, ids: &[Uuid], owner_id: Uuid) -> Result<bool, StoreError> {
        if ids.is_empty() {
            return Ok(false);
        }

        let mut tx = self.db_pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE items SET is_available = FALSE, updated_at = $3
            WHERE id = ANY($1) AND owner_id = $2 AND is_available = TRUE
            "#,
        )
        .bind(ids.to_vec())
        .bind(owner_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() as usize != distinct_count(ids) {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn toggle_favorite(&self, id: Uuid, user_id: Uuid) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            UPDATE items SET
                favorites = CASE
                    WHEN $2 = ANY(favorites) THEN array_remove(favorites, $2)
                    ELSE array_append(favorites, $2)
                END,
                updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row.map(Item::from))
    }
}
