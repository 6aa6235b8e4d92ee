use chrono::Utc;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::Set,
    ColumnTrait,
    ConnectionTrait,
    DatabaseConnection,
    EntityTrait,
    PaginatorTrait,
    QueryFilter,
    QueryOrder,
    QuerySelect,
};

use crate::error::{ AppError, Result };

pub mod entity;
pub use entity::*;

// ─── Users ───────────────────────────────────────────────────────────

pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Fetch the user, creating a default free-plan row on first contact.
    pub async fn get_or_create(
        &self,
        id: i64,
        default_dest: i32,
        default_max_links: i32
    ) -> Result<entity::user::Model> {
        if let Some(user) = entity::user::Entity::find_by_id(id).one(&self.db).await? {
            return Ok(user);
        }

        let user = entity::user::ActiveModel {
            id: Set(id),
            plan: Set("plan_free".to_string()),
            discount_percent: Set(0),
            max_links: Set(default_max_links),
            dest: Set(default_dest),
            pvz_address: Set(None),
            sort_mode: Set("updated".to_string()),
            created_at: Set(Utc::now()),
        };

        Ok(user.insert(&self.db).await?)
    }

    pub async fn all(&self) -> Result<Vec<entity::user::Model>> {
        Ok(entity::user::Entity::find().all(&self.db).await?)
    }

    pub async fn set_dest(&self, id: i64, dest: i32, pvz_address: Option<String>) -> Result<()> {
        let user = entity::user::Entity
            ::find_by_id(id)
            .one(&self.db).await?
            .ok_or(AppError::InvalidInput(format!("Unknown user: {}", id)))?;

        let mut active: entity::user::ActiveModel = user.into();
        active.dest = Set(dest);
        active.pvz_address = Set(pvz_address);
        active.update(&self.db).await?;
        Ok(())
    }

    pub async fn set_plan(
        &self,
        id: i64,
        plan: &str,
        discount_percent: i32,
        max_links: i32
    ) -> Result<()> {
        let user = entity::user::Entity
            ::find_by_id(id)
            .one(&self.db).await?
            .ok_or(AppError::InvalidInput(format!("Unknown user: {}", id)))?;

        let mut active: entity::user::ActiveModel = user.into();
        active.plan = Set(plan.to_string());
        active.discount_percent = Set(discount_percent);
        active.max_links = Set(max_links);
        active.update(&self.db).await?;
        Ok(())
    }
}

// ─── Products ────────────────────────────────────────────────────────

/// Cached marketplace state written back after a reconciliation.
/// `name` is `None` when the marketplace name did not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCacheUpdate {
    pub basic_price: i64,
    pub product_price: i64,
    pub qty: i64,
    pub out_of_stock: bool,
    pub name: Option<String>,
}

pub struct ProductRepository {
    db: DatabaseConnection,
}

impl ProductRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Every tracked product, for the monitoring cycle.
    pub async fn list_active(&self) -> Result<Vec<entity::product::Model>> {
        Ok(entity::product::Entity::find().all(&self.db).await?)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<entity::product::Model> {
        entity::product::Entity
            ::find_by_id(id)
            .one(&self.db).await?
            .ok_or(AppError::ProductNotFound)
    }

    pub async fn find_by_nm_id(
        &self,
        user_id: i64,
        nm_id: i64
    ) -> Result<Option<entity::product::Model>> {
        Ok(
            entity::product::Entity
                ::find()
                .filter(entity::product::Column::UserId.eq(user_id))
                .filter(entity::product::Column::NmId.eq(nm_id))
                .one(&self.db).await?
        )
    }

    pub async fn create(
        &self,
        user_id: i64,
        url: String,
        nm_id: i64,
        name: String,
        selected_size: Option<String>
    ) -> Result<entity::product::Model> {
        let now = Utc::now();

        let product = entity::product::ActiveModel {
            user_id: Set(user_id),
            url_product: Set(url),
            nm_id: Set(nm_id),
            name_product: Set(name),
            custom_name: Set(None),
            selected_size: Set(selected_size),
            notify_mode: Set(None),
            notify_value: Set(None),
            last_basic_price: Set(None),
            last_product_price: Set(None),
            last_qty: Set(None),
            out_of_stock: Set(false),
            fail_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        Ok(product.insert(&self.db).await?)
    }

    pub async fn delete(&self, id: i64, user_id: i64) -> Result<()> {
        entity::product::Entity
            ::delete_many()
            .filter(entity::product::Column::Id.eq(id))
            .filter(entity::product::Column::UserId.eq(user_id))
            .exec(&self.db).await?;
        Ok(())
    }

    pub async fn count_for_user(&self, user_id: i64) -> Result<u64> {
        Ok(
            entity::product::Entity
                ::find()
                .filter(entity::product::Column::UserId.eq(user_id))
                .count(&self.db).await?
        )
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<entity::product::Model>> {
        Ok(
            entity::product::Entity
                ::find()
                .filter(entity::product::Column::UserId.eq(user_id))
                .order_by_desc(entity::product::Column::UpdatedAt)
                .all(&self.db).await?
        )
    }

    pub async fn set_custom_name(&self, id: i64, user_id: i64, name: String) -> Result<()> {
        let product = self.find_by_id(id).await?;
        if product.user_id != user_id {
            return Err(AppError::ProductNotFound);
        }

        let mut active: entity::product::ActiveModel = product.into();
        active.custom_name = Set(Some(name));
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    pub async fn set_notify_rule(
        &self,
        id: i64,
        user_id: i64,
        mode: Option<String>,
        value: Option<i64>
    ) -> Result<()> {
        let product = self.find_by_id(id).await?;
        if product.user_id != user_id {
            return Err(AppError::ProductNotFound);
        }

        let mut active: entity::product::ActiveModel = product.into();
        active.notify_mode = Set(mode);
        active.notify_value = Set(value);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    /// Overwrite the product's cached marketplace state. Runs on the
    /// caller's connection so the reconcile engine can keep the write
    /// inside its per-product transaction.
    pub async fn update_cache<C: ConnectionTrait>(
        conn: &C,
        id: i64,
        update: ProductCacheUpdate
    ) -> Result<()> {
        let product = entity::product::Entity
            ::find_by_id(id)
            .one(conn).await?
            .ok_or(AppError::ProductNotFound)?;

        let mut active: entity::product::ActiveModel = product.into();
        active.last_basic_price = Set(Some(update.basic_price));
        active.last_product_price = Set(Some(update.product_price));
        active.last_qty = Set(Some(update.qty));
        active.out_of_stock = Set(update.out_of_stock);
        if let Some(name) = update.name {
            active.name_product = Set(name);
        }
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;
        Ok(())
    }

    /// Clear the consecutive-failure counter after a successful fetch.
    pub async fn reset_fail_count<C: ConnectionTrait>(conn: &C, id: i64) -> Result<()> {
        let product = entity::product::Entity
            ::find_by_id(id)
            .one(conn).await?
            .ok_or(AppError::ProductNotFound)?;

        if product.fail_count == 0 {
            return Ok(());
        }

        let mut active: entity::product::ActiveModel = product.into();
        active.fail_count = Set(0);
        active.update(conn).await?;
        Ok(())
    }

    pub async fn bump_fail_count(&self, id: i64) -> Result<()> {
        let product = self.find_by_id(id).await?;
        let count = product.fail_count;

        let mut active: entity::product::ActiveModel = product.into();
        active.fail_count = Set(count + 1);
        active.update(&self.db).await?;
        Ok(())
    }
}

// ─── Price history ───────────────────────────────────────────────────

pub struct PriceHistoryRepository {
    db: DatabaseConnection,
}

impl PriceHistoryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record one observation row. Runs on the caller's connection for
    /// the same reason as `ProductRepository::update_cache`.
    pub async fn append<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
        basic_price: i64,
        product_price: i64,
        qty: i64
    ) -> Result<entity::price_history::Model> {
        let entry = entity::price_history::ActiveModel {
            product_id: Set(product_id),
            basic_price: Set(basic_price),
            product_price: Set(product_price),
            qty: Set(qty),
            recorded_at: Set(Utc::now()),
            ..Default::default()
        };

        Ok(entry.insert(conn).await?)
    }

    /// Newest-first slice of a product's history.
    pub async fn recent(
        &self,
        product_id: i64,
        limit: u64
    ) -> Result<Vec<entity::price_history::Model>> {
        Ok(
            entity::price_history::Entity
                ::find()
                .filter(entity::price_history::Column::ProductId.eq(product_id))
                .order_by_desc(entity::price_history::Column::RecordedAt)
                .limit(limit)
                .all(&self.db).await?
        )
    }
}
