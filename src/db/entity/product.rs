use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };

use crate::enums::NotifyRule;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub url_product: String,
    /// Marketplace article number.
    pub nm_id: i64,
    pub name_product: String,
    pub custom_name: Option<String>,
    pub selected_size: Option<String>,
    pub notify_mode: Option<String>, // "percent", "threshold"; NULL = any change
    pub notify_value: Option<i64>,
    pub last_basic_price: Option<i64>,
    pub last_product_price: Option<i64>,
    pub last_qty: Option<i64>,
    pub out_of_stock: bool,
    /// Consecutive permanent fetch failures; reset on success.
    pub fail_count: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// User-chosen name if set, otherwise the cached marketplace name.
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.name_product)
    }

    pub fn notify_rule(&self) -> NotifyRule {
        NotifyRule::from_columns(self.notify_mode.as_deref(), self.notify_value)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::price_history::Entity")]
    PriceHistory,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::price_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PriceHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
