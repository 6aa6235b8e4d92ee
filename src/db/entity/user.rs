use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Telegram chat id, assigned externally.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub plan: String, // "plan_free", "plan_basic", "plan_pro"
    pub discount_percent: i32,
    pub max_links: i32,
    /// Delivery destination code; changes the price the marketplace returns.
    pub dest: i32,
    pub pvz_address: Option<String>,
    pub sort_mode: String, // "updated", "savings"
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product::Entity")]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
