use sea_orm_migration::prelude::*;

use crate::m20250401_000001_create_users_table::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(Products::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(Products::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key()
                )
                .col(ColumnDef::new(Products::UserId).big_integer().not_null())
                .col(ColumnDef::new(Products::UrlProduct).string().not_null())
                .col(ColumnDef::new(Products::NmId).big_integer().not_null())
                .col(ColumnDef::new(Products::NameProduct).string().not_null())
                .col(ColumnDef::new(Products::CustomName).string())
                .col(ColumnDef::new(Products::SelectedSize).string())
                .col(ColumnDef::new(Products::LastBasicPrice).big_integer())
                .col(ColumnDef::new(Products::LastProductPrice).big_integer())
                .col(ColumnDef::new(Products::LastQty).big_integer())
                .col(ColumnDef::new(Products::OutOfStock).boolean().not_null().default(false))
                .col(ColumnDef::new(Products::FailCount).integer().not_null().default(0))
                .col(ColumnDef::new(Products::CreatedAt).timestamp_with_time_zone().not_null())
                .col(ColumnDef::new(Products::UpdatedAt).timestamp_with_time_zone().not_null())
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_products_user_id")
                        .from(Products::Table, Products::UserId)
                        .to(Users::Table, Users::Id)
                        .on_delete(ForeignKeyAction::Cascade)
                )
                .to_owned()
        ).await?;

        // A user cannot track the same article twice
        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_products_user_nm_unique")
                .table(Products::Table)
                .col(Products::UserId)
                .col(Products::NmId)
                .unique()
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_products_user_id")
                .table(Products::Table)
                .col(Products::UserId)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Products::Table).to_owned()).await
    }
}

#[derive(Iden)]
pub enum Products {
    Table,
    Id,
    UserId,
    UrlProduct,
    NmId,
    NameProduct,
    CustomName,
    SelectedSize,
    LastBasicPrice,
    LastProductPrice,
    LastQty,
    OutOfStock,
    FailCount,
    CreatedAt,
    UpdatedAt,
}
