use sea_orm_migration::prelude::*;

use crate::m20250401_000002_create_products_table::Products;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(PriceHistory::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(PriceHistory::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key()
                )
                .col(ColumnDef::new(PriceHistory::ProductId).big_integer().not_null())
                .col(ColumnDef::new(PriceHistory::BasicPrice).big_integer().not_null())
                .col(ColumnDef::new(PriceHistory::ProductPrice).big_integer().not_null())
                .col(ColumnDef::new(PriceHistory::Qty).big_integer().not_null())
                .col(ColumnDef::new(PriceHistory::RecordedAt).timestamp_with_time_zone().not_null())
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_price_history_product_id")
                        .from(PriceHistory::Table, PriceHistory::ProductId)
                        .to(Products::Table, Products::Id)
                        .on_delete(ForeignKeyAction::Cascade)
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_price_history_product_id")
                .table(PriceHistory::Table)
                .col(PriceHistory::ProductId)
                .col(PriceHistory::RecordedAt)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(PriceHistory::Table).to_owned()).await
    }
}

#[derive(Iden)]
enum PriceHistory {
    Table,
    Id,
    ProductId,
    BasicPrice,
    ProductPrice,
    Qty,
    RecordedAt,
}
