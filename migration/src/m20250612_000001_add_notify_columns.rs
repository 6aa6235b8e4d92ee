use sea_orm_migration::prelude::*;

use crate::m20250401_000002_create_products_table::Products;

#[derive(DeriveMigrationName)]
pub struct Migration;

// Notification rules shipped after the initial release; NULL mode means
// "notify on any change".
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.alter_table(
            Table::alter()
                .table(Products::Table)
                .add_column(ColumnDef::new(NotifyColumns::NotifyMode).string())
                .to_owned()
        ).await?;

        manager.alter_table(
            Table::alter()
                .table(Products::Table)
                .add_column(ColumnDef::new(NotifyColumns::NotifyValue).big_integer())
                .to_owned()
        ).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.alter_table(
            Table::alter()
                .table(Products::Table)
                .drop_column(NotifyColumns::NotifyValue)
                .to_owned()
        ).await?;

        manager.alter_table(
            Table::alter()
                .table(Products::Table)
                .drop_column(NotifyColumns::NotifyMode)
                .to_owned()
        ).await
    }
}

#[derive(Iden)]
enum NotifyColumns {
    NotifyMode,
    NotifyValue,
}
