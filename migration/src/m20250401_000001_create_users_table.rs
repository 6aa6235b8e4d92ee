use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(Users::Table)
                .if_not_exists()
                // Telegram chat id, assigned externally
                .col(ColumnDef::new(Users::Id).big_integer().not_null().primary_key())
                .col(ColumnDef::new(Users::Plan).string().not_null().default("plan_free"))
                .col(ColumnDef::new(Users::DiscountPercent).integer().not_null().default(0))
                .col(ColumnDef::new(Users::MaxLinks).integer().not_null().default(5))
                .col(ColumnDef::new(Users::Dest).integer().not_null())
                .col(ColumnDef::new(Users::PvzAddress).string())
                .col(ColumnDef::new(Users::SortMode).string().not_null().default("updated"))
                .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                .to_owned()
        ).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await
    }
}

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Plan,
    DiscountPercent,
    MaxLinks,
    Dest,
    PvzAddress,
    SortMode,
    CreatedAt,
}
