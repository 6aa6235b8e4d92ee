pub use sea_orm_migration::prelude::*;

mod m20250401_000001_create_users_table;
mod m20250401_000002_create_products_table;
mod m20250401_000003_create_price_history_table;
mod m20250612_000001_add_notify_columns;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250401_000001_create_users_table::Migration),
            Box::new(m20250401_000002_create_products_table::Migration),
            Box::new(m20250401_000003_create_price_history_table::Migration),
            Box::new(m20250612_000001_add_notify_columns::Migration)
        ]
    }
}
