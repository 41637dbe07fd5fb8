pub use sea_orm_migration::prelude::*;

mod m20240201_000001_create_user_security_tables;
mod m20240201_000002_create_encrypted_wallets_table;
mod m20240201_000003_create_trigger_orders_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240201_000001_create_user_security_tables::Migration),
            Box::new(m20240201_000002_create_encrypted_wallets_table::Migration),
            Box::new(m20240201_000003_create_trigger_orders_table::Migration)
        ]
    }
}
