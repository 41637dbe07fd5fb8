use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(EncryptedWallets::Table)
                .if_not_exists()
                .col(ColumnDef::new(EncryptedWallets::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(EncryptedWallets::UserId).string().not_null())
                .col(ColumnDef::new(EncryptedWallets::Chain).string().not_null())
                .col(ColumnDef::new(EncryptedWallets::Address).string().not_null())
                .col(ColumnDef::new(EncryptedWallets::EncryptedSecret).text().not_null())
                .col(
                    ColumnDef::new(EncryptedWallets::EncryptionVersion)
                        .integer()
                        .not_null()
                        .default(1)
                )
                .col(
                    ColumnDef::new(EncryptedWallets::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                )
                .col(
                    ColumnDef::new(EncryptedWallets::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                )
                .to_owned()
        ).await?;

        // One wallet per user and chain
        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_encrypted_wallets_user_chain")
                .table(EncryptedWallets::Table)
                .col(EncryptedWallets::UserId)
                .col(EncryptedWallets::Chain)
                .unique()
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(EncryptedWallets::Table).to_owned()).await
    }
}

#[derive(Iden)]
enum EncryptedWallets {
    Table,
    Id,
    UserId,
    Chain,
    Address,
    EncryptedSecret,
    EncryptionVersion,
    CreatedAt,
    UpdatedAt,
}
