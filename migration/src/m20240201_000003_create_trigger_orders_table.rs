use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(TriggerOrders::Table)
                .if_not_exists()
                .col(ColumnDef::new(TriggerOrders::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(TriggerOrders::UserId).string().not_null())
                .col(ColumnDef::new(TriggerOrders::ChatId).big_integer().not_null())
                .col(ColumnDef::new(TriggerOrders::Chain).string().not_null())
                .col(ColumnDef::new(TriggerOrders::TokenAddress).string().not_null())
                .col(ColumnDef::new(TriggerOrders::TokenSymbol).string().not_null())
                .col(ColumnDef::new(TriggerOrders::Side).string().not_null())
                .col(ColumnDef::new(TriggerOrders::TriggerType).string().not_null())
                .col(ColumnDef::new(TriggerOrders::TriggerCondition).string().not_null())
                .col(ColumnDef::new(TriggerOrders::TriggerValue).decimal().not_null())
                .col(ColumnDef::new(TriggerOrders::Amount).string().not_null())
                .col(ColumnDef::new(TriggerOrders::AmountType).string().not_null())
                .col(ColumnDef::new(TriggerOrders::SlippageBps).integer().not_null())
                .col(
                    ColumnDef::new(TriggerOrders::Status).string().not_null().default("active")
                )
                .col(ColumnDef::new(TriggerOrders::PriceAtCreation).decimal())
                .col(ColumnDef::new(TriggerOrders::TriggeredAt).timestamp_with_time_zone())
                .col(ColumnDef::new(TriggerOrders::ExecutedAt).timestamp_with_time_zone())
                .col(ColumnDef::new(TriggerOrders::TxHash).string())
                .col(ColumnDef::new(TriggerOrders::ExecutionPrice).decimal())
                .col(ColumnDef::new(TriggerOrders::ErrorMessage).text())
                .col(
                    ColumnDef::new(TriggerOrders::CreatedAt).timestamp_with_time_zone().not_null()
                )
                .col(
                    ColumnDef::new(TriggerOrders::UpdatedAt).timestamp_with_time_zone().not_null()
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_trigger_orders_status")
                .table(TriggerOrders::Table)
                .col(TriggerOrders::Status)
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_trigger_orders_user_id")
                .table(TriggerOrders::Table)
                .col(TriggerOrders::UserId)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(TriggerOrders::Table).to_owned()).await
    }
}

#[derive(Iden)]
enum TriggerOrders {
    Table,
    Id,
    UserId,
    ChatId,
    Chain,
    TokenAddress,
    TokenSymbol,
    Side,
    TriggerType,
    TriggerCondition,
    TriggerValue,
    Amount,
    AmountType,
    SlippageBps,
    Status,
    PriceAtCreation,
    TriggeredAt,
    ExecutedAt,
    TxHash,
    ExecutionPrice,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}
