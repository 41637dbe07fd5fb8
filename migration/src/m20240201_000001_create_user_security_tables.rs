use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(UserSecurity::Table)
                .if_not_exists()
                .col(ColumnDef::new(UserSecurity::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(UserSecurity::UserId).string().not_null().unique_key())
                .col(ColumnDef::new(UserSecurity::PasswordHash).string().not_null())
                .col(ColumnDef::new(UserSecurity::AntiPhishingCode).string())
                .col(ColumnDef::new(UserSecurity::TransferLimits).json())
                .col(
                    ColumnDef::new(UserSecurity::TwoFactorEnabled)
                        .boolean()
                        .not_null()
                        .default(false)
                )
                .col(ColumnDef::new(UserSecurity::TwoFactorSecret).string())
                .col(ColumnDef::new(UserSecurity::LastPasswordChange).timestamp_with_time_zone())
                .col(ColumnDef::new(UserSecurity::CreatedAt).timestamp_with_time_zone().not_null())
                .col(ColumnDef::new(UserSecurity::UpdatedAt).timestamp_with_time_zone().not_null())
                .to_owned()
        ).await?;

        manager.create_table(
            Table::create()
                .table(LoginAttempts::Table)
                .if_not_exists()
                .col(ColumnDef::new(LoginAttempts::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(LoginAttempts::UserId).string().not_null())
                .col(ColumnDef::new(LoginAttempts::Success).boolean().not_null())
                .col(
                    ColumnDef::new(LoginAttempts::AttemptedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_login_attempts_user_time")
                .table(LoginAttempts::Table)
                .col(LoginAttempts::UserId)
                .col(LoginAttempts::AttemptedAt)
                .to_owned()
        ).await?;

        manager.create_table(
            Table::create()
                .table(WithdrawalWhitelist::Table)
                .if_not_exists()
                .col(ColumnDef::new(WithdrawalWhitelist::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(WithdrawalWhitelist::UserId).string().not_null())
                .col(ColumnDef::new(WithdrawalWhitelist::Chain).string().not_null())
                .col(ColumnDef::new(WithdrawalWhitelist::Address).string().not_null())
                .col(ColumnDef::new(WithdrawalWhitelist::Label).string())
                .col(
                    ColumnDef::new(WithdrawalWhitelist::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_withdrawal_whitelist_entry")
                .table(WithdrawalWhitelist::Table)
                .col(WithdrawalWhitelist::UserId)
                .col(WithdrawalWhitelist::Chain)
                .col(WithdrawalWhitelist::Address)
                .unique()
                .to_owned()
        ).await?;

        manager.create_table(
            Table::create()
                .table(SecurityAuditLog::Table)
                .if_not_exists()
                .col(ColumnDef::new(SecurityAuditLog::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(SecurityAuditLog::UserId).string().not_null())
                .col(ColumnDef::new(SecurityAuditLog::Action).string().not_null())
                .col(ColumnDef::new(SecurityAuditLog::Details).string())
                .col(
                    ColumnDef::new(SecurityAuditLog::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_security_audit_log_user_id")
                .table(SecurityAuditLog::Table)
                .col(SecurityAuditLog::UserId)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(SecurityAuditLog::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(WithdrawalWhitelist::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(LoginAttempts::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(UserSecurity::Table).to_owned()).await
    }
}

#[derive(Iden)]
enum UserSecurity {
    Table,
    Id,
    UserId,
    PasswordHash,
    AntiPhishingCode,
    TransferLimits,
    TwoFactorEnabled,
    TwoFactorSecret,
    LastPasswordChange,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum LoginAttempts {
    Table,
    Id,
    UserId,
    Success,
    AttemptedAt,
}

#[derive(Iden)]
enum WithdrawalWhitelist {
    Table,
    Id,
    UserId,
    Chain,
    Address,
    Label,
    CreatedAt,
}

#[derive(Iden)]
enum SecurityAuditLog {
    Table,
    Id,
    UserId,
    Action,
    Details,
    CreatedAt,
}
