use chrono::{ DateTime, Duration, Utc };
use sea_orm::{
    ActiveModelTrait,
    ColumnTrait,
    DatabaseConnection,
    EntityTrait,
    QueryFilter,
    QueryOrder,
    Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::chains;
use crate::db::entity::{
    encrypted_wallet,
    login_attempt,
    security_audit_log,
    user_security,
    withdrawal_whitelist,
};
use crate::enums::{ Chain, EncryptionVersion };
use crate::error::{ AppError, Result };

/// How long login attempts are kept before pruning.
const LOGIN_ATTEMPT_RETENTION_HOURS: i64 = 24;

/// Re-encrypted secret for one wallet, written as part of a credential rotation.
#[derive(Debug, Clone)]
pub struct WalletSecretUpdate {
    pub wallet_id: Uuid,
    pub encrypted_secret: String,
    pub version: EncryptionVersion,
}

/// Password hashes, login attempts, whitelist and audit trail.
pub struct SecurityRepository {
    db: DatabaseConnection,
}

impl SecurityRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_settings(&self, user_id: &str) -> Result<Option<user_security::Model>> {
        let settings = user_security::Entity
            ::find()
            .filter(user_security::Column::UserId.eq(user_id))
            .one(&self.db).await?;

        Ok(settings)
    }

    pub async fn create_settings(
        &self,
        user_id: &str,
        password_hash: String
    ) -> Result<user_security::Model> {
        let now = Utc::now();
        let settings = user_security::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            password_hash: Set(password_hash),
            anti_phishing_code: Set(None),
            transfer_limits: Set(None),
            two_factor_enabled: Set(false),
            two_factor_secret: Set(None),
            last_password_change: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let settings = settings.insert(&self.db).await?;
        Ok(settings)
    }

    pub async fn update_transfer_limits(
        &self,
        settings: user_security::Model,
        limits: serde_json::Value
    ) -> Result<user_security::Model> {
        let mut active: user_security::ActiveModel = settings.into();
        active.transfer_limits = Set(Some(limits));
        active.updated_at = Set(Utc::now());

        let settings = active.update(&self.db).await?;
        Ok(settings)
    }

    pub async fn update_anti_phishing_code(
        &self,
        settings: user_security::Model,
        code: Option<String>
    ) -> Result<user_security::Model> {
        let mut active: user_security::ActiveModel = settings.into();
        active.anti_phishing_code = Set(code);
        active.updated_at = Set(Utc::now());

        let settings = active.update(&self.db).await?;
        Ok(settings)
    }

    /// Store a new password hash together with every wallet re-encrypted
    /// under it, in one transaction. Either all rows move to the new
    /// password or none do.
    pub async fn rotate_credentials(
        &self,
        settings: user_security::Model,
        password_hash: String,
        wallet_updates: Vec<WalletSecretUpdate>
    ) -> Result<()> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        for update in wallet_updates {
            let wallet = encrypted_wallet::Entity
                ::find_by_id(update.wallet_id)
                .one(&txn).await?
                .ok_or(AppError::WalletNotFound)?;

            let mut active: encrypted_wallet::ActiveModel = wallet.into();
            active.encrypted_secret = Set(update.encrypted_secret);
            active.encryption_version = Set(update.version.as_i32());
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        let mut active: user_security::ActiveModel = settings.into();
        active.password_hash = Set(password_hash);
        active.last_password_change = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    /// Append a login attempt and drop attempts past the retention window.
    pub async fn record_login_attempt(&self, user_id: &str, success: bool) -> Result<()> {
        let now = Utc::now();

        let attempt = login_attempt::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            success: Set(success),
            attempted_at: Set(now),
        };
        attempt.insert(&self.db).await?;

        login_attempt::Entity
            ::delete_many()
            .filter(
                login_attempt::Column::AttemptedAt.lt(
                    now - Duration::hours(LOGIN_ATTEMPT_RETENTION_HOURS)
                )
            )
            .exec(&self.db).await?;

        Ok(())
    }

    /// Attempts since `since`, newest first.
    pub async fn login_attempts_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>
    ) -> Result<Vec<login_attempt::Model>> {
        let attempts = login_attempt::Entity
            ::find()
            .filter(login_attempt::Column::UserId.eq(user_id))
            .filter(login_attempt::Column::AttemptedAt.gte(since))
            .order_by_desc(login_attempt::Column::AttemptedAt)
            .all(&self.db).await?;

        Ok(attempts)
    }

    pub async fn add_whitelist_entry(
        &self,
        user_id: &str,
        chain: Chain,
        address: &str,
        label: Option<String>
    ) -> Result<withdrawal_whitelist::Model> {
        let address = chains::normalize_address(chain, address);
        if let Some(existing) = self.find_whitelist_entry(user_id, chain, &address).await? {
            return Ok(existing);
        }

        let entry = withdrawal_whitelist::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            chain: Set(chain.to_string()),
            address: Set(address),
            label: Set(label),
            created_at: Set(Utc::now()),
        };

        let entry = entry.insert(&self.db).await?;
        Ok(entry)
    }

    pub async fn remove_whitelist_entry(
        &self,
        user_id: &str,
        chain: Chain,
        address: &str
    ) -> Result<bool> {
        let result = withdrawal_whitelist::Entity
            ::delete_many()
            .filter(withdrawal_whitelist::Column::UserId.eq(user_id))
            .filter(withdrawal_whitelist::Column::Chain.eq(chain.as_str()))
            .filter(withdrawal_whitelist::Column::Address.eq(chains::normalize_address(chain, address)))
            .exec(&self.db).await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn find_whitelist_entry(
        &self,
        user_id: &str,
        chain: Chain,
        address: &str
    ) -> Result<Option<withdrawal_whitelist::Model>> {
        let entry = withdrawal_whitelist::Entity
            ::find()
            .filter(withdrawal_whitelist::Column::UserId.eq(user_id))
            .filter(withdrawal_whitelist::Column::Chain.eq(chain.as_str()))
            .filter(withdrawal_whitelist::Column::Address.eq(chains::normalize_address(chain, address)))
            .one(&self.db).await?;

        Ok(entry)
    }

    pub async fn list_whitelist(&self, user_id: &str) -> Result<Vec<withdrawal_whitelist::Model>> {
        let entries = withdrawal_whitelist::Entity
            ::find()
            .filter(withdrawal_whitelist::Column::UserId.eq(user_id))
            .order_by_asc(withdrawal_whitelist::Column::CreatedAt)
            .all(&self.db).await?;

        Ok(entries)
    }

    pub async fn log_event(&self, user_id: &str, action: &str, details: Option<String>) -> Result<()> {
        let entry = security_audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            action: Set(action.to_string()),
            details: Set(details),
            created_at: Set(Utc::now()),
        };

        entry.insert(&self.db).await?;
        Ok(())
    }

    pub async fn audit_log(&self, user_id: &str) -> Result<Vec<security_audit_log::Model>> {
        let entries = security_audit_log::Entity
            ::find()
            .filter(security_audit_log::Column::UserId.eq(user_id))
            .order_by_asc(security_audit_log::Column::CreatedAt)
            .all(&self.db).await?;

        Ok(entries)
    }
}
