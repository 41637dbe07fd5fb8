use sea_orm::{ entity::prelude::*, DatabaseConnection, QueryOrder, Set };
use uuid::Uuid;

use crate::enums::{ Chain, EncryptionVersion };
use crate::error::{ AppError, Result };

pub mod entity;
pub use entity::*;

mod security_repository;
pub use security_repository::{ SecurityRepository, WalletSecretUpdate };

mod order_repository;
pub use order_repository::{ NewTriggerOrder, OrderRepository };

/// Stored wallets. Secrets arrive here already encrypted.
pub struct WalletRepository {
    db: DatabaseConnection,
}

impl WalletRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: &str,
        chain: Chain,
        address: String,
        encrypted_secret: String,
        version: EncryptionVersion
    ) -> Result<entity::encrypted_wallet::Model> {
        let now = chrono::Utc::now();
        let wallet = entity::encrypted_wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            chain: Set(chain.to_string()),
            address: Set(address),
            encrypted_secret: Set(encrypted_secret),
            encryption_version: Set(version.as_i32()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let wallet = wallet.insert(&self.db).await?;
        Ok(wallet)
    }

    /// Point an existing wallet row at a new address and ciphertext.
    pub async fn replace(
        &self,
        wallet: entity::encrypted_wallet::Model,
        address: String,
        encrypted_secret: String,
        version: EncryptionVersion
    ) -> Result<entity::encrypted_wallet::Model> {
        let mut active: entity::encrypted_wallet::ActiveModel = wallet.into();
        active.address = Set(address);
        active.encrypted_secret = Set(encrypted_secret);
        active.encryption_version = Set(version.as_i32());
        active.updated_at = Set(chrono::Utc::now());

        let wallet = active.update(&self.db).await?;
        Ok(wallet)
    }

    pub async fn update_secret(
        &self,
        wallet: entity::encrypted_wallet::Model,
        encrypted_secret: String,
        version: EncryptionVersion
    ) -> Result<entity::encrypted_wallet::Model> {
        let mut active: entity::encrypted_wallet::ActiveModel = wallet.into();
        active.encrypted_secret = Set(encrypted_secret);
        active.encryption_version = Set(version.as_i32());
        active.updated_at = Set(chrono::Utc::now());

        let wallet = active.update(&self.db).await?;
        Ok(wallet)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<entity::encrypted_wallet::Model> {
        entity::encrypted_wallet::Entity
            ::find_by_id(id)
            .one(&self.db).await?
            .ok_or(AppError::WalletNotFound)
    }

    pub async fn find_by_user_and_chain(
        &self,
        user_id: &str,
        chain: Chain
    ) -> Result<Option<entity::encrypted_wallet::Model>> {
        let wallet = entity::encrypted_wallet::Entity
            ::find()
            .filter(entity::encrypted_wallet::Column::UserId.eq(user_id))
            .filter(entity::encrypted_wallet::Column::Chain.eq(chain.as_str()))
            .one(&self.db).await?;

        Ok(wallet)
    }

    pub async fn find_by_user(&self, user_id: &str) -> Result<Vec<entity::encrypted_wallet::Model>> {
        let wallets = entity::encrypted_wallet::Entity
            ::find()
            .filter(entity::encrypted_wallet::Column::UserId.eq(user_id))
            .order_by_asc(entity::encrypted_wallet::Column::CreatedAt)
            .all(&self.db).await?;

        Ok(wallets)
    }
}
