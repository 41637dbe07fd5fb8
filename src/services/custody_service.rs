use std::sync::Arc;

use chrono::{ Duration, Utc };
use serde::Serialize;
use tracing::{ info, warn };
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::chains;
use crate::crypto::{ encrypt_with_password, hash_password, verify_password, EncryptedBlob, LegacyCipher };
use crate::db::entity::{ encrypted_wallet, user_security, withdrawal_whitelist };
use crate::db::{ SecurityRepository, WalletRepository, WalletSecretUpdate };
use crate::enums::{ Chain, EncryptionVersion };
use crate::error::{ AppError, Result };
use crate::services::session_store::{ SessionInfo, SessionStore };

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_FAILED_ATTEMPTS: usize = 5;
pub const LOCKOUT_WINDOW_MINUTES: i64 = 15;
const MAX_ANTI_PHISHING_CODE_LENGTH: usize = 32;

/// Why a stored wallet could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletOpenError {
    UnsupportedChain,
    MalformedCiphertext,
    VersionMismatch,
    DecryptionFailed,
    AddressMismatch,
}

impl WalletOpenError {
    pub fn describe(&self) -> &'static str {
        match self {
            WalletOpenError::UnsupportedChain => "unsupported chain",
            WalletOpenError::MalformedCiphertext => "stored ciphertext is malformed",
            WalletOpenError::VersionMismatch => "ciphertext format does not match its version",
            WalletOpenError::DecryptionFailed => "decryption failed",
            WalletOpenError::AddressMismatch => "decrypted key does not match the wallet address",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletOpenResult {
    pub wallet_id: Uuid,
    pub chain: String,
    pub address: String,
    pub error: Option<WalletOpenError>,
}

/// Outcome of an unlock: the session plus one entry per stored wallet.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockReport {
    pub session: SessionInfo,
    pub wallets: Vec<WalletOpenResult>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub migrated: Vec<WalletOpenResult>,
    pub failed: Vec<WalletOpenResult>,
}

/// Public fields of a stored wallet.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub id: Uuid,
    pub chain: String,
    pub address: String,
    pub encryption_version: i32,
}

impl From<encrypted_wallet::Model> for WalletSummary {
    fn from(wallet: encrypted_wallet::Model) -> Self {
        Self {
            id: wallet.id,
            chain: wallet.chain,
            address: wallet.address,
            encryption_version: wallet.encryption_version,
        }
    }
}

/// Decrypt one stored wallet and check the key still controls its address.
fn open_wallet(
    legacy: &LegacyCipher,
    wallet: &encrypted_wallet::Model,
    user_id: &str,
    password: &str
) -> std::result::Result<(Chain, Zeroizing<String>), WalletOpenError> {
    let chain = wallet.chain.parse::<Chain>().map_err(|_| WalletOpenError::UnsupportedChain)?;

    let blob = EncryptedBlob::parse(&wallet.encrypted_secret).ok_or(
        WalletOpenError::MalformedCiphertext
    )?;

    if EncryptionVersion::from_i32(wallet.encryption_version) != Some(blob.version()) {
        return Err(WalletOpenError::VersionMismatch);
    }

    let secret = blob
        .decrypt(password, user_id, legacy)
        .ok_or(WalletOpenError::DecryptionFailed)?;

    // A wrong legacy key yields garbage rather than an error.
    let derived = chains::derive_address(chain, &secret).map_err(|_| WalletOpenError::DecryptionFailed)?;
    if !chains::addresses_match(chain, &derived, &wallet.address) {
        return Err(WalletOpenError::AddressMismatch);
    }

    Ok((chain, secret))
}

async fn run_blocking<F, T>(f: F) -> Result<T> where F: FnOnce() -> T + Send + 'static, T: Send + 'static {
    tokio::task::spawn_blocking(f).await.map_err(|e| AppError::Internal(e.to_string()))
}

fn validate_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::PasswordTooShort { min_length: MIN_PASSWORD_LENGTH });
    }
    Ok(())
}

/// Password setup, unlock/lock, re-encryption and key hand-out.
///
/// This is the only component that ever sees a decrypted wallet secret;
/// everything else obtains keys through [`CustodyService::get_private_key`].
pub struct CustodyService {
    wallets: Arc<WalletRepository>,
    security: Arc<SecurityRepository>,
    sessions: Arc<SessionStore>,
    legacy: Arc<LegacyCipher>,
}

impl CustodyService {
    pub fn new(
        wallets: Arc<WalletRepository>,
        security: Arc<SecurityRepository>,
        sessions: Arc<SessionStore>,
        legacy: Arc<LegacyCipher>
    ) -> Self {
        Self {
            wallets,
            security,
            sessions,
            legacy,
        }
    }

    pub async fn needs_setup(&self, user_id: &str) -> Result<bool> {
        Ok(self.security.find_settings(user_id).await?.is_none())
    }

    /// First-time password. Does not unlock.
    pub async fn setup_password(&self, user_id: &str, password: &str) -> Result<()> {
        validate_new_password(password)?;

        if self.security.find_settings(user_id).await?.is_some() {
            return Err(AppError::PasswordAlreadySet);
        }

        let hash = {
            let (password, user_id) = (Zeroizing::new(password.to_string()), user_id.to_string());
            run_blocking(move || hash_password(&password, &user_id)).await?
        };

        self.security.create_settings(user_id, hash).await?;
        self.security.log_event(user_id, "password_setup", None).await?;

        info!(user_id, "Password set up");
        Ok(())
    }

    /// Verify a password, enforcing lockout and recording the attempt.
    async fn authenticate(&self, user_id: &str, password: &str) -> Result<user_security::Model> {
        let failures = self.ensure_not_locked_out(user_id).await?;

        let settings = self.security.find_settings(user_id).await?.ok_or(AppError::PasswordNotSet)?;

        let valid = {
            let password = Zeroizing::new(password.to_string());
            let (user, stored) = (user_id.to_string(), settings.password_hash.clone());
            run_blocking(move || verify_password(&password, &user, &stored)).await?
        };

        if !valid {
            self.security.record_login_attempt(user_id, false).await?;
            self.security.log_event(user_id, "unlock_failed", None).await?;

            let attempts_remaining = MAX_FAILED_ATTEMPTS.saturating_sub(failures + 1) as u32;
            warn!(user_id, attempts_remaining, "Incorrect password");
            return Err(AppError::IncorrectPassword { attempts_remaining });
        }

        self.security.record_login_attempt(user_id, true).await?;
        Ok(settings)
    }

    /// Failed attempts since the last success inside the lockout window.
    async fn ensure_not_locked_out(&self, user_id: &str) -> Result<usize> {
        let now = Utc::now();
        let window = Duration::minutes(LOCKOUT_WINDOW_MINUTES);
        let attempts = self.security.login_attempts_since(user_id, now - window).await?;

        let failures: Vec<_> = attempts
            .iter()
            .take_while(|a| !a.success)
            .collect();

        if failures.len() >= MAX_FAILED_ATTEMPTS {
            let locked_until = failures[0].attempted_at + window;
            if locked_until > now {
                let retry_after_secs = (locked_until - now).num_seconds().max(1);
                return Err(AppError::LockedOut { retry_after_secs });
            }
        }

        Ok(failures.len())
    }

    pub async fn unlock(&self, user_id: &str, password: &str) -> Result<UnlockReport> {
        self.authenticate(user_id, password).await?;

        let wallets = self.wallets.find_by_user(user_id).await?;
        let outcomes = {
            let legacy = self.legacy.clone();
            let password = Zeroizing::new(password.to_string());
            let user = user_id.to_string();
            run_blocking(move || {
                wallets
                    .into_iter()
                    .map(|w| {
                        let opened = open_wallet(&legacy, &w, &user, &password);
                        (w, opened)
                    })
                    .collect::<Vec<_>>()
            }).await?
        };

        let mut secrets = Vec::new();
        let mut results = Vec::new();
        for (wallet, opened) in outcomes {
            let error = match opened {
                Ok((chain, secret)) => {
                    secrets.push((chain, secret));
                    None
                }
                Err(e) => {
                    warn!(user_id, wallet_id = %wallet.id, chain = %wallet.chain, reason = e.describe(), "Wallet skipped during unlock");
                    Some(e)
                }
            };

            results.push(WalletOpenResult {
                wallet_id: wallet.id,
                chain: wallet.chain,
                address: wallet.address,
                error,
            });
        }

        let session = self.sessions.open(user_id, secrets).await?;
        self.security.log_event(user_id, "unlock", None).await?;

        info!(user_id, wallets = session.chains.len(), expires_at = %session.expires_at, "Wallet unlocked");
        Ok(UnlockReport { session, wallets: results })
    }

    /// End the session now. Calling it again is harmless.
    pub async fn lock(&self, user_id: &str) -> Result<()> {
        if self.sessions.destroy(user_id).await {
            self.security.log_event(user_id, "lock", None).await?;
            info!(user_id, "Wallet locked");
        }
        Ok(())
    }

    /// Re-encrypt every wallet under a new password and force a fresh unlock.
    ///
    /// Nothing is written unless every wallet decrypts with the old password.
    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str
    ) -> Result<()> {
        validate_new_password(new_password)?;
        let settings = self.authenticate(user_id, old_password).await?;

        let wallets = self.wallets.find_by_user(user_id).await?;
        let (new_hash, updates) = {
            let legacy = self.legacy.clone();
            let old = Zeroizing::new(old_password.to_string());
            let new = Zeroizing::new(new_password.to_string());
            let user = user_id.to_string();

            run_blocking(move || -> Result<(String, Vec<WalletSecretUpdate>)> {
                let mut updates = Vec::with_capacity(wallets.len());
                for wallet in &wallets {
                    let (_, secret) = open_wallet(&legacy, wallet, &user, &old).map_err(|e|
                        AppError::Encryption(
                            format!("Cannot re-encrypt {} wallet: {}", wallet.chain, e.describe())
                        )
                    )?;

                    updates.push(WalletSecretUpdate {
                        wallet_id: wallet.id,
                        encrypted_secret: encrypt_with_password(&secret, &new, &user)?,
                        version: EncryptionVersion::Password,
                    });
                }
                Ok((hash_password(&new, &user), updates))
            }).await??
        };

        let rotated = updates.len();
        self.security.rotate_credentials(settings, new_hash, updates).await?;
        self.sessions.destroy(user_id).await;
        self.security.log_event(user_id, "password_changed", Some(format!("{} wallets re-encrypted", rotated))).await?;

        info!(user_id, rotated, "Password changed");
        Ok(())
    }

    /// Store a wallet secret encrypted under the user's password.
    ///
    /// Replaces an existing wallet on the same chain only once the new
    /// ciphertext has been produced.
    pub async fn import_wallet(
        &self,
        user_id: &str,
        chain: Chain,
        secret: &str,
        password: &str
    ) -> Result<WalletSummary> {
        self.authenticate(user_id, password).await?;

        let secret = Zeroizing::new(secret.trim().to_string());
        let address = chains::derive_address(chain, &secret)?;

        let encrypted = {
            let (secret, password) = (secret.clone(), Zeroizing::new(password.to_string()));
            let user = user_id.to_string();
            run_blocking(move || encrypt_with_password(&secret, &password, &user)).await??
        };

        let wallet = match self.wallets.find_by_user_and_chain(user_id, chain).await? {
            Some(existing) => {
                self.wallets.replace(existing, address, encrypted, EncryptionVersion::Password).await?
            }
            None => {
                self.wallets.create(user_id, chain, address, encrypted, EncryptionVersion::Password).await?
            }
        };

        self.sessions.put_secret(user_id, chain, &secret).await?;
        self.security.log_event(user_id, "wallet_imported", Some(format!("{} {}", chain, wallet.address))).await?;

        info!(user_id, chain = %chain, address = %wallet.address, "Wallet imported");
        Ok(wallet.into())
    }

    /// Move one legacy wallet onto the user's password.
    pub async fn migrate_wallet(
        &self,
        user_id: &str,
        wallet_id: Uuid,
        password: &str
    ) -> Result<WalletSummary> {
        let wallet = self.wallets.find_by_id(wallet_id).await?;
        if wallet.user_id != user_id {
            return Err(AppError::WalletNotFound);
        }

        if wallet.encryption_version >= EncryptionVersion::Password.as_i32() {
            return Err(AppError::InvalidInput("Wallet already uses password encryption".to_string()));
        }

        self.authenticate(user_id, password).await?;

        match self.migrate_one(user_id, wallet, password).await? {
            Ok(migrated) => Ok(migrated),
            Err(result) => {
                let reason = result.error.map(|e| e.describe()).unwrap_or("unknown error");
                Err(AppError::Encryption(format!("Cannot migrate {} wallet: {}", result.chain, reason)))
            }
        }
    }

    /// Migrate every legacy wallet the user owns.
    pub async fn migrate_all_wallets(&self, user_id: &str, password: &str) -> Result<MigrationReport> {
        self.authenticate(user_id, password).await?;

        let mut report = MigrationReport::default();
        for wallet in self.wallets.find_by_user(user_id).await? {
            if wallet.encryption_version >= EncryptionVersion::Password.as_i32() {
                continue;
            }

            match self.migrate_one(user_id, wallet, password).await? {
                Ok(summary) =>
                    report.migrated.push(WalletOpenResult {
                        wallet_id: summary.id,
                        chain: summary.chain,
                        address: summary.address,
                        error: None,
                    }),
                Err(failed) => report.failed.push(failed),
            }
        }

        info!(user_id, migrated = report.migrated.len(), failed = report.failed.len(), "Legacy migration finished");
        Ok(report)
    }

    async fn migrate_one(
        &self,
        user_id: &str,
        wallet: encrypted_wallet::Model,
        password: &str
    ) -> Result<std::result::Result<WalletSummary, WalletOpenResult>> {
        let (wallet, outcome) = {
            let legacy = self.legacy.clone();
            let password = Zeroizing::new(password.to_string());
            let user = user_id.to_string();
            run_blocking(move || {
                let outcome = match EncryptedBlob::parse(&wallet.encrypted_secret) {
                    Some(EncryptedBlob::Legacy { .. }) =>
                        open_wallet(&legacy, &wallet, &user, &password).map(|(_, secret)| {
                            encrypt_with_password(&secret, &password, &user)
                        }),
                    Some(EncryptedBlob::Password { .. }) => Err(WalletOpenError::VersionMismatch),
                    None => Err(WalletOpenError::MalformedCiphertext),
                };
                (wallet, outcome)
            }).await?
        };

        let encrypted = match outcome {
            Ok(encrypted) => encrypted?,
            Err(error) => {
                warn!(user_id, wallet_id = %wallet.id, reason = error.describe(), "Legacy wallet not migrated");
                return Ok(
                    Err(WalletOpenResult {
                        wallet_id: wallet.id,
                        chain: wallet.chain,
                        address: wallet.address,
                        error: Some(error),
                    })
                );
            }
        };

        let wallet = self.wallets.update_secret(wallet, encrypted, EncryptionVersion::Password).await?;
        self.security.log_event(user_id, "wallet_migrated", Some(format!("{} {}", wallet.chain, wallet.address))).await?;

        info!(user_id, wallet_id = %wallet.id, chain = %wallet.chain, "Legacy wallet migrated");
        Ok(Ok(wallet.into()))
    }

    /// Usable secret for a chain, only while a live session holds one.
    pub async fn get_private_key(&self, user_id: &str, chain: Chain) -> Option<Zeroizing<String>> {
        self.sessions.get_secret(user_id, chain).await
    }

    pub async fn is_unlocked(&self, user_id: &str) -> bool {
        self.sessions.is_active(user_id).await
    }

    pub async fn session_info(&self, user_id: &str) -> Option<SessionInfo> {
        self.sessions.info(user_id).await
    }

    pub async fn list_wallets(&self, user_id: &str) -> Result<Vec<WalletSummary>> {
        let wallets = self.wallets.find_by_user(user_id).await?;
        Ok(wallets.into_iter().map(WalletSummary::from).collect())
    }

    /// Whether a withdrawal needs the password typed again, even if unlocked.
    pub async fn requires_password_for_withdraw(
        &self,
        user_id: &str,
        chain: Chain,
        address: &str,
        amount: f64
    ) -> Result<bool> {
        if !self.sessions.is_active(user_id).await {
            return Ok(true);
        }

        if self.security.find_whitelist_entry(user_id, chain, address).await?.is_some() {
            return Ok(false);
        }

        let limit = self.security
            .find_settings(user_id).await?
            .and_then(|s| s.transfer_limits)
            .and_then(|limits| limits.get(chain.as_str()).and_then(|v| v.as_f64()));

        Ok(limit.is_some_and(|limit| amount > limit))
    }

    /// Per-chain ceiling above which withdrawals need the password again.
    pub async fn set_transfer_limit(
        &self,
        user_id: &str,
        password: &str,
        chain: Chain,
        limit: f64
    ) -> Result<()> {
        if !limit.is_finite() || limit < 0.0 {
            return Err(AppError::InvalidInput("Transfer limit must be a non-negative number".to_string()));
        }

        let settings = self.authenticate(user_id, password).await?;

        let mut limits = match settings.transfer_limits.clone() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        limits.insert(chain.as_str().to_string(), serde_json::json!(limit));

        self.security.update_transfer_limits(settings, serde_json::Value::Object(limits)).await?;
        self.security.log_event(user_id, "transfer_limit_set", Some(format!("{} {}", chain, limit))).await?;
        Ok(())
    }

    pub async fn set_anti_phishing_code(
        &self,
        user_id: &str,
        password: &str,
        code: Option<String>
    ) -> Result<()> {
        let code = code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        if code.as_ref().is_some_and(|c| c.chars().count() > MAX_ANTI_PHISHING_CODE_LENGTH) {
            return Err(
                AppError::InvalidInput(
                    format!("Anti-phishing code must be at most {} characters", MAX_ANTI_PHISHING_CODE_LENGTH)
                )
            );
        }

        let settings = self.authenticate(user_id, password).await?;
        self.security.update_anti_phishing_code(settings, code).await?;
        self.security.log_event(user_id, "anti_phishing_code_set", None).await?;
        Ok(())
    }

    /// Whitelisted addresses skip the withdrawal password check, so changes
    /// to the list need the password too.
    pub async fn add_whitelist_address(
        &self,
        user_id: &str,
        password: &str,
        chain: Chain,
        address: &str,
        label: Option<String>
    ) -> Result<withdrawal_whitelist::Model> {
        let address = address.trim();
        if !chains::validate_address(chain, address) {
            return Err(AppError::InvalidAddress);
        }

        self.authenticate(user_id, password).await?;

        let entry = self.security.add_whitelist_entry(user_id, chain, address, label).await?;
        self.security.log_event(user_id, "whitelist_added", Some(format!("{} {}", chain, address))).await?;
        Ok(entry)
    }

    pub async fn remove_whitelist_address(
        &self,
        user_id: &str,
        password: &str,
        chain: Chain,
        address: &str
    ) -> Result<bool> {
        self.authenticate(user_id, password).await?;

        let removed = self.security.remove_whitelist_entry(user_id, chain, address.trim()).await?;
        if removed {
            self.security.log_event(user_id, "whitelist_removed", Some(format!("{} {}", chain, address.trim()))).await?;
        }
        Ok(removed)
    }

    pub async fn list_whitelist(&self, user_id: &str) -> Result<Vec<withdrawal_whitelist::Model>> {
        self.security.list_whitelist(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::legacy_encrypt;
    use crate::test_support::setup_db;
    use solana_keypair::Keypair;
    use solana_sdk::signer::{ SeedDerivable, Signer };

    const LEGACY_KEY: [u8; 32] = [3u8; 32];
    const EVM_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const EVM_ADDRESS: &str = "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23";

    struct Fixture {
        custody: CustodyService,
        wallets: Arc<WalletRepository>,
        security: Arc<SecurityRepository>,
    }

    async fn fixture() -> Fixture {
        let db = setup_db().await;
        let wallets = Arc::new(WalletRepository::new(db.clone()));
        let security = Arc::new(SecurityRepository::new(db));
        let custody = CustodyService::new(
            wallets.clone(),
            security.clone(),
            Arc::new(SessionStore::new(Duration::minutes(30))),
            Arc::new(LegacyCipher::new(&LEGACY_KEY).unwrap())
        );
        Fixture { custody, wallets, security }
    }

    fn solana_secret(seed: u8) -> (String, String) {
        let keypair = Keypair::from_seed(&[seed; 32]).unwrap();
        (bs58::encode(keypair.to_bytes()).into_string(), keypair.pubkey().to_string())
    }

    #[tokio::test]
    async fn test_setup_password_rules() {
        let f = fixture().await;

        assert!(f.custody.needs_setup("1").await.unwrap());
        assert!(matches!(
            f.custody.setup_password("1", "abc").await,
            Err(AppError::PasswordTooShort { min_length: 6 })
        ));
        assert!(f.custody.needs_setup("1").await.unwrap());

        f.custody.setup_password("1", "abcdef").await.unwrap();
        assert!(!f.custody.needs_setup("1").await.unwrap());
        assert!(!f.custody.is_unlocked("1").await);

        assert!(matches!(f.custody.setup_password("1", "abcdefgh").await, Err(AppError::PasswordAlreadySet)));
    }

    #[tokio::test]
    async fn test_unlock_without_setup_fails() {
        let f = fixture().await;
        assert!(matches!(f.custody.unlock("1", "abcdef").await, Err(AppError::PasswordNotSet)));
    }

    #[tokio::test]
    async fn test_wrong_passwords_count_down_then_success_resets() {
        let f = fixture().await;
        let (secret, address) = solana_secret(1);

        f.custody.setup_password("1", "abcdef").await.unwrap();
        f.custody.unlock("1", "abcdef").await.unwrap();
        f.custody.import_wallet("1", Chain::Solana, &secret, "abcdef").await.unwrap();
        f.custody.lock("1").await.unwrap();

        for expected in [4, 3, 2] {
            match f.custody.unlock("1", "wrong1").await {
                Err(AppError::IncorrectPassword { attempts_remaining }) => {
                    assert_eq!(attempts_remaining, expected)
                }
                other => panic!("unexpected result: {:?}", other.map(|r| r.wallets.len())),
            }
        }

        let report = f.custody.unlock("1", "abcdef").await.unwrap();
        assert_eq!(report.wallets.len(), 1);
        assert_eq!(report.wallets[0].address, address);
        assert!(report.wallets[0].error.is_none());
        assert_eq!(f.custody.get_private_key("1", Chain::Solana).await.unwrap().as_str(), secret);

        // The success reset the counter: a fresh failure starts at 4 again.
        assert!(matches!(
            f.custody.unlock("1", "wrong1").await,
            Err(AppError::IncorrectPassword { attempts_remaining: 4 })
        ));
    }

    #[tokio::test]
    async fn test_lockout_rejects_correct_password() {
        let f = fixture().await;
        f.custody.setup_password("1", "abcdef").await.unwrap();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            assert!(matches!(
                f.custody.unlock("1", "wrong1").await,
                Err(AppError::IncorrectPassword { .. })
            ));
        }

        match f.custody.unlock("1", "abcdef").await {
            Err(AppError::LockedOut { retry_after_secs }) => {
                assert!(retry_after_secs > 0 && retry_after_secs <= LOCKOUT_WINDOW_MINUTES * 60)
            }
            other => panic!("expected lockout, got {:?}", other.is_ok()),
        }
        assert!(!f.custody.is_unlocked("1").await);
    }

    #[tokio::test]
    async fn test_lock_is_idempotent() {
        let f = fixture().await;
        f.custody.setup_password("1", "abcdef").await.unwrap();
        f.custody.unlock("1", "abcdef").await.unwrap();

        f.custody.lock("1").await.unwrap();
        f.custody.lock("1").await.unwrap();

        assert!(!f.custody.is_unlocked("1").await);
        let locks = f.security
            .audit_log("1").await
            .unwrap()
            .into_iter()
            .filter(|e| e.action == "lock")
            .count();
        assert_eq!(locks, 1);
    }

    #[tokio::test]
    async fn test_unlock_skips_corrupted_wallet() {
        let f = fixture().await;
        let (secret, _) = solana_secret(2);

        f.custody.setup_password("1", "abcdef").await.unwrap();
        f.custody.unlock("1", "abcdef").await.unwrap();
        f.custody.import_wallet("1", Chain::Solana, &secret, "abcdef").await.unwrap();
        f.wallets
            .create("1", Chain::Eth, EVM_ADDRESS.to_string(), "00:11:22".to_string(), EncryptionVersion::Password).await
            .unwrap();

        let report = f.custody.unlock("1", "abcdef").await.unwrap();

        assert_eq!(report.session.chains, vec![Chain::Solana]);
        let eth = report.wallets.iter().find(|w| w.chain == "ETH").unwrap();
        assert_eq!(eth.error, Some(WalletOpenError::MalformedCiphertext));
        assert!(f.custody.get_private_key("1", Chain::Eth).await.is_none());
        assert!(f.custody.get_private_key("1", Chain::Solana).await.is_some());
    }

    #[tokio::test]
    async fn test_import_requires_password_and_valid_secret() {
        let f = fixture().await;
        f.custody.setup_password("1", "abcdef").await.unwrap();

        assert!(matches!(
            f.custody.import_wallet("1", Chain::Eth, EVM_KEY, "nope!!").await,
            Err(AppError::IncorrectPassword { .. })
        ));
        assert!(matches!(
            f.custody.import_wallet("1", Chain::Eth, "0x1234", "abcdef").await,
            Err(AppError::InvalidPrivateKey)
        ));

        let wallet = f.custody.import_wallet("1", Chain::Eth, EVM_KEY, "abcdef").await.unwrap();
        assert_eq!(wallet.address, EVM_ADDRESS);
        assert_eq!(wallet.encryption_version, 2);

        // Not unlocked, so the key is not available yet.
        assert!(f.custody.get_private_key("1", Chain::Eth).await.is_none());

        let stored = f.wallets.find_by_id(wallet.id).await.unwrap();
        assert!(!stored.encrypted_secret.contains(EVM_KEY.trim_start_matches("0x")));
    }

    #[tokio::test]
    async fn test_legacy_wallet_unlocks_and_migrates() {
        let f = fixture().await;
        let (secret, address) = solana_secret(4);

        f.custody.setup_password("1", "abcdef").await.unwrap();
        let legacy = f.wallets
            .create("1", Chain::Solana, address.clone(), legacy_encrypt(&LEGACY_KEY, &secret), EncryptionVersion::Legacy).await
            .unwrap();

        // Legacy wallets remain usable before migration.
        f.custody.unlock("1", "abcdef").await.unwrap();
        assert_eq!(f.custody.get_private_key("1", Chain::Solana).await.unwrap().as_str(), secret);
        f.custody.lock("1").await.unwrap();

        let migrated = f.custody.migrate_wallet("1", legacy.id, "abcdef").await.unwrap();
        assert_eq!(migrated.encryption_version, 2);

        let stored = f.wallets.find_by_id(legacy.id).await.unwrap();
        assert_eq!(EncryptedBlob::parse(&stored.encrypted_secret).unwrap().version(), EncryptionVersion::Password);

        f.custody.unlock("1", "abcdef").await.unwrap();
        assert_eq!(f.custody.get_private_key("1", Chain::Solana).await.unwrap().as_str(), secret);

        assert!(matches!(
            f.custody.migrate_wallet("1", legacy.id, "abcdef").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_migrate_all_reports_failures() {
        let f = fixture().await;
        let (secret, address) = solana_secret(5);

        f.custody.setup_password("1", "abcdef").await.unwrap();
        f.wallets
            .create("1", Chain::Solana, address, legacy_encrypt(&LEGACY_KEY, &secret), EncryptionVersion::Legacy).await
            .unwrap();
        f.wallets
            .create("1", Chain::Eth, EVM_ADDRESS.to_string(), legacy_encrypt(&[8u8; 32], EVM_KEY), EncryptionVersion::Legacy).await
            .unwrap();

        let report = f.custody.migrate_all_wallets("1", "abcdef").await.unwrap();
        assert_eq!(report.migrated.len(), 1);
        assert_eq!(report.migrated[0].chain, "SOLANA");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].chain, "ETH");

        let eth = f.wallets.find_by_user_and_chain("1", Chain::Eth).await.unwrap().unwrap();
        assert_eq!(eth.encryption_version, 1);
    }

    #[tokio::test]
    async fn test_change_password_reencrypts_and_locks() {
        let f = fixture().await;
        let (secret, _) = solana_secret(6);

        f.custody.setup_password("1", "abcdef").await.unwrap();
        f.custody.unlock("1", "abcdef").await.unwrap();
        f.custody.import_wallet("1", Chain::Solana, &secret, "abcdef").await.unwrap();
        f.custody.import_wallet("1", Chain::Eth, EVM_KEY, "abcdef").await.unwrap();

        assert!(matches!(
            f.custody.change_password("1", "abcdef", "short").await,
            Err(AppError::PasswordTooShort { .. })
        ));
        assert!(matches!(
            f.custody.change_password("1", "wrong1", "newpass1").await,
            Err(AppError::IncorrectPassword { .. })
        ));
        assert!(f.custody.is_unlocked("1").await);

        f.custody.change_password("1", "abcdef", "newpass1").await.unwrap();
        assert!(!f.custody.is_unlocked("1").await);

        assert!(matches!(
            f.custody.unlock("1", "abcdef").await,
            Err(AppError::IncorrectPassword { .. })
        ));

        let report = f.custody.unlock("1", "newpass1").await.unwrap();
        assert!(report.wallets.iter().all(|w| w.error.is_none()));
        assert_eq!(f.custody.get_private_key("1", Chain::Solana).await.unwrap().as_str(), secret);
        assert_eq!(f.custody.get_private_key("1", Chain::Eth).await.unwrap().as_str(), EVM_KEY);
    }

    #[tokio::test]
    async fn test_change_password_aborts_when_a_wallet_cannot_be_opened() {
        let f = fixture().await;
        let (secret, _) = solana_secret(7);

        f.custody.setup_password("1", "abcdef").await.unwrap();
        f.custody.unlock("1", "abcdef").await.unwrap();
        let sol = f.custody.import_wallet("1", Chain::Solana, &secret, "abcdef").await.unwrap();
        f.wallets
            .create("1", Chain::Eth, EVM_ADDRESS.to_string(), "00:11:22".to_string(), EncryptionVersion::Password).await
            .unwrap();
        let before = f.wallets.find_by_id(sol.id).await.unwrap().encrypted_secret;

        assert!(matches!(
            f.custody.change_password("1", "abcdef", "newpass1").await,
            Err(AppError::Encryption(_))
        ));

        assert_eq!(f.wallets.find_by_id(sol.id).await.unwrap().encrypted_secret, before);
        f.custody.lock("1").await.unwrap();
        f.custody.unlock("1", "abcdef").await.unwrap();
    }

    #[tokio::test]
    async fn test_withdraw_password_requirement() {
        let f = fixture().await;
        let (_, whitelisted) = solana_secret(8);
        let (_, stranger) = solana_secret(9);

        f.custody.setup_password("1", "abcdef").await.unwrap();
        assert!(f.custody.requires_password_for_withdraw("1", Chain::Solana, &stranger, 0.1).await.unwrap());

        f.custody.unlock("1", "abcdef").await.unwrap();
        assert!(!f.custody.requires_password_for_withdraw("1", Chain::Solana, &stranger, 100.0).await.unwrap());

        f.custody.set_transfer_limit("1", "abcdef", Chain::Solana, 5.0).await.unwrap();
        f.custody
            .add_whitelist_address("1", "abcdef", Chain::Solana, &whitelisted, Some("cold".to_string())).await
            .unwrap();

        assert!(!f.custody.requires_password_for_withdraw("1", Chain::Solana, &stranger, 5.0).await.unwrap());
        assert!(f.custody.requires_password_for_withdraw("1", Chain::Solana, &stranger, 5.5).await.unwrap());
        assert!(!f.custody.requires_password_for_withdraw("1", Chain::Solana, &whitelisted, 500.0).await.unwrap());

        f.custody.lock("1").await.unwrap();
        assert!(f.custody.requires_password_for_withdraw("1", Chain::Solana, &whitelisted, 0.1).await.unwrap());
    }

    #[tokio::test]
    async fn test_whitelist_validates_address() {
        let f = fixture().await;
        f.custody.setup_password("1", "abcdef").await.unwrap();

        assert!(matches!(
            f.custody.add_whitelist_address("1", "abcdef", Chain::Eth, "0x123", None).await,
            Err(AppError::InvalidAddress)
        ));

        f.custody.add_whitelist_address("1", "abcdef", Chain::Eth, EVM_ADDRESS, None).await.unwrap();
        f.custody.add_whitelist_address("1", "abcdef", Chain::Eth, EVM_ADDRESS, None).await.unwrap();
        assert_eq!(f.custody.list_whitelist("1").await.unwrap().len(), 1);

        assert!(f.custody.remove_whitelist_address("1", "abcdef", Chain::Eth, EVM_ADDRESS).await.unwrap());
        assert!(!f.custody.remove_whitelist_address("1", "abcdef", Chain::Eth, EVM_ADDRESS).await.unwrap());
    }

    #[tokio::test]
    async fn test_evm_whitelist_ignores_checksum_case() {
        let f = fixture().await;
        let checksummed = "0x2C7536E3605D9C16a7a3D7b1898e529396a65c23";

        f.custody.setup_password("1", "abcdef").await.unwrap();
        f.custody.unlock("1", "abcdef").await.unwrap();
        f.custody.set_transfer_limit("1", "abcdef", Chain::Eth, 1.0).await.unwrap();

        f.custody.add_whitelist_address("1", "abcdef", Chain::Eth, checksummed, None).await.unwrap();
        f.custody.add_whitelist_address("1", "abcdef", Chain::Eth, EVM_ADDRESS, None).await.unwrap();

        let entries = f.custody.list_whitelist("1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, EVM_ADDRESS);

        assert!(!f.custody.requires_password_for_withdraw("1", Chain::Eth, EVM_ADDRESS, 50.0).await.unwrap());
        assert!(!f.custody.requires_password_for_withdraw("1", Chain::Eth, checksummed, 50.0).await.unwrap());

        assert!(f.custody.remove_whitelist_address("1", "abcdef", Chain::Eth, checksummed).await.unwrap());
        assert!(f.custody.requires_password_for_withdraw("1", Chain::Eth, EVM_ADDRESS, 50.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_security_settings_need_the_password() {
        let f = fixture().await;
        let (_, attacker) = solana_secret(12);

        f.custody.setup_password("1", "abcdef").await.unwrap();
        f.custody.unlock("1", "abcdef").await.unwrap();
        f.custody.set_transfer_limit("1", "abcdef", Chain::Solana, 1.0).await.unwrap();

        assert!(matches!(
            f.custody.set_transfer_limit("1", "wrong1", Chain::Solana, 1_000_000.0).await,
            Err(AppError::IncorrectPassword { .. })
        ));
        assert!(matches!(
            f.custody.add_whitelist_address("1", "wrong1", Chain::Solana, &attacker, None).await,
            Err(AppError::IncorrectPassword { .. })
        ));
        assert!(matches!(
            f.custody.set_anti_phishing_code("1", "wrong1", Some("phish".to_string())).await,
            Err(AppError::IncorrectPassword { .. })
        ));

        assert!(f.custody.list_whitelist("1").await.unwrap().is_empty());
        assert!(f.custody.requires_password_for_withdraw("1", Chain::Solana, &attacker, 2.0).await.unwrap());

        f.custody.add_whitelist_address("1", "abcdef", Chain::Solana, &attacker, None).await.unwrap();
        assert!(matches!(
            f.custody.remove_whitelist_address("1", "wrong1", Chain::Solana, &attacker).await,
            Err(AppError::IncorrectPassword { .. })
        ));
        assert_eq!(f.custody.list_whitelist("1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_log_never_contains_secrets() {
        let f = fixture().await;
        let (secret, _) = solana_secret(10);

        f.custody.setup_password("1", "abcdef").await.unwrap();
        let _ = f.custody.unlock("1", "wrong1").await;
        f.custody.import_wallet("1", Chain::Solana, &secret, "abcdef").await.unwrap();

        for entry in f.security.audit_log("1").await.unwrap() {
            let details = entry.details.unwrap_or_default();
            assert!(!details.contains(&secret));
            assert!(!details.contains("abcdef"));
            assert!(!details.contains("wrong1"));
        }
    }
}
