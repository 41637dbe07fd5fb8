pub mod user_security;
pub mod encrypted_wallet;
pub mod withdrawal_whitelist;
pub mod login_attempt;
pub mod security_audit_log;
pub mod trigger_order;

pub use user_security::Entity as UserSecurity;
pub use encrypted_wallet::Entity as EncryptedWallet;
pub use withdrawal_whitelist::Entity as WithdrawalWhitelist;
pub use login_attempt::Entity as LoginAttempt;
pub use security_audit_log::Entity as SecurityAuditLog;
pub use trigger_order::Entity as TriggerOrder;
