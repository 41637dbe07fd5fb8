use std::collections::HashMap;
use std::sync::Arc;

use chrono::{ DateTime, Duration, Utc };
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{ debug, info };
use zeroize::Zeroizing;

use crate::crypto::SessionCipher;
use crate::enums::Chain;
use crate::error::Result;

struct Session {
    unlocked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    cipher: SessionCipher,
    // chain -> "ivHex:tagHex:ciphertextHex" under `cipher`
    secrets: HashMap<Chain, String>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn info(&self) -> SessionInfo {
        let mut chains: Vec<Chain> = self.secrets.keys().copied().collect();
        chains.sort_by_key(|c| c.as_str());

        SessionInfo {
            unlocked_at: self.unlocked_at,
            expires_at: self.expires_at,
            chains,
        }
    }
}

/// Public view of a live session. Never carries secret material.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub unlocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub chains: Vec<Chain>,
}

/// In-memory, time-bounded cache of unlocked wallet secrets.
///
/// Each session gets its own random key; cached secrets are stored encrypted
/// under it. Expiry is checked on every read and also by a periodic sweep.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Start a session holding the given secrets, replacing any previous one.
    pub async fn open(
        &self,
        user_id: &str,
        secrets: Vec<(Chain, Zeroizing<String>)>
    ) -> Result<SessionInfo> {
        let cipher = SessionCipher::generate()?;
        let mut sealed = HashMap::with_capacity(secrets.len());
        for (chain, secret) in secrets {
            sealed.insert(chain, cipher.encrypt(&secret)?);
        }

        let now = Utc::now();
        let session = Session {
            unlocked_at: now,
            expires_at: now + self.timeout,
            cipher,
            secrets: sealed,
        };
        let info = session.info();

        self.sessions.write().await.insert(user_id.to_string(), session);
        Ok(info)
    }

    /// Cache a secret in the user's live session. Returns false if there is none.
    pub async fn put_secret(&self, user_id: &str, chain: Chain, secret: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;

        let Some(session) = sessions.get_mut(user_id) else {
            return Ok(false);
        };

        if session.is_expired(Utc::now()) {
            sessions.remove(user_id);
            return Ok(false);
        }

        let blob = session.cipher.encrypt(secret)?;
        session.secrets.insert(chain, blob);
        Ok(true)
    }

    pub async fn get_secret(&self, user_id: &str, chain: Chain) -> Option<Zeroizing<String>> {
        {
            let sessions = self.sessions.read().await;
            let session = sessions.get(user_id)?;

            if !session.is_expired(Utc::now()) {
                let blob = session.secrets.get(&chain)?;
                return session.cipher.decrypt(blob);
            }
        }

        self.evict_if_expired(user_id).await;
        None
    }

    pub async fn info(&self, user_id: &str) -> Option<SessionInfo> {
        {
            let sessions = self.sessions.read().await;
            let session = sessions.get(user_id)?;

            if !session.is_expired(Utc::now()) {
                return Some(session.info());
            }
        }

        self.evict_if_expired(user_id).await;
        None
    }

    pub async fn is_active(&self, user_id: &str) -> bool {
        self.info(user_id).await.is_some()
    }

    /// Drop the user's session. Returns whether one existed.
    pub async fn destroy(&self, user_id: &str) -> bool {
        self.sessions.write().await.remove(user_id).is_some()
    }

    /// Remove every expired session, returning how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }

    /// Periodic sweep until `shutdown` fires.
    pub async fn run_sweeper(self: Arc<Self>, every: std::time::Duration, shutdown: CancellationToken) {
        info!(interval_secs = every.as_secs(), "Session sweeper starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(every) => {
                    let evicted = self.sweep_expired().await;
                    if evicted > 0 {
                        debug!(evicted, "Expired sessions evicted");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Session sweeper shutting down");
                    return;
                }
            }
        }
    }

    async fn evict_if_expired(&self, user_id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.get(user_id).is_some_and(|s| s.is_expired(Utc::now())) {
            sessions.remove(user_id);
            debug!(user_id, "Session expired");
        }
    }
}
