use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::debug;

use crate::error::{ AppError, Result };

pub mod messages;

/// Delivers plain-text messages to a user's chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_id: i64, message: &str) -> Result<()>;
}

/// Telegram delivery via the Bot API.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self { bot: Bot::new(token) }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, chat_id: i64, message: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), message)
            .await
            .map_err(|e| AppError::External(format!("Telegram send failed: {}", e)))?;

        debug!(chat_id, "Notification delivered");
        Ok(())
    }
}
