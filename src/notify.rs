//! Notification delivery: the outbound message channel.
//!
//! The monitor and the operator log only see the [`Notifier`] trait;
//! [`TelegramNotifier`] is the production implementation. Delivery
//! failures are returned to the caller, which counts and logs them.

use async_trait::async_trait;
use std::sync::Arc;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid recipient '{0}'")]
    InvalidRecipient(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send an HTML message to a subscriber (or channel).
    async fn deliver(&self, recipient: &str, message: &str) -> Result<(), NotifyError>;

    /// Same as `deliver`, but without a notification sound where supported.
    async fn deliver_silent(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        self.deliver(recipient, message).await
    }
}

// ── Telegram ────────────────────────────────────────────────────────

pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send(&self, recipient: &str, message: &str, silent: bool) -> Result<(), NotifyError> {
        self.bot.send_message(parse_recipient(recipient)?, message)
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true)
            .disable_notification(silent)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        self.send(recipient, message, false).await
    }

    async fn deliver_silent(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        self.send(recipient, message, true).await
    }
}

/// Numeric chat ids and `@channel` usernames are accepted.
pub fn parse_recipient(raw: &str) -> Result<Recipient, NotifyError> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(Recipient::Id(ChatId(id)));
    }
    if raw.len() > 1 && raw.starts_with('@') {
        return Ok(Recipient::ChannelUsername(raw.to_string()));
    }
    Err(NotifyError::InvalidRecipient(raw.to_string()))
}

// ── Operator Log Channel ────────────────────────────────────────────

/// What a subscriber was doing when a log line was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Check,
    Add,
    Remove,
    List,
    Monitoring,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::Start => "старт",
            Action::Check => "проверка рейтинга",
            Action::Add => "добавление в мониторинг",
            Action::Remove => "удаление из мониторинга",
            Action::List => "список мониторинга",
            Action::Monitoring => "регулярная проверка",
        }
    }
}

/// Optional operator channel mirroring user actions and errors.
///
/// Send failures are logged and swallowed; the channel never affects
/// the outcome of the operation being reported.
pub struct ChannelLog {
    sink: Option<(Arc<dyn Notifier>, String)>,
}

impl ChannelLog {
    pub fn new(notifier: Arc<dyn Notifier>, channel: Option<String>) -> Self {
        Self { sink: channel.map(|c| (notifier, c)) }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub async fn send(&self, text: &str, silent: bool) {
        let Some((notifier, channel)) = &self.sink else { return };
        let sent = if silent {
            notifier.deliver_silent(channel, text).await
        } else {
            notifier.deliver(channel, text).await
        };
        if let Err(e) = sent {
            error!(channel = %channel, "Failed to write to log channel: {}", e);
        }
    }

    /// Startup notice, sent with sound.
    pub async fn started(&self) {
        self.send(crate::messages::BOT_STARTED, false).await;
    }

    /// `who` is an HTML fragment identifying the subscriber.
    pub async fn action(&self, who: &str, action: Action, detail: Option<&str>) {
        if !self.is_enabled() {
            return;
        }
        let label = teloxide::utils::html::escape(action.label());
        let text = match detail {
            Some(detail) => format!("Действие: {} — {}: {}", who, label, detail),
            None => format!("Действие: {} — {}", who, label),
        };
        self.send(&text, false).await;
    }

    pub async fn error(&self, who: &str, action: Action, detail: &str) {
        if !self.is_enabled() {
            return;
        }
        let label = teloxide::utils::html::escape(action.label());
        let text = format!("Ошибка: {} — {} (действие: {})", who, detail, label);
        self.send(&text, false).await;
    }
}
