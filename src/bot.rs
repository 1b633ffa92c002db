//! Telegram front-end: menu keyboard plus a one-step username prompt.
//!
//! Menu buttons select an action; check/add/remove then wait for the next
//! text message from the same chat and treat it as the username. Pending
//! prompts are kept in memory per chat.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup, ParseMode, User};
use teloxide::utils::html::escape;
use tracing::{error, info, warn};

use crate::handler::{Caller, OnDemandHandler};
use crate::messages;
use crate::notify::{Action, ChannelLog};
use crate::store::TrackingStore;

const MENU_CHECK: &str = "Проверка рейтинга";
const MENU_LIST: &str = "Пользователи на мониторинге";
const MENU_ADD: &str = "Добавить на мониторинг";
const MENU_REMOVE: &str = "Удалить с мониторинга";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuChoice {
    Check,
    List,
    Add,
    Remove,
}

impl MenuChoice {
    fn parse(text: &str) -> Option<Self> {
        match text {
            MENU_CHECK => Some(MenuChoice::Check),
            MENU_LIST => Some(MenuChoice::List),
            MENU_ADD => Some(MenuChoice::Add),
            MENU_REMOVE => Some(MenuChoice::Remove),
            _ => None,
        }
    }
}

/// Action waiting for a username from a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAction {
    Check,
    Add,
    Remove,
}

pub struct BotState {
    handler: Arc<OnDemandHandler>,
    store: Arc<TrackingStore>,
    log: Arc<ChannelLog>,
    pending: Mutex<HashMap<ChatId, PendingAction>>,
}

impl BotState {
    pub fn new(handler: Arc<OnDemandHandler>, store: Arc<TrackingStore>, log: Arc<ChannelLog>) -> Self {
        Self {
            handler,
            store,
            log,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn set_pending(&self, chat: ChatId, action: Option<PendingAction>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match action {
            Some(action) => pending.insert(chat, action),
            None => pending.remove(&chat),
        };
    }

    fn take_pending(&self, chat: ChatId) -> Option<PendingAction> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&chat)
    }
}

/// Run the long-polling dispatcher until the process is stopped.
pub async fn run(bot: Bot, state: Arc<BotState>) {
    info!("Starting Telegram bot...");
    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let state = Arc::clone(&state);
        async move {
            if let Err(e) = handle_message(&bot, &msg, &state).await {
                error!(chat = %msg.chat.id, "Error handling message: {:#}", e);
            }
            respond(())
        }
    })
    .await;
}

async fn handle_message(bot: &Bot, msg: &Message, state: &BotState) -> Result<()> {
    let chat_id = msg.chat.id;
    let Some(text) = msg.text() else {
        warn!(chat = %chat_id, "Received non-text message");
        bot.send_message(chat_id, messages::TEXT_ONLY).await?;
        return Ok(());
    };
    let text = text.trim();
    let caller = match msg.from().map(user_link) {
        Some(link) => Caller::with_link(chat_id.to_string(), link),
        None => Caller::new(chat_id.to_string()),
    };

    if text == "/start" || text.starts_with("/start ") {
        state.set_pending(chat_id, None);
        return start(bot, msg, state, &caller).await;
    }

    if let Some(choice) = MenuChoice::parse(text) {
        return handle_choice(bot, chat_id, state, &caller, choice).await;
    }

    let reply = match state.take_pending(chat_id) {
        Some(PendingAction::Check) => state.handler.check(&caller, text).await,
        Some(PendingAction::Add) => state.handler.add(&caller, text).await,
        Some(PendingAction::Remove) => state.handler.remove(&caller, text).await,
        None => messages::UNKNOWN_COMMAND.to_string(),
    };
    reply_html(bot, chat_id, reply).await
}

async fn start(bot: &Bot, msg: &Message, state: &BotState, caller: &Caller) -> Result<()> {
    if let Err(e) = state.store.get_or_create_subscriber(&caller.subscriber_id) {
        error!(subscriber = %caller.subscriber_id, "Failed to register subscriber: {}", e);
        state.log.error(&caller.link, Action::Start, "не удалось сохранить данные пользователя").await;
    }
    state.log.action(&caller.link, Action::Start, None).await;

    let greeting = format!(
        "Привет, {}!\n\n{}\n\nВыберите действие",
        greeting_name(msg.from()),
        messages::BOT_DESCRIPTION
    );
    bot.send_message(msg.chat.id, greeting)
        .reply_markup(menu_keyboard())
        .await?;
    Ok(())
}

async fn handle_choice(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    caller: &Caller,
    choice: MenuChoice,
) -> Result<()> {
    match choice {
        MenuChoice::Check => {
            state.set_pending(chat_id, Some(PendingAction::Check));
            reply_html(bot, chat_id, messages::ENTER_USERNAME.to_string()).await
        }
        MenuChoice::Add => {
            state.set_pending(chat_id, Some(PendingAction::Add));
            reply_html(bot, chat_id, messages::ENTER_USERNAME.to_string()).await
        }
        MenuChoice::List => {
            state.set_pending(chat_id, None);
            let reply = state.handler.list(caller).await;
            reply_html(bot, chat_id, reply).await
        }
        MenuChoice::Remove => match state.handler.remove_prompt(caller) {
            Ok(Some(prompt)) => {
                state.set_pending(chat_id, Some(PendingAction::Remove));
                reply_html(bot, chat_id, prompt).await
            }
            Ok(None) => {
                state.set_pending(chat_id, None);
                reply_html(bot, chat_id, messages::EMPTY_LIST.to_string()).await
            }
            Err(e) => {
                state.set_pending(chat_id, None);
                error!(subscriber = %caller.subscriber_id, "Failed to list tracked users: {}", e);
                reply_html(bot, chat_id, messages::STORE_FAILURE.to_string()).await
            }
        },
    }
}

async fn reply_html(bot: &Bot, chat_id: ChatId, text: String) -> Result<()> {
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .disable_web_page_preview(true)
        .await?;
    Ok(())
}

fn menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(MENU_CHECK), KeyboardButton::new(MENU_LIST)],
        vec![KeyboardButton::new(MENU_ADD), KeyboardButton::new(MENU_REMOVE)],
    ])
    .resize_keyboard(true)
}

fn full_name(user: &User) -> String {
    let mut name = user.first_name.trim().to_string();
    if let Some(last) = user.last_name.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        if !name.is_empty() {
            name.push(' ');
        }
        name.push_str(last);
    }
    name
}

fn greeting_name(user: Option<&User>) -> String {
    match user {
        Some(u) => match &u.username {
            Some(username) => format!("@{}", username),
            None => Some(full_name(u)).filter(|n| !n.is_empty()).unwrap_or_else(|| "друг".into()),
        },
        None => "друг".into(),
    }
}

/// HTML link to the Telegram user, for the operator log channel.
fn user_link(user: &User) -> String {
    let name = full_name(user);
    match &user.username {
        Some(username) => {
            let display = if name.is_empty() {
                format!("@{}", username)
            } else {
                format!("{} (@{})", name, username)
            };
            format!("<a href=\"https://t.me/{}\">{}</a>", escape(username), escape(&display))
        }
        None => {
            let display = if name.is_empty() { format!("ID {}", user.id.0) } else { name };
            format!("<a href=\"tg://user?id={}\">{}</a>", user.id.0, escape(&display))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(username: Option<&str>, first: &str, last: Option<&str>) -> User {
        serde_json::from_value(json!({
            "id": 42,
            "is_bot": false,
            "first_name": first,
            "last_name": last,
            "username": username,
        }))
        .unwrap()
    }

    #[test]
    fn test_menu_choice_parse() {
        assert_eq!(MenuChoice::parse("Проверка рейтинга"), Some(MenuChoice::Check));
        assert_eq!(MenuChoice::parse("Удалить с мониторинга"), Some(MenuChoice::Remove));
        assert_eq!(MenuChoice::parse("alice"), None);
    }

    #[test]
    fn test_user_link_variants() {
        assert_eq!(
            user_link(&user(Some("ann"), "Ann", Some("Lee"))),
            "<a href=\"https://t.me/ann\">Ann Lee (@ann)</a>"
        );
        assert_eq!(
            user_link(&user(None, "<Ann>", None)),
            "<a href=\"tg://user?id=42\">&lt;Ann&gt;</a>"
        );
        assert_eq!(
            user_link(&user(None, "", None)),
            "<a href=\"tg://user?id=42\">ID 42</a>"
        );
    }

    #[test]
    fn test_greeting_name() {
        assert_eq!(greeting_name(Some(&user(Some("ann"), "Ann", None))), "@ann");
        assert_eq!(greeting_name(Some(&user(None, "Ann", Some("Lee")))), "Ann Lee");
        assert_eq!(greeting_name(Some(&user(None, " ", None))), "друг");
        assert_eq!(greeting_name(None), "друг");
    }
}
