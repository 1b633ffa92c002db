//! User-facing texts. Everything here is sent with HTML parse mode.

use reqwest::Url;
use teloxide::utils::html::escape;

use crate::monitor::stats::CycleReport;
use crate::source::page::profile_url;
use crate::source::Rating;

pub const ENTER_USERNAME: &str = "Введите ник пользователя";
pub const CHECK_FAILED: &str = "Не удалось получить рейтинг";
pub const RATE_LIMITED: &str = "Превышен лимит запросов";
pub const ADDED: &str = "Пользователь добавлен на мониторинг";
pub const ALREADY_TRACKED: &str = "Пользователь уже на мониторинге";
pub const LIMIT_REACHED: &str = "Достигнут лимит пользователей на мониторинге";
pub const REMOVED: &str = "Пользователь удален из мониторинга";
pub const NOT_TRACKED: &str = "Такой пользователь не найден";
pub const EMPTY_LIST: &str = "Список пуст";
pub const UNKNOWN_COMMAND: &str = "Неизвестная команда";
pub const TEXT_ONLY: &str = "Я понимаю только текстовые сообщения";
pub const STORE_FAILURE: &str = "Не удалось выполнить операцию, попробуйте позже";
pub const BOT_STARTED: &str = "Логи: бот запущен";

pub const BOT_DESCRIPTION: &str = "Этот бот отслеживает изменения рейтинга пользователей на сайте \
    hackerlab.pro. Он может проверять рейтинг по запросу, добавлять пользователей на регулярный \
    мониторинг, выводить список отслеживаемых пользователей и удалять их из мониторинга. \
    Мониторинг выполняется каждые 10 минут. Для одного чата можно поставить на мониторинг не \
    более 10 пользователей, а разовые проверки ограничены пятью за пять минут.";

/// `<a href="{profile}">{username}</a>`
pub fn profile_link(page_base: &Url, username: &str) -> String {
    let username = username.trim();
    format!(
        "<a href=\"{}\">{}</a>",
        escape(profile_url(page_base, username).as_str()),
        escape(username)
    )
}

/// Link for a subscriber known only by chat id.
pub fn subscriber_link(subscriber_id: &str) -> String {
    match subscriber_id.trim().parse::<i64>() {
        Ok(id) => format!("<a href=\"tg://user?id={}\">ID {}</a>", id, id),
        Err(_) => escape(subscriber_id),
    }
}

pub fn current_rating(page_base: &Url, username: &str, rating: Rating) -> String {
    format!("Текущий рейтинг пользователя {}: {}", profile_link(page_base, username), rating)
}

pub fn first_rating(page_base: &Url, username: &str, rating: Rating) -> String {
    format!("Рейтинг пользователя {}: {}", profile_link(page_base, username), rating)
}

pub fn rating_changed(page_base: &Url, username: &str, previous: Rating, rating: Rating) -> String {
    format!(
        "Рейтинг пользователя {} изменился: {} -> {}",
        profile_link(page_base, username),
        previous,
        rating
    )
}

pub fn tracked_list<'a>(page_base: &Url, usernames: impl IntoIterator<Item = &'a str>) -> String {
    let links: Vec<String> = usernames
        .into_iter()
        .filter(|u| !u.trim().is_empty())
        .map(|u| profile_link(page_base, u))
        .collect();
    if links.is_empty() {
        return EMPTY_LIST.to_string();
    }
    format!("На мониторинге:\n{}", links.join("\n"))
}

pub fn remove_prompt<'a>(usernames: impl IntoIterator<Item = &'a str>) -> String {
    let names: Vec<String> = usernames.into_iter().map(escape).collect();
    format!("Введите ник пользователя для удаления:\n{}", names.join("\n"))
}

pub fn fetch_failed_detail(page_base: &Url, username: &str) -> String {
    format!("не удалось получить рейтинг для {}", profile_link(page_base, username))
}

pub fn delivery_failed_detail(page_base: &Url, username: &str) -> String {
    format!("не удалось отправить уведомление для {}", profile_link(page_base, username))
}

pub fn daily_summary(totals: &CycleReport) -> String {
    format!(
        "Сводка за сутки: проверено {}, обновлено {}, ошибок {}",
        totals.checked, totals.changed, totals.errors
    )
}
