//! Profile page strategy: scrapes the rendered `/users/{login}` page.
//!
//! The rating sits in a `<div>` right after the `<div>` that holds the
//! "Рейтинг" icon:
//!
//! ```html
//! <div><img alt="Рейтинг" src="..."></div>
//! <div>1234</div>
//! ```

use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use super::{parse_rating, FetchError, Rating, RatingStrategy};

const RATING_SELECTOR: &str = r#"img[alt="Рейтинг"]"#;
const BROWSER_USER_AGENT: &str = "Mozilla/5.0";
const SNIPPET_LEN: usize = 200;

pub struct PageStrategy {
    client: reqwest::Client,
    base: Url,
}

impl PageStrategy {
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }
}

/// `{base}/users/{username}` with the username percent-encoded.
pub fn profile_url(base: &Url, username: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("users").push(username);
    }
    url
}

#[async_trait]
impl RatingStrategy for PageStrategy {
    fn name(&self) -> &str { "page" }

    async fn fetch(&self, username: &str) -> Result<Option<Rating>, FetchError> {
        let url = profile_url(&self.base, username);
        let resp = self.client.get(url.clone())
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus(format!("HTTP {} from {}", status, url)));
        }

        let html = resp.text().await?;

        match extract_rating(&html) {
            Ok(rating) => Ok(Some(rating)),
            Err(e) => {
                warn!(
                    username = %username,
                    url = %url,
                    html_len = html.len(),
                    html_snippet = %html_snippet(&html),
                    "Profile page did not yield a rating"
                );
                Err(e)
            }
        }
    }
}

/// Pull the rating out of a rendered profile page.
pub fn extract_rating(html: &str) -> Result<Rating, FetchError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(RATING_SELECTOR)
        .map_err(|e| FetchError::Parse(format!("bad selector: {}", e)))?;

    let icon = document.select(&selector).next()
        .ok_or_else(|| FetchError::Parse("rating icon missing".into()))?;

    let container = icon.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "div")
        .ok_or_else(|| FetchError::Parse("rating icon has no enclosing div".into()))?;

    let value = container.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "div")
        .ok_or_else(|| FetchError::Parse("rating value div missing".into()))?;

    let text: String = value.text().map(str::trim).collect();
    parse_rating(&text)
}

/// Whitespace-collapsed prefix of a page, for log lines.
fn html_snippet(html: &str) -> String {
    html.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SNIPPET_LEN)
        .collect()
}
