//! JSON API strategy: login → user id → scoreboard position.
//!
//! The two calls are composed into one strategy: a failure in either
//! step fails the whole lookup and lets the page strategy take over.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use super::{parse_rating, FetchError, Rating, RatingStrategy};

/// Field names the scoreboard endpoint has used for the position.
const POSITION_FIELDS: [&str; 4] = ["position", "place", "rank", "rating"];

pub struct ApiStrategy {
    client: reqwest::Client,
    base: Url,
}

impl ApiStrategy {
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport(format!("'{}' cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<Value, FetchError> {
        let resp = self.client.get(url.clone()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus(format!("HTTP {} from {}", status, url)));
        }

        let body = resp.text().await?;
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Parse(format!("invalid JSON from {}: {}", url, e)))?;

        check_api_status(&json)?;
        Ok(json)
    }

    async fn resolve_id(&self, username: &str) -> Result<String, FetchError> {
        let body = self.get_json(self.endpoint(&["api", "users", username])?).await?;
        extract_user_id(&body)
    }

    async fn scoreboard_position(&self, user_id: &str) -> Result<Option<Rating>, FetchError> {
        let body = self.get_json(self.endpoint(&["api", "scoreboard", "users", user_id])?).await?;
        extract_position(&body)
    }
}

#[async_trait]
impl RatingStrategy for ApiStrategy {
    fn name(&self) -> &str { "api" }

    async fn fetch(&self, username: &str) -> Result<Option<Rating>, FetchError> {
        let user_id = self.resolve_id(username).await?;
        self.scoreboard_position(&user_id).await
    }
}

// ── Response Parsing ────────────────────────────────────────────────

/// Objects to search for a field: the body itself, then its `data` member.
fn candidates(body: &Value) -> impl Iterator<Item = &Value> {
    std::iter::once(body).chain(body.get("data")).filter(|v| v.is_object())
}

/// A 200 response can still carry an API-level failure.
fn check_api_status(body: &Value) -> Result<(), FetchError> {
    if body.get("success") == Some(&Value::Bool(false)) {
        return Err(FetchError::UpstreamStatus("API reported success=false".into()));
    }
    match body.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(()),
        Some(err) => Err(FetchError::UpstreamStatus(format!("API error: {}", err))),
    }
}

fn extract_user_id(body: &Value) -> Result<String, FetchError> {
    for obj in candidates(body) {
        match obj.get("id") {
            Some(Value::Number(n)) => return Ok(n.to_string()),
            Some(Value::String(s)) if !s.trim().is_empty() => return Ok(s.trim().to_string()),
            _ => continue,
        }
    }
    Err(FetchError::Parse("user id missing from profile response".into()))
}

/// `Ok(None)` when the field is present but null (unranked user).
fn extract_position(body: &Value) -> Result<Option<Rating>, FetchError> {
    for obj in candidates(body) {
        for field in POSITION_FIELDS {
            match obj.get(field) {
                None => continue,
                Some(Value::Null) => return Ok(None),
                Some(Value::Number(n)) => {
                    return n.as_u64().map(Some).ok_or_else(|| {
                        FetchError::Parse(format!("{} = {} is not a non-negative integer", field, n))
                    });
                }
                Some(Value::String(s)) => return parse_rating(s.trim()).map(Some),
                Some(other) => {
                    return Err(FetchError::Parse(format!("{} has unexpected type: {}", field, other)));
                }
            }
        }
    }
    Err(FetchError::Parse("scoreboard response has no position field".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tests::{client, closed_port, serve};
    use serde_json::json;

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let base = serve("503 Service Unavailable", "busy").await;
        let strategy = ApiStrategy::new(client(), base);
        assert!(matches!(strategy.fetch("alice").await, Err(FetchError::UpstreamStatus(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let strategy = ApiStrategy::new(client(), closed_port().await);
        assert!(matches!(strategy.fetch("alice").await, Err(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn test_non_json_body_is_parse_error() {
        let base = serve("200 OK", "<html>maintenance</html>").await;
        let strategy = ApiStrategy::new(client(), base);
        assert!(matches!(strategy.fetch("alice").await, Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let base = Url::parse("https://hackerlab.pro").unwrap();
        let strategy = ApiStrategy::new(reqwest::Client::new(), base);
        let url = strategy.endpoint(&["api", "users", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "https://hackerlab.pro/api/users/a%20b%2Fc");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("https://example.test/v2/").unwrap();
        let strategy = ApiStrategy::new(reqwest::Client::new(), base);
        let url = strategy.endpoint(&["api", "scoreboard", "users", "42"]).unwrap();
        assert_eq!(url.as_str(), "https://example.test/v2/api/scoreboard/users/42");
    }

    #[test]
    fn test_extract_user_id_variants() {
        assert_eq!(extract_user_id(&json!({"id": 42})).unwrap(), "42");
        assert_eq!(extract_user_id(&json!({"id": "u-7f"})).unwrap(), "u-7f");
        assert_eq!(extract_user_id(&json!({"data": {"id": 9}})).unwrap(), "9");
        assert!(matches!(extract_user_id(&json!({"login": "alice"})), Err(FetchError::Parse(_))));
        assert!(matches!(extract_user_id(&json!({"id": ""})), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_extract_position_variants() {
        assert_eq!(extract_position(&json!({"position": 17})).unwrap(), Some(17));
        assert_eq!(extract_position(&json!({"data": {"place": "3"}})).unwrap(), Some(3));
        assert_eq!(extract_position(&json!({"position": null})).unwrap(), None);
        assert!(matches!(extract_position(&json!({"position": -1})), Err(FetchError::Parse(_))));
        assert!(matches!(extract_position(&json!({"position": 2.5})), Err(FetchError::Parse(_))));
        assert!(matches!(extract_position(&json!({"position": "12th"})), Err(FetchError::Parse(_))));
        assert!(matches!(extract_position(&json!({"score": 100})), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_api_level_failure_is_status_error() {
        assert!(check_api_status(&json!({"id": 1})).is_ok());
        assert!(check_api_status(&json!({"success": true, "error": null})).is_ok());
        assert!(matches!(
            check_api_status(&json!({"success": false})),
            Err(FetchError::UpstreamStatus(_))
        ));
        assert!(matches!(
            check_api_status(&json!({"error": "user not found"})),
            Err(FetchError::UpstreamStatus(_))
        ));
    }
}
