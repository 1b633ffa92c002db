//! Change detection between the stored and the freshly fetched rating.

use reqwest::Url;

use crate::messages;
use crate::source::Rating;
use crate::store::TrackedEntry;

/// The rating moved (or was seen for the first time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingChange {
    pub previous: Option<Rating>,
    pub current: Rating,
}

/// A change attributed to one tracked entry, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub subscriber_id: String,
    pub username: String,
    pub previous_rating: Option<Rating>,
    pub new_rating: Rating,
}

/// First observation counts as a change; equal values do not.
pub fn evaluate(previous: Option<Rating>, current: Rating) -> Option<RatingChange> {
    match previous {
        Some(prev) if prev == current => None,
        _ => Some(RatingChange { previous, current }),
    }
}

pub fn detect(entry: &TrackedEntry, current: Rating) -> Option<ChangeEvent> {
    evaluate(entry.last_rating, current).map(|change| ChangeEvent {
        subscriber_id: entry.subscriber_id.clone(),
        username: entry.username.clone(),
        previous_rating: change.previous,
        new_rating: change.current,
    })
}

impl ChangeEvent {
    /// Notification text for the owning subscriber.
    pub fn message(&self, page_base: &Url) -> String {
        match self.previous_rating {
            None => messages::first_rating(page_base, &self.username, self.new_rating),
            Some(previous) => {
                messages::rating_changed(page_base, &self.username, previous, self.new_rating)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate(None, 42), Some(RatingChange { previous: None, current: 42 }));
        assert_eq!(evaluate(Some(42), 42), None);
        assert_eq!(evaluate(Some(42), 43), Some(RatingChange { previous: Some(42), current: 43 }));
        assert_eq!(evaluate(Some(43), 42), Some(RatingChange { previous: Some(43), current: 42 }));
    }

    #[test]
    fn test_detect_carries_entry_identity() {
        let entry = TrackedEntry {
            subscriber_id: "chat-1".into(),
            username: "alice".into(),
            last_rating: Some(10),
        };
        let event = detect(&entry, 20).unwrap();
        assert_eq!(event, ChangeEvent {
            subscriber_id: "chat-1".into(),
            username: "alice".into(),
            previous_rating: Some(10),
            new_rating: 20,
        });
        assert!(detect(&entry, 10).is_none());
    }

    #[test]
    fn test_message_wording() {
        let base = Url::parse("https://hackerlab.pro").unwrap();
        let first = ChangeEvent {
            subscriber_id: "1".into(),
            username: "alice".into(),
            previous_rating: None,
            new_rating: 5,
        };
        assert!(first.message(&base).ends_with("alice</a>: 5"));

        let changed = ChangeEvent { previous_rating: Some(4), ..first };
        assert!(changed.message(&base).ends_with("изменился: 4 -> 5"));
    }
}
