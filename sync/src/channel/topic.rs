//! Push channel topics.
//!
//! A topic is the path segment between `/ws/` and the query string, e.g.
//! `stores/pastita/orders` for `wss://host/ws/stores/pastita/orders/?token=..`.

use std::fmt;

/// A logical push-channel namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    path: String,
}

impl Topic {
    /// Creates a topic from a path. Leading and trailing slashes are stripped.
    #[must_use]
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: path.as_ref().trim_matches('/').to_string(),
        }
    }

    /// Order events for a store.
    #[must_use]
    pub fn store_orders(store_slug: &str) -> Self {
        Self::new(format!("stores/{}/orders", store_slug))
    }

    /// Automation events (sessions, scheduled messages, reports).
    #[must_use]
    pub fn automation() -> Self {
        Self::new("automation")
    }

    /// Chat events for one conversation.
    #[must_use]
    pub fn chat(conversation_id: &str) -> Self {
        Self::new(format!("chat/{}", conversation_id))
    }

    /// Account notifications.
    #[must_use]
    pub fn notifications() -> Self {
        Self::new("notifications")
    }

    /// Dashboard statistics.
    #[must_use]
    pub fn dashboard() -> Self {
        Self::new("dashboard")
    }

    /// Returns the topic path without surrounding slashes.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true if the path is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_trims_slashes() {
        let topic = Topic::new("/stores/pastita/orders/");
        assert_eq!(topic.path(), "stores/pastita/orders");
    }

    #[test]
    fn test_topic_constructors() {
        assert_eq!(Topic::store_orders("pastita").path(), "stores/pastita/orders");
        assert_eq!(Topic::automation().path(), "automation");
        assert_eq!(Topic::chat("abc").path(), "chat/abc");
        assert_eq!(Topic::notifications().path(), "notifications");
        assert_eq!(Topic::dashboard().path(), "dashboard");
    }

    #[test]
    fn test_topic_empty() {
        assert!(Topic::new("//").is_empty());
        assert!(!Topic::automation().is_empty());
    }

    #[test]
    fn test_topic_display() {
        assert_eq!(Topic::chat("c1").to_string(), "chat/c1");
    }
}
