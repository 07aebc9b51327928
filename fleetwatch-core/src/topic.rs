use serde::Serialize;

/// Every state feed ends with this suffix.
pub const STATE_SUFFIX: &str = "/state";
/// Appended to the base address to reach the supervisor's command service.
pub const START_STOP_SERVICE: &str = "/start_stop";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("Invalid topic '{0}': expected a name ending in '/state'")]
    MissingSuffix(String),
    #[error("Invalid topic '{0}': wildcards ('+', '#') cannot name a single feed")]
    Wildcard(String),
}

/// A validated state feed: `<base>/state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedTopic {
    topic: String,
    base: String,
}

impl FeedTopic {
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let base = topic
            .strip_suffix(STATE_SUFFIX)
            .ok_or_else(|| TopicError::MissingSuffix(topic.to_string()))?;
        // a feed names exactly one supervisor
        if topic.contains(['+', '#']) {
            return Err(TopicError::Wildcard(topic.to_string()));
        }
        Ok(Self {
            topic: topic.to_string(),
            base: base.to_string(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Prefix shared by the feed and the command service.
    pub fn base_address(&self) -> &str {
        &self.base
    }
}

pub fn start_stop_address(base_address: &str) -> String {
    format!("{base_address}{START_STOP_SERVICE}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_topic() {
        let feed = FeedTopic::parse("robot/rosmon/state").unwrap();
        assert_eq!(feed.topic(), "robot/rosmon/state");
        assert_eq!(feed.base_address(), "robot/rosmon");
        assert_eq!(start_stop_address(feed.base_address()), "robot/rosmon/start_stop");
    }

    #[test]
    fn test_bare_suffix_has_empty_base() {
        let feed = FeedTopic::parse("/state").unwrap();
        assert_eq!(feed.base_address(), "");
    }

    #[test]
    fn test_rejects_missing_suffix() {
        assert_eq!(
            FeedTopic::parse("robot/rosmon/status"),
            Err(TopicError::MissingSuffix("robot/rosmon/status".into()))
        );
        assert!(FeedTopic::parse("state").is_err());
        assert!(FeedTopic::parse("").is_err());
    }

    #[test]
    fn test_rejects_wildcards() {
        assert_eq!(
            FeedTopic::parse("+/state"),
            Err(TopicError::Wildcard("+/state".into()))
        );
        assert_eq!(
            FeedTopic::parse("robot/#/state"),
            Err(TopicError::Wildcard("robot/#/state".into()))
        );
        assert!(FeedTopic::parse("fleet/+/rosmon/state").is_err());
    }
}
