use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Why the author of a post might be a buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Recommendation,
    Alternative,
    Comparison,
    Complaint,
    Question,
}

impl Intent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Recommendation => "recommendation",
            Intent::Alternative => "alternative",
            Intent::Comparison => "comparison",
            Intent::Complaint => "complaint",
            Intent::Question => "question",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recommendation" => Ok(Intent::Recommendation),
            "alternative" => Ok(Intent::Alternative),
            "comparison" => Ok(Intent::Comparison),
            "complaint" => Ok(Intent::Complaint),
            "question" => Ok(Intent::Question),
            _ => Err(CoreError::UnknownIntent(s.to_string())),
        }
    }
}

/// A post returned by any search connector, in one shape for every platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPost {
    /// Platform-native id (e.g. `"abc123"` for a Reddit post).
    pub id: String,
    /// Identity used for deduplication, unique per platform (e.g. `"t3_abc123"`).
    pub external_id: String,
    pub title: String,
    /// Raw body as returned by the platform; may contain markup.
    pub content: String,
    pub url: String,
    pub author: String,
    /// Subreddit or forum label; `None` where the platform has no such concept.
    pub community: Option<String>,
    pub score: i64,
    pub num_comments: i64,
    pub created_utc: Option<DateTime<Utc>>,
}

impl NormalizedPost {
    /// Returns `true` when the post is no older than `max_age_days` relative to `now`.
    ///
    /// Posts without a timestamp are kept; the platform could not date them.
    #[must_use]
    pub fn is_within_age(&self, max_age_days: u32, now: DateTime<Utc>) -> bool {
        let cutoff = now - chrono::Duration::days(i64::from(max_age_days));
        self.created_utc.is_none_or(|created| created >= cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_created(created_utc: Option<DateTime<Utc>>) -> NormalizedPost {
        NormalizedPost {
            id: "abc".to_string(),
            external_id: "t3_abc".to_string(),
            title: "Looking for a CRM".to_string(),
            content: String::new(),
            url: "https://reddit.com/r/smallbusiness/comments/abc".to_string(),
            author: "someone".to_string(),
            community: Some("smallbusiness".to_string()),
            score: 3,
            num_comments: 1,
            created_utc,
        }
    }

    #[test]
    fn intent_parses_case_insensitively() {
        assert_eq!("Alternative".parse::<Intent>().unwrap(), Intent::Alternative);
        assert!("praise".parse::<Intent>().is_err());
    }

    #[test]
    fn age_cutoff_is_inclusive_and_keeps_undated_posts() {
        let now = Utc::now();
        assert!(post_created(Some(now - chrono::Duration::days(7))).is_within_age(7, now));
        assert!(!post_created(Some(now - chrono::Duration::days(8))).is_within_age(7, now));
        assert!(post_created(None).is_within_age(7, now));
    }
}
