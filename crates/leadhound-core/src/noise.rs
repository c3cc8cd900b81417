//! Static noise filters applied before a candidate is persisted.

/// Communities that almost never carry commercial intent.
///
/// Compared case-insensitively against the community label with any `r/`
/// prefix removed.
pub const DENYLISTED_COMMUNITIES: &[&str] = &[
    "funny",
    "memes",
    "dankmemes",
    "me_irl",
    "wholesomememes",
    "pics",
    "gifs",
    "videos",
    "aww",
    "gaming",
    "movies",
    "music",
    "television",
    "jokes",
    "showerthoughts",
    "todayilearned",
    "askreddit",
    "teenagers",
    "circlejerk",
    "politics",
    "politicalhumor",
    "worldnews",
    "news",
    "conspiracy",
    "nba",
    "nfl",
    "soccer",
];

/// Accounts that stand in for removed or automated authors.
const SENTINEL_AUTHORS: &[&str] = &["[deleted]", "[removed]", "automoderator"];

#[must_use]
pub fn is_denylisted_community(community: &str) -> bool {
    let trimmed = community.trim();
    let name = trimmed
        .strip_prefix("r/")
        .or_else(|| trimmed.strip_prefix("/r/"))
        .unwrap_or(trimmed);
    DENYLISTED_COMMUNITIES
        .iter()
        .any(|denied| denied.eq_ignore_ascii_case(name))
}

#[must_use]
pub fn is_sentinel_author(author: &str) -> bool {
    let author = author.trim();
    author.is_empty()
        || SENTINEL_AUTHORS
            .iter()
            .any(|sentinel| sentinel.eq_ignore_ascii_case(author))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_matches_case_insensitively_and_with_prefix() {
        assert!(is_denylisted_community("funny"));
        assert!(is_denylisted_community("Funny"));
        assert!(is_denylisted_community("r/AskReddit"));
        assert!(!is_denylisted_community("smallbusiness"));
        assert!(!is_denylisted_community("funnyvideosforsales"));
    }

    #[test]
    fn sentinel_authors_are_detected() {
        assert!(is_sentinel_author("[deleted]"));
        assert!(is_sentinel_author("AutoModerator"));
        assert!(is_sentinel_author("  "));
        assert!(!is_sentinel_author("founder_jane"));
    }
}
