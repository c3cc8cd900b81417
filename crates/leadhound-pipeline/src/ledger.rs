//! Deduplication ledger and the admission gate in front of persistence.

use std::collections::HashSet;

use leadhound_core::{is_denylisted_community, is_sentinel_author, sanitize, NormalizedPost};
use leadhound_db::NewLead;

/// Why a fetched post was not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingIdentity,
    DenylistedCommunity,
    SentinelAuthor,
    InjectionDetected,
    AlreadyPersisted,
    SeenThisRun,
}

impl Rejection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::MissingIdentity => "missing_identity",
            Rejection::DenylistedCommunity => "denylisted_community",
            Rejection::SentinelAuthor => "sentinel_author",
            Rejection::InjectionDetected => "injection_detected",
            Rejection::AlreadyPersisted => "already_persisted",
            Rejection::SeenThisRun => "seen_this_run",
        }
    }
}

/// Tracks which `(source, external_id)` keys a run already holds.
///
/// Seeded from the leads persisted before this invocation and extended with
/// every key admitted during it. Only admitted keys are remembered, so the set
/// of admitted keys does not depend on the order posts arrive in.
#[derive(Debug, Default)]
pub struct DedupLedger {
    persisted: HashSet<(String, String)>,
    seen: HashSet<(String, String)>,
}

impl DedupLedger {
    pub fn new(persisted: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            persisted: persisted.into_iter().collect(),
            seen: HashSet::new(),
        }
    }

    /// Screens one post and, when it passes, returns the sanitized lead to
    /// persist and marks its key as seen.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] that applies.
    pub fn admit(&mut self, source: &str, post: &NormalizedPost) -> Result<NewLead, Rejection> {
        let external_id = post.external_id.trim();
        if external_id.is_empty() {
            return Err(Rejection::MissingIdentity);
        }
        if post
            .community
            .as_deref()
            .is_some_and(is_denylisted_community)
        {
            return Err(Rejection::DenylistedCommunity);
        }
        if is_sentinel_author(&post.author) {
            return Err(Rejection::SentinelAuthor);
        }

        let key = (source.to_owned(), external_id.to_owned());
        if self.persisted.contains(&key) {
            return Err(Rejection::AlreadyPersisted);
        }
        if self.seen.contains(&key) {
            return Err(Rejection::SeenThisRun);
        }

        let title = sanitize(&post.title);
        let content = sanitize(&post.content);
        if title.injection_detected || content.injection_detected {
            return Err(Rejection::InjectionDetected);
        }

        self.seen.insert(key);
        Ok(NewLead {
            source: source.to_owned(),
            external_id: external_id.to_owned(),
            title: title.content,
            content: content.content,
            author: post.author.trim().to_owned(),
            url: post.url.clone(),
            community: post.community.clone(),
            score: post.score,
            num_comments: post.num_comments,
            published_at: post.created_utc,
        })
    }

    /// Keys admitted during this invocation.
    #[must_use]
    pub fn admitted(&self) -> usize {
        self.seen.len()
    }
}
