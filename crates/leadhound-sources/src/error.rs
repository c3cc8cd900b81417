use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by {platform}")]
    RateLimited { platform: &'static str },

    #[error("unexpected HTTP status {status} from {platform}")]
    UnexpectedStatus { platform: &'static str, status: u16 },

    #[error("{platform} authentication failed: {reason}")]
    Auth {
        platform: &'static str,
        reason: String,
    },
}
