//! Search connectors for LeadHound.
//!
//! Every supported platform sits behind [`SearchConnector`], which returns
//! posts in the shared [`NormalizedPost`](leadhound_core::NormalizedPost)
//! shape. Callers go through [`fetch`], which never fails: a broken query
//! yields an empty result and a warning so sibling queries keep running.

pub mod connector;
pub mod error;
pub mod fetch;
pub mod hackernews;
pub mod reddit;
pub mod registry;
pub mod retry;
pub mod unsupported;

pub use connector::{SearchConnector, SearchOptions, SearchSort};
pub use error::SourceError;
pub use fetch::{fetch, FetchResult};
pub use hackernews::HackerNewsConnector;
pub use reddit::{RedditConnector, RedditCredentials};
pub use registry::ConnectorRegistry;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use unsupported::UnsupportedConnector;
