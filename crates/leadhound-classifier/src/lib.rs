//! Qualification classifier for LeadHound.
//!
//! Candidates are scored in fixed-size batches by an LLM under a strict
//! buyer-intent rubric. The caller keeps a candidate only when its relevance
//! reaches [`MIN_RELEVANCE_SCORE`].

pub mod error;
pub mod openai;
pub mod prompt;
pub mod response;
pub mod types;

pub use error::ClassifierError;
pub use openai::OpenAiClassifier;
pub use types::{ClassifyContext, ClassifyItem, Classifier, Verdict};

/// Candidates per classifier call.
pub const BATCH_SIZE: usize = 10;

/// Lowest relevance a lead may have and still be kept.
pub const MIN_RELEVANCE_SCORE: u8 = 60;

/// Characters of post body sent to the model per candidate.
pub const CONTENT_CHAR_LIMIT: usize = 1_500;
