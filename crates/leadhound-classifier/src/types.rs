use async_trait::async_trait;
use leadhound_core::Intent;
use serde::Serialize;

use crate::error::ClassifierError;

/// One candidate as presented to the model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyItem {
    pub external_id: String,
    pub title: String,
    /// Sanitized body; truncated before it is sent.
    pub content: String,
    pub community: Option<String>,
}

/// What the customer sells, so the model can judge fit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyContext {
    pub description: String,
    pub keywords: Vec<String>,
    pub website_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub external_id: String,
    pub intent: Intent,
    /// 0..=100.
    pub relevance: u8,
    pub reason: String,
}

/// Scores a batch of candidates for buying intent.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns exactly one verdict per item, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError`] when the service fails or its answer does
    /// not cover the batch with valid verdicts.
    async fn classify(
        &self,
        batch: &[ClassifyItem],
        context: &ClassifyContext,
    ) -> Result<Vec<Verdict>, ClassifierError>;
}
