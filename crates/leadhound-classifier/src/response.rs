//! Validation of the model's structured reply.

use std::collections::HashMap;

use leadhound_core::Intent;
use serde::Deserialize;

use crate::error::ClassifierError;
use crate::types::{ClassifyItem, Verdict};

#[derive(Debug, Deserialize)]
struct Reply {
    verdicts: Vec<RawVerdict>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    external_id: String,
    intent: String,
    relevance: f64,
    #[serde(default)]
    reason: String,
}

/// Parses `{"verdicts":[...]}` and checks it covers `batch` exactly once.
///
/// Verdicts are returned in batch order.
///
/// # Errors
///
/// Returns [`ClassifierError::Malformed`] for invalid JSON, an unknown
/// intent, a relevance that is not a whole number in 0..=100, an id not in the batch, a duplicate
/// verdict, or a missing verdict.
pub fn parse_verdicts(raw: &str, batch: &[ClassifyItem]) -> Result<Vec<Verdict>, ClassifierError> {
    let reply: Reply = serde_json::from_str(raw)
        .map_err(|e| ClassifierError::Malformed(format!("reply is not a verdict object: {e}")))?;

    let mut by_id: HashMap<String, Verdict> = HashMap::with_capacity(reply.verdicts.len());
    for raw in reply.verdicts {
        if !batch.iter().any(|item| item.external_id == raw.external_id) {
            return Err(ClassifierError::Malformed(format!(
                "verdict for unknown id {}",
                raw.external_id
            )));
        }
        let intent: Intent = raw.intent.parse().map_err(|_| {
            ClassifierError::Malformed(format!(
                "unknown intent {:?} for {}",
                raw.intent, raw.external_id
            ))
        })?;
        let relevance = to_relevance(raw.relevance).ok_or_else(|| {
            ClassifierError::Malformed(format!(
                "relevance {} is not a whole number in 0..=100 for {}",
                raw.relevance, raw.external_id
            ))
        })?;

        let verdict = Verdict {
            external_id: raw.external_id.clone(),
            intent,
            relevance,
            reason: raw.reason.trim().to_owned(),
        };
        if by_id.insert(raw.external_id.clone(), verdict).is_some() {
            return Err(ClassifierError::Malformed(format!(
                "duplicate verdict for {}",
                raw.external_id
            )));
        }
    }

    batch
        .iter()
        .map(|item| {
            by_id.remove(&item.external_id).ok_or_else(|| {
                ClassifierError::Malformed(format!("no verdict for {}", item.external_id))
            })
        })
        .collect()
}

// Only whole scores are valid; 59.5 must not round up to the floor.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_relevance(value: f64) -> Option<u8> {
    if value.is_finite() && value.fract() == 0.0 && (0.0..=100.0).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}
