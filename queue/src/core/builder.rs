//! Combinatorial expansion of models × secrets into queue items.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::core::types::{QueueDocument, QueueItem, SecretEntry};
use crate::error::{QueueError, Result};

/// How the builder pairs guessers, answerers, and secrets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationPolicy {
    /// Every guesser × answerer × secret, ordered iteration → guesser → answerer → secret.
    CrossProduct,
    /// Every guesser × secret with one randomly drawn answerer per pairing,
    /// ordered iteration → secret → guesser.
    #[default]
    RandomAnswerer,
}

impl GenerationPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationPolicy::CrossProduct => "cross-product",
            GenerationPolicy::RandomAnswerer => "random-answerer",
        }
    }
}

impl fmt::Display for GenerationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cross-product" => Ok(GenerationPolicy::CrossProduct),
            "random-answerer" => Ok(GenerationPolicy::RandomAnswerer),
            other => Err(format!(
                "unknown generation policy '{other}' (expected cross-product or random-answerer)"
            )),
        }
    }
}

/// Ordered inputs for queue generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePlan {
    pub guessers: Vec<String>,
    pub answerers: Vec<String>,
    pub secrets: Vec<SecretEntry>,
    /// Number of times the whole expansion is repeated. Zero yields no items.
    pub iterations: u32,
}

impl QueuePlan {
    /// Model ids end up in every generated item and must be non-blank.
    pub fn validate(&self) -> Result<()> {
        for (role, roster) in [("guesser", &self.guessers), ("answerer", &self.answerers)] {
            if let Some(index) = roster.iter().position(|id| id.trim().is_empty()) {
                return Err(QueueError::InvalidInput(format!(
                    "{role} model id at position {index} is blank"
                )));
            }
        }
        Ok(())
    }
}

/// Sequential item id (`item-00000`, `item-00001`, ...).
pub fn item_id(index: usize) -> String {
    format!("item-{index:05}")
}

/// Expand `plan` under `policy` into queue items.
///
/// The random source is only consulted by [`GenerationPolicy::RandomAnswerer`].
pub fn generate_items<R: Rng + ?Sized>(
    plan: &QueuePlan,
    policy: GenerationPolicy,
    rng: &mut R,
) -> Vec<QueueItem> {
    let mut items = Vec::new();
    let mut next = |guesser: &str, answerer: &str, secret: &SecretEntry| {
        let id = item_id(items.len());
        items.push(QueueItem::pending(id, guesser, answerer, secret.clone()));
    };

    for _ in 0..plan.iterations {
        match policy {
            GenerationPolicy::CrossProduct => {
                for guesser in &plan.guessers {
                    for answerer in &plan.answerers {
                        for secret in &plan.secrets {
                            next(guesser.as_str(), answerer.as_str(), secret);
                        }
                    }
                }
            }
            GenerationPolicy::RandomAnswerer => {
                for secret in &plan.secrets {
                    for guesser in &plan.guessers {
                        if let Some(answerer) = plan.answerers.choose(rng) {
                            next(guesser.as_str(), answerer.as_str(), secret);
                        }
                    }
                }
            }
        }
    }

    items
}

/// Build a fresh document (`completedCount = 0`). Does not persist.
pub fn build_queue<R: Rng + ?Sized>(
    plan: &QueuePlan,
    policy: GenerationPolicy,
    created_at: DateTime<Utc>,
    rng: &mut R,
) -> Result<QueueDocument> {
    plan.validate()?;
    Ok(QueueDocument::new(
        created_at,
        generate_items(plan, policy, rng),
    ))
}
