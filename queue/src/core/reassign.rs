//! Answerer reassignment for items that have not started yet.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::core::types::{ItemStatus, QueueDocument};
use crate::error::{QueueError, Result};

/// What a reassignment changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassignSummary {
    pub replaced: usize,
    /// Replacement answerer id → number of items it was assigned to.
    pub distribution: BTreeMap<String, usize>,
}

/// Give every pending item answered by `from` a randomly drawn replacement.
///
/// Items that are running or finished keep their answerer, so recorded
/// transcripts stay consistent with the queue.
pub fn reassign_answerers<R: Rng + ?Sized>(
    doc: &mut QueueDocument,
    from: &str,
    replacements: &[String],
    rng: &mut R,
) -> Result<ReassignSummary> {
    if replacements.is_empty() {
        return Err(QueueError::InvalidInput(
            "replacement answerer list must be non-empty".to_string(),
        ));
    }
    if replacements.iter().any(|id| id.trim().is_empty()) {
        return Err(QueueError::InvalidInput(
            "replacement answerer ids must be non-empty".to_string(),
        ));
    }

    let mut summary = ReassignSummary::default();
    for item in doc
        .items
        .iter_mut()
        .filter(|item| item.status == ItemStatus::Pending && item.answerer_model_id == from)
    {
        let Some(replacement) = replacements.choose(rng) else {
            break;
        };
        item.answerer_model_id = replacement.clone();
        summary.replaced += 1;
        *summary.distribution.entry(replacement.clone()).or_insert(0) += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::test_support::{document, item_with_models};

    #[test]
    fn replaces_only_pending_matches() {
        let mut doc = document(vec![
            item_with_models("a", "g1", "opus", ItemStatus::Pending),
            item_with_models("b", "g1", "opus", ItemStatus::Running),
            item_with_models("c", "g2", "opus", ItemStatus::Completed),
            item_with_models("d", "g2", "sonnet", ItemStatus::Pending),
            item_with_models("e", "g3", "opus", ItemStatus::Pending),
        ]);
        let replacements = vec!["gpt".to_string(), "gemini".to_string()];
        let mut rng = StdRng::seed_from_u64(3);

        let summary =
            reassign_answerers(&mut doc, "opus", &replacements, &mut rng).expect("reassign");

        assert_eq!(summary.replaced, 2);
        assert_eq!(summary.distribution.values().sum::<usize>(), 2);
        for id in ["a", "e"] {
            let answerer = &doc.item(id).expect("item").answerer_model_id;
            assert!(replacements.contains(answerer), "{id} got {answerer}");
        }
        assert_eq!(doc.item("b").expect("b").answerer_model_id, "opus");
        assert_eq!(doc.item("c").expect("c").answerer_model_id, "opus");
        assert_eq!(doc.item("d").expect("d").answerer_model_id, "sonnet");
    }

    #[test]
    fn rejects_empty_replacements() {
        let mut doc = document(vec![item_with_models("a", "g", "opus", ItemStatus::Pending)]);
        let mut rng = StdRng::seed_from_u64(0);
        let err = reassign_answerers(&mut doc, "opus", &[], &mut rng).expect_err("empty");
        assert!(matches!(err, QueueError::InvalidInput(_)));
        assert_eq!(doc.items[0].answerer_model_id, "opus");
    }
}
