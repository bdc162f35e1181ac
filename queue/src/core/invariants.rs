//! Semantic invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::types::{ItemStatus, QueueDocument, QueueItem};

/// Check document-level invariants:
/// - `totalItems` equals the number of items
/// - No duplicate ids
/// - `completedCount` equals the number of completed items
/// - Per-item fields agree with the item status
pub fn validate_invariants(doc: &QueueDocument) -> Vec<String> {
    let mut errors = Vec::new();

    if doc.total_items != doc.items.len() {
        errors.push(format!(
            "totalItems {} does not match {} items",
            doc.total_items,
            doc.items.len()
        ));
    }

    let completed = doc
        .items
        .iter()
        .filter(|item| item.status == ItemStatus::Completed)
        .count();
    if doc.completed_count != completed {
        errors.push(format!(
            "completedCount {} does not match {} completed items",
            doc.completed_count, completed
        ));
    }

    let mut seen = HashSet::new();
    for item in &doc.items {
        if !seen.insert(item.id.as_str()) {
            errors.push(format!("duplicate id '{}'", item.id));
        }
        validate_item(item, &mut errors);
    }

    errors
}

fn validate_item(item: &QueueItem, errors: &mut Vec<String>) {
    let id = &item.id;
    if item.guesser_model_id.trim().is_empty() {
        errors.push(format!("{id}: guesserModelId must be non-empty"));
    }
    if item.answerer_model_id.trim().is_empty() {
        errors.push(format!("{id}: answererModelId must be non-empty"));
    }

    match item.status {
        ItemStatus::Pending => {
            if item.run_id.is_some() || item.completed_at.is_some() || item.error.is_some() {
                errors.push(format!(
                    "{id}: pending item must not carry runId, completedAt, or error"
                ));
            }
        }
        ItemStatus::Running => {
            if item.run_id.is_none() {
                errors.push(format!("{id}: running item is missing runId"));
            }
            if item.completed_at.is_some() || item.error.is_some() {
                errors.push(format!("{id}: running item must not be finished"));
            }
        }
        ItemStatus::Completed => {
            if item.completed_at.is_none() {
                errors.push(format!("{id}: completed item is missing completedAt"));
            }
            if item.error.is_some() {
                errors.push(format!("{id}: completed item must not carry an error"));
            }
        }
        ItemStatus::Failed => {
            if item.completed_at.is_none() {
                errors.push(format!("{id}: failed item is missing completedAt"));
            }
            if item.error.is_none() {
                errors.push(format!("{id}: failed item is missing error"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{document, item};

    #[test]
    fn well_formed_document_has_no_errors() {
        let mut doc = document(vec![
            item("a", ItemStatus::Pending),
            item("b", ItemStatus::Running),
            item("c", ItemStatus::Completed),
            item("d", ItemStatus::Failed),
        ]);
        doc.completed_count = 1;
        assert!(validate_invariants(&doc).is_empty());
    }

    #[test]
    fn reports_counter_and_identity_errors() {
        let mut doc = document(vec![
            item("dup", ItemStatus::Completed),
            item("dup", ItemStatus::Pending),
        ]);
        doc.total_items = 3;
        doc.completed_count = 2;
        doc.items[1].run_id = Some("run-1".to_string());

        let errors = validate_invariants(&doc);
        assert!(errors.iter().any(|err| err.contains("totalItems")));
        assert!(errors.iter().any(|err| err.contains("completedCount")));
        assert!(errors.iter().any(|err| err.contains("duplicate id 'dup'")));
        assert!(errors.iter().any(|err| err.contains("pending item")));
    }
}
