//! Durable queue document storage and persisted state transitions.
//!
//! Every mutating call applies the transition to a copy of the caller's
//! document, writes the copy atomically, and only then publishes it back to
//! the caller. A failed write leaves the caller's document as it was.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use jsonschema::Validator;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::invariants::validate_invariants;
use crate::core::progress::{Progress, progress};
use crate::core::reassign::{ReassignSummary, reassign_answerers};
use crate::core::selector::next_pending;
use crate::core::transitions::{complete_item, fail_item, reset_running, start_item};
use crate::core::types::{QueueDocument, QueueItem, Transition};
use crate::error::{QueueError, Result};

const V1_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/queue.v1.schema.json"
));

static V1_VALIDATOR: LazyLock<std::result::Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(V1_SCHEMA).map_err(|err| format!("parse schema: {err}"))?;
    jsonschema::validator_for(&schema).map_err(|err| format!("compile schema: {err}"))
});

/// Owner of the persisted queue document.
///
/// Assumes a single writer; hold a [`SessionLock`](crate::io::lock::SessionLock)
/// on the same path while mutating.
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or `None` when nothing has been created yet.
    pub fn load(&self) -> Result<Option<QueueDocument>> {
        debug!(path = %self.path.display(), "loading queue");
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "queue absent");
                return Ok(None);
            }
            Err(err) => return Err(QueueError::io("read queue", &self.path, err)),
        };
        let doc = decode_document(&self.path, &contents)?;
        debug!(
            total_items = doc.total_items,
            completed_count = doc.completed_count,
            "queue loaded"
        );
        Ok(Some(doc))
    }

    /// Atomically overwrite the persisted document (temp file + rename).
    ///
    /// Refuses with `InvalidInput` to write anything [`load`](Self::load)
    /// would reject, so the file on disk always stays loadable.
    pub fn save(&self, doc: &QueueDocument) -> Result<()> {
        debug!(
            path = %self.path.display(),
            total_items = doc.total_items,
            completed_count = doc.completed_count,
            "writing queue"
        );
        let mut problems = schema_errors(&serde_json::to_value(doc)?)?;
        problems.extend(validate_invariants(doc));
        if !problems.is_empty() {
            return Err(QueueError::InvalidInput(format!(
                "refusing to save queue that would not load: {}",
                problems.join("; ")
            )));
        }
        let mut buf = serde_json::to_string_pretty(doc)?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }

    /// First pending item in generation order.
    pub fn next_pending<'a>(&self, doc: &'a QueueDocument) -> Option<&'a QueueItem> {
        next_pending(doc)
    }

    /// Mark a pending item as running under `run_id` and persist.
    pub fn mark_running(&self, doc: &mut QueueDocument, id: &str, run_id: &str) -> Result<()> {
        let mut next = doc.clone();
        start_item(&mut next, id, run_id)?;
        self.commit(doc, next)?;
        debug!(id, run_id, "item running");
        Ok(())
    }

    /// Mark an item completed and persist. Repeated calls are no-ops.
    pub fn mark_completed(&self, doc: &mut QueueDocument, id: &str) -> Result<Transition> {
        let mut next = doc.clone();
        let transition = complete_item(&mut next, id, Utc::now())?;
        if transition == Transition::Unchanged {
            debug!(id, "item already completed");
            return Ok(transition);
        }
        self.commit(doc, next)?;
        debug!(id, completed_count = doc.completed_count, "item completed");
        Ok(transition)
    }

    /// Mark an item failed with diagnostic text and persist.
    pub fn mark_failed(
        &self,
        doc: &mut QueueDocument,
        id: &str,
        error: &str,
    ) -> Result<Transition> {
        let mut next = doc.clone();
        let transition = fail_item(&mut next, id, error, Utc::now())?;
        if transition == Transition::Unchanged {
            debug!(id, "item already failed");
            return Ok(transition);
        }
        self.commit(doc, next)?;
        debug!(id, error, "item failed");
        Ok(transition)
    }

    /// Return every interrupted (`running`) item to `pending`.
    ///
    /// Must run before the first [`next_pending`](Self::next_pending) of a
    /// dispatch session. Writes only when something was reset.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn recover(&self, doc: &mut QueueDocument) -> Result<usize> {
        let mut next = doc.clone();
        let reset = reset_running(&mut next);
        if reset == 0 {
            info!("no interrupted items to recover");
            return Ok(0);
        }
        self.commit(doc, next)?;
        warn!(reset, "reset interrupted items to pending");
        Ok(reset)
    }

    /// Reassign pending items answered by `from`; persists when anything changed.
    pub fn reassign_answerers<R: Rng + ?Sized>(
        &self,
        doc: &mut QueueDocument,
        from: &str,
        replacements: &[String],
        rng: &mut R,
    ) -> Result<ReassignSummary> {
        let mut next = doc.clone();
        let summary = reassign_answerers(&mut next, from, replacements, rng)?;
        if summary.replaced > 0 {
            self.commit(doc, next)?;
        }
        info!(from, replaced = summary.replaced, "answerers reassigned");
        Ok(summary)
    }

    pub fn progress(&self, doc: &QueueDocument) -> Progress {
        progress(doc)
    }

    /// Irreversibly remove the persisted document. Returns whether one existed.
    pub fn delete_all(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                warn!(path = %self.path.display(), "queue deleted");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(QueueError::io("delete queue", &self.path, err)),
        }
    }

    fn commit(&self, doc: &mut QueueDocument, next: QueueDocument) -> Result<()> {
        self.save(&next)?;
        *doc = next;
        Ok(())
    }
}

/// Parse and validate a document: JSON, schema conformance, then invariants.
fn decode_document(path: &Path, contents: &str) -> Result<QueueDocument> {
    let value: Value = serde_json::from_str(contents)
        .map_err(|err| QueueError::corrupt(path, format!("parse json: {err}")))?;
    validate_schema(path, &value)?;
    let doc: QueueDocument = serde_json::from_value(value)
        .map_err(|err| QueueError::corrupt(path, format!("deserialize: {err}")))?;
    let errors = validate_invariants(&doc);
    if !errors.is_empty() {
        return Err(QueueError::corrupt(
            path,
            format!("invariant violations: {}", errors.join("; ")),
        ));
    }
    Ok(doc)
}

fn validate_schema(path: &Path, instance: &Value) -> Result<()> {
    let messages = schema_errors(instance)?;
    if !messages.is_empty() {
        return Err(QueueError::corrupt(
            path,
            format!("schema validation failed: {}", messages.join("; ")),
        ));
    }
    Ok(())
}

fn schema_errors(instance: &Value) -> Result<Vec<String>> {
    let validator = V1_VALIDATOR
        .as_ref()
        .map_err(|reason| QueueError::Schema(reason.clone()))?;
    Ok(validator
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| QueueError::io("create directory", parent, err))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .map_err(|err| QueueError::io("write temp queue", &tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| QueueError::io("replace queue", path, err))?;
    Ok(())
}
