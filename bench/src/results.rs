//! Append-only result log (`benchmark-results.jsonl`).
//!
//! One JSON object per finished run. The `runId` joins an entry to its queue
//! item. `won` and `totalQuestions` are lifted out of the transcript when the
//! game reports them, so the log can be summarised without knowing the
//! transcript layout.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use queue::{QueueItem, SecretEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::ResolvedModel;

/// Model identity recorded with a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub id: String,
    pub name: String,
    pub provider: String,
}

impl From<ResolvedModel<'_>> for ModelRef {
    fn from(resolved: ResolvedModel<'_>) -> Self {
        Self {
            id: resolved.model.id.clone(),
            name: resolved.model.name.clone(),
            provider: resolved.model.provider.clone(),
        }
    }
}

/// One line of the result log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub item_id: String,
    pub guesser: ModelRef,
    pub answerer: ModelRef,
    pub secret: SecretEntry,
    /// SHA-256 of the catalog the run was resolved against.
    pub catalog_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub won: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<u64>,
    pub transcript: Value,
}

impl ResultEntry {
    pub fn new(
        run_id: &str,
        item: &QueueItem,
        guesser: ResolvedModel<'_>,
        answerer: ResolvedModel<'_>,
        catalog_sha256: &str,
        transcript: Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id: run_id.to_string(),
            item_id: item.id.clone(),
            guesser: guesser.into(),
            answerer: answerer.into(),
            secret: item.secret.clone(),
            catalog_sha256: catalog_sha256.to_string(),
            won: transcript.get("won").and_then(Value::as_bool),
            total_questions: transcript.get("totalQuestions").and_then(Value::as_u64),
            transcript,
        }
    }
}

/// Aggregate view of the result log.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResultsSummary {
    pub entries: usize,
    pub won: usize,
    pub lost: usize,
    /// Mean `totalQuestions` over entries that report it.
    pub mean_questions: Option<f64>,
}

/// Destination for finished-run records.
pub trait ResultSink {
    fn record(&self, entry: &ResultEntry) -> Result<()>;
}

/// JSONL file sink. Parent directories are created on first write.
#[derive(Debug, Clone)]
pub struct JsonlResults {
    path: PathBuf,
}

impl JsonlResults {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Summarise recorded entries; empty when the log does not exist yet.
    pub fn summary(&self) -> Result<ResultsSummary> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ResultsSummary::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("open {}", self.path.display()));
            }
        };
        let mut summary = ResultsSummary::default();
        let (mut questions, mut reported) = (0u64, 0u64);
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("read {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: ResultEntry = serde_json::from_str(&line)
                .with_context(|| format!("parse {} line {}", self.path.display(), index + 1))?;
            summary.entries += 1;
            match entry.won {
                Some(true) => summary.won += 1,
                Some(false) => summary.lost += 1,
                None => {}
            }
            if let Some(total) = entry.total_questions {
                questions += total;
                reported += 1;
            }
        }
        if reported > 0 {
            summary.mean_questions = Some(questions as f64 / reported as f64);
        }
        Ok(summary)
    }
}

impl ResultSink for JsonlResults {
    fn record(&self, entry: &ResultEntry) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create results dir {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(entry).context("serialize result entry")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        debug!(run_id = %entry.run_id, path = %self.path.display(), "result recorded");
        Ok(())
    }
}
