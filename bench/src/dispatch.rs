//! Dispatch session for `bench run`.
//!
//! A session owns the queue for its whole lifetime: it takes the session lock,
//! recovers interrupted items, then plays pending items in order until the
//! queue is drained or the limit is hit.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use queue::{ItemStatus, QueueItem, QueueStore, SessionLock};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{info, instrument, warn};

use crate::catalog::LoadedCatalog;
use crate::game::{GameRequest, GameRunner};
use crate::results::{ResultEntry, ResultSink};

/// Session options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Stop after this many items were attempted.
    pub limit: Option<usize>,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStop {
    /// No pending items remain.
    Exhausted,
    /// `limit` items were attempted.
    LimitReached,
}

/// Outcome of one attempted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub item_id: String,
    pub run_id: String,
    pub status: ItemStatus,
    pub error: Option<String>,
}

/// Summary of a dispatch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub recovered: usize,
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub stop: DispatchStop,
}

/// Run one dispatch session against `store`.
///
/// Game, lookup, and result-log failures are recorded on the item and the
/// session continues. Store failures (I/O, corrupt document, lock) end the
/// session with an error.
#[instrument(skip_all, fields(queue = %store.path().display(), limit = ?options.limit))]
pub fn run_session<G: GameRunner, S: ResultSink, F: FnMut(&ItemOutcome)>(
    store: &QueueStore,
    catalog: &LoadedCatalog,
    game: &G,
    sink: &S,
    options: &DispatchOptions,
    mut on_item: F,
) -> Result<DispatchSummary> {
    let _lock = SessionLock::acquire(store.path()).context("acquire session lock")?;
    let mut doc = store.load().context("load queue")?.ok_or_else(|| {
        anyhow!(
            "no queue at {} (run `bench create` first)",
            store.path().display()
        )
    })?;

    let recovered = store.recover(&mut doc).context("recover interrupted items")?;
    info!(recovered, total = doc.total_items, "dispatch session started");

    let mut summary = DispatchSummary {
        recovered,
        attempted: 0,
        completed: 0,
        failed: 0,
        stop: DispatchStop::Exhausted,
    };

    loop {
        if options.limit.is_some_and(|limit| summary.attempted >= limit) {
            summary.stop = DispatchStop::LimitReached;
            break;
        }
        let Some(item) = store.next_pending(&doc).cloned() else {
            summary.stop = DispatchStop::Exhausted;
            break;
        };

        let run_id = generate_run_id();
        store
            .mark_running(&mut doc, &item.id, &run_id)
            .with_context(|| format!("mark {} running", item.id))?;
        summary.attempted += 1;

        let outcome = match play_item(catalog, game, sink, &run_id, &item) {
            Ok(()) => {
                store
                    .mark_completed(&mut doc, &item.id)
                    .with_context(|| format!("mark {} completed", item.id))?;
                summary.completed += 1;
                info!(item_id = %item.id, run_id = %run_id, "item completed");
                ItemOutcome {
                    item_id: item.id.clone(),
                    run_id,
                    status: ItemStatus::Completed,
                    error: None,
                }
            }
            Err(err) => {
                let text = format!("{err:#}");
                warn!(item_id = %item.id, run_id = %run_id, error = %text, "item failed");
                store
                    .mark_failed(&mut doc, &item.id, &text)
                    .with_context(|| format!("mark {} failed", item.id))?;
                summary.failed += 1;
                ItemOutcome {
                    item_id: item.id.clone(),
                    run_id,
                    status: ItemStatus::Failed,
                    error: Some(text),
                }
            }
        };
        on_item(&outcome);
    }

    info!(
        attempted = summary.attempted,
        completed = summary.completed,
        failed = summary.failed,
        stop = ?summary.stop,
        "dispatch session finished"
    );
    Ok(summary)
}

fn play_item<G: GameRunner, S: ResultSink>(
    catalog: &LoadedCatalog,
    game: &G,
    sink: &S,
    run_id: &str,
    item: &QueueItem,
) -> Result<()> {
    let guesser = catalog
        .catalog
        .resolve(&item.guesser_model_id)
        .ok_or_else(|| anyhow!("unknown guesser model {}", item.guesser_model_id))?;
    let answerer = catalog
        .catalog
        .resolve(&item.answerer_model_id)
        .ok_or_else(|| anyhow!("unknown answerer model {}", item.answerer_model_id))?;

    let request = GameRequest {
        run_id,
        item,
        guesser,
        answerer,
    };
    let report = game.play(&request).context("play game")?;

    let entry = ResultEntry::new(
        run_id,
        item,
        guesser,
        answerer,
        &catalog.sha256,
        report.transcript,
    );
    sink.record(&entry).context("record result")?;
    Ok(())
}

/// `run-<UTC timestamp>-<6 lowercase alphanumerics>`.
pub fn generate_run_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format!("run-{}-{suffix}", Utc::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use queue::test_support::{fixed_time, temp_store};
    use queue::{GenerationPolicy, QueuePlan, SecretEntry, build_queue};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    use super::*;
    use crate::catalog::load_catalog;
    use crate::game::GameReport;

    /// Game that returns scripted outcomes in order and records what it saw.
    struct ScriptedGame {
        outcomes: RefCell<VecDeque<std::result::Result<(), String>>>,
        seen: RefCell<Vec<(String, String)>>,
    }

    impl ScriptedGame {
        fn new(outcomes: Vec<std::result::Result<(), String>>) -> Self {
            Self {
                outcomes: RefCell::new(outcomes.into()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl GameRunner for ScriptedGame {
        fn play(&self, request: &GameRequest<'_>) -> Result<GameReport> {
            self.seen
                .borrow_mut()
                .push((request.item.id.clone(), request.run_id.to_string()));
            match self.outcomes.borrow_mut().pop_front() {
                Some(Ok(())) | None => Ok(GameReport {
                    transcript: json!({"won": true, "item": request.item.id}),
                }),
                Some(Err(text)) => Err(anyhow!(text)),
            }
        }
    }

    #[derive(Default)]
    struct MemorySink {
        entries: RefCell<Vec<ResultEntry>>,
    }

    impl ResultSink for MemorySink {
        fn record(&self, entry: &ResultEntry) -> Result<()> {
            self.entries.borrow_mut().push(entry.clone());
            Ok(())
        }
    }

    fn create_queue(store: &QueueStore, guessers: &[&str]) {
        let plan = QueuePlan {
            guessers: guessers.iter().map(|s| s.to_string()).collect(),
            answerers: vec!["claudeSonnet4_5_high".to_string()],
            secrets: vec![
                SecretEntry::new("place", "Svalbard"),
                SecretEntry::new("creature", "aardvark"),
            ],
            iterations: 1,
        };
        let doc = build_queue(
            &plan,
            GenerationPolicy::CrossProduct,
            fixed_time(),
            &mut StdRng::seed_from_u64(1),
        )
        .expect("build");
        store.save(&doc).expect("save");
    }

    #[test]
    fn drains_queue_recording_successes_and_failures() {
        let (_temp, store) = temp_store();
        create_queue(&store, &["grok4", "glm_4_7"]);
        let catalog = load_catalog(None).expect("catalog");
        let game = ScriptedGame::new(vec![Ok(()), Err("rate limited".to_string())]);
        let sink = MemorySink::default();

        let mut outcomes = Vec::new();
        let summary = run_session(
            &store,
            &catalog,
            &game,
            &sink,
            &DispatchOptions::default(),
            |outcome| outcomes.push(outcome.clone()),
        )
        .expect("session");

        assert_eq!(summary.attempted, 4);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.stop, DispatchStop::Exhausted);
        assert_eq!(outcomes[1].status, ItemStatus::Failed);
        assert!(
            outcomes[1]
                .error
                .as_deref()
                .is_some_and(|e| e.contains("rate limited"))
        );

        let doc = store.load().expect("load").expect("present");
        assert_eq!(doc.completed_count, 3);
        let failed = doc.item("item-00001").expect("failed item");
        assert_eq!(failed.status, ItemStatus::Failed);

        let entries = sink.entries.borrow();
        assert_eq!(entries.len(), 3);
        for entry in entries.iter() {
            let item = doc.item(&entry.item_id).expect("logged item");
            assert_eq!(item.run_id.as_deref(), Some(entry.run_id.as_str()));
            assert_eq!(entry.catalog_sha256, catalog.sha256);
        }
    }

    #[test]
    fn recovers_interrupted_items_before_dispatching() {
        let (_temp, store) = temp_store();
        create_queue(&store, &["grok4"]);
        let mut doc = store.load().expect("load").expect("present");
        store
            .mark_running(&mut doc, "item-00000", "run-crashed")
            .expect("running");

        let catalog = load_catalog(None).expect("catalog");
        let game = ScriptedGame::new(Vec::new());
        let sink = MemorySink::default();
        let summary = run_session(
            &store,
            &catalog,
            &game,
            &sink,
            &DispatchOptions { limit: Some(1) },
            |_| {},
        )
        .expect("session");

        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.stop, DispatchStop::LimitReached);
        let seen = game.seen.borrow();
        assert_eq!(seen[0].0, "item-00000");
        assert_ne!(seen[0].1, "run-crashed");

        let doc = store.load().expect("load").expect("present");
        assert_eq!(doc.item("item-00000").expect("item").status, ItemStatus::Completed);
        assert_eq!(doc.item("item-00001").expect("item").status, ItemStatus::Pending);
    }

    #[test]
    fn unknown_model_fails_item_without_playing() {
        let (_temp, store) = temp_store();
        create_queue(&store, &["retired_model"]);
        let catalog = load_catalog(None).expect("catalog");
        let game = ScriptedGame::new(Vec::new());
        let sink = MemorySink::default();

        let summary = run_session(
            &store,
            &catalog,
            &game,
            &sink,
            &DispatchOptions::default(),
            |_| {},
        )
        .expect("session");

        assert_eq!(summary.failed, 2);
        assert!(game.seen.borrow().is_empty());
        let doc = store.load().expect("load").expect("present");
        let error = doc.item("item-00000").and_then(|i| i.error.clone());
        assert!(error.is_some_and(|e| e.contains("unknown guesser model retired_model")));
    }

    #[test]
    fn refuses_missing_queue_and_held_lock() {
        let (_temp, store) = temp_store();
        let catalog = load_catalog(None).expect("catalog");
        let game = ScriptedGame::new(Vec::new());
        let sink = MemorySink::default();
        let options = DispatchOptions::default();

        let err = run_session(&store, &catalog, &game, &sink, &options, |_| {})
            .expect_err("no queue");
        assert!(format!("{err:#}").contains("bench create"));

        create_queue(&store, &["grok4"]);
        let _held = SessionLock::acquire(store.path()).expect("lock");
        let err = run_session(&store, &catalog, &game, &sink, &options, |_| {})
            .expect_err("locked");
        assert!(format!("{err:#}").contains("locked"));
    }

    #[test]
    fn run_ids_are_prefixed_and_distinct() {
        let first = generate_run_id();
        let second = generate_run_id();
        assert!(first.starts_with("run-"));
        assert_eq!(first.len(), "run-20260101_000000-abcdef".len());
        assert_ne!(first, second);
    }
}
