//! Session-level lifecycle tests for the persisted queue.
//!
//! These drive the store the way a dispatcher does (lock, recover, pick, mark)
//! across simulated process restarts and verify no item is lost or counted
//! twice.

use queue::core::invariants::validate_invariants;
use queue::test_support::{fixed_time, sample_plan, temp_store};
use queue::{GenerationPolicy, ItemStatus, QueueStore, SessionLock, Transition, build_queue};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn create(store: &QueueStore) {
    let mut rng = StdRng::seed_from_u64(5);
    let doc = build_queue(
        &sample_plan(),
        GenerationPolicy::CrossProduct,
        fixed_time(),
        &mut rng,
    )
    .expect("build");
    store.save(&doc).expect("save");
}

/// Session 1 finishes two items, fails one, and "crashes" with one running.
/// Session 2 recovers the running item and drains the queue.
#[test]
fn interrupted_session_resumes_without_loss() {
    let (_temp, store) = temp_store();
    create(&store);

    {
        let _lock = SessionLock::acquire(store.path()).expect("lock 1");
        let mut doc = store.load().expect("load").expect("present");
        assert_eq!(store.recover(&mut doc).expect("recover"), 0);

        for (index, outcome) in [Ok(()), Err("timeout"), Ok(())].into_iter().enumerate() {
            let id = store.next_pending(&doc).expect("pending").id.clone();
            store
                .mark_running(&mut doc, &id, &format!("s1-run-{index}"))
                .expect("running");
            match outcome {
                Ok(()) => {
                    store.mark_completed(&mut doc, &id).expect("completed");
                }
                Err(text) => {
                    store.mark_failed(&mut doc, &id, text).expect("failed");
                }
            }
        }

        let id = store.next_pending(&doc).expect("pending").id.clone();
        store.mark_running(&mut doc, &id, "s1-crash").expect("running");
        // Process dies here: lock released, item left running.
    }

    let _lock = SessionLock::acquire(store.path()).expect("lock 2");
    let mut doc = store.load().expect("load").expect("present");
    assert_eq!(doc.completed_count, 2);
    assert_eq!(store.progress(&doc).running, 1);

    assert_eq!(store.recover(&mut doc).expect("recover"), 1);
    let resumed = store.next_pending(&doc).expect("pending");
    assert_eq!(resumed.id, "item-00003");
    assert!(resumed.run_id.is_none());

    let mut run = 0;
    while let Some(next) = store.next_pending(&doc) {
        let id = next.id.clone();
        store
            .mark_running(&mut doc, &id, &format!("s2-run-{run}"))
            .expect("running");
        store.mark_completed(&mut doc, &id).expect("completed");
        run += 1;
    }

    let on_disk = store.load().expect("load").expect("present");
    assert_eq!(on_disk, doc);
    assert!(validate_invariants(&on_disk).is_empty());

    let progress = store.progress(&on_disk);
    assert_eq!(progress.total, 30);
    assert_eq!(progress.completed, 29);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.pending + progress.running, 0);
    assert_eq!(progress.percent_complete, 97);

    let failed = on_disk.item("item-00001").expect("failed item");
    assert_eq!(failed.status, ItemStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("timeout"));
}

#[test]
fn concurrent_session_is_refused() {
    let (_temp, store) = temp_store();
    create(&store);
    let _held = SessionLock::acquire(store.path()).expect("lock");
    let err = SessionLock::acquire(store.path()).expect_err("second session");
    assert!(matches!(err, queue::QueueError::Locked { .. }));
}

#[test]
fn duplicate_completion_reports_are_idempotent_across_reloads() {
    let (_temp, store) = temp_store();
    create(&store);

    let mut doc = store.load().expect("load").expect("present");
    store.mark_running(&mut doc, "item-00000", "run-1").expect("running");
    store.mark_completed(&mut doc, "item-00000").expect("completed");

    let mut reloaded = store.load().expect("load").expect("present");
    let transition = store
        .mark_completed(&mut reloaded, "item-00000")
        .expect("repeat");
    assert_eq!(transition, Transition::Unchanged);
    assert_eq!(store.load().expect("load").expect("present").completed_count, 1);
}
