//! Twenty-questions benchmark driver.
//!
//! Builds the work queue (`.bench/queue.json`) from the model catalog, then
//! dispatches pending runs one at a time. Sessions are resumable: interrupted
//! runs are recovered at the start of the next session.

mod catalog;
mod config;
mod dispatch;
mod exit_codes;
mod game;
mod logging;
mod process;
mod results;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use queue::{GenerationPolicy, ItemStatus, QueueDocument, QueueStore, SessionLock, build_queue};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::catalog::{LoadedCatalog, load_catalog};
use crate::config::{BenchConfig, load_config};
use crate::dispatch::{DispatchOptions, DispatchStop, run_session};
use crate::game::CommandGame;
use crate::results::JsonlResults;

#[derive(Parser)]
#[command(
    name = "bench",
    version,
    about = "Resumable work queue for the twenty-questions benchmark"
)]
struct Cli {
    /// Path to the bench config (missing file means defaults).
    #[arg(long, global = true, default_value = "bench.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the queue from the catalog and save it.
    Create {
        /// Override `generation.policy`.
        #[arg(long)]
        policy: Option<GenerationPolicy>,
        /// Override `generation.iterations`.
        #[arg(long)]
        iterations: Option<u32>,
        /// Override `generation.seed`.
        #[arg(long)]
        seed: Option<u64>,
        /// Replace an existing queue.
        #[arg(short, long)]
        force: bool,
    },
    /// Print queue progress.
    Status {
        /// Also list failed items with their errors.
        #[arg(long)]
        failed: bool,
    },
    /// Print the next pending item (exit 2 when none).
    Next,
    /// Return interrupted (running) items to pending.
    Recover,
    /// Move pending items off an answerer model.
    Reassign {
        /// Answerer model to replace.
        #[arg(long)]
        from: String,
        /// Replacement answerers (repeatable). Defaults to every other catalog answerer.
        #[arg(long = "to")]
        to: Vec<String>,
        /// Seed for replacement draws.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Dispatch pending items through the configured game command.
    Run {
        /// Stop after this many items.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete the queue document.
    Reset {
        /// Confirm deletion.
        #[arg(long)]
        yes: bool,
    },
    /// List the model registry.
    Models,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    match cli.command {
        Command::Create {
            policy,
            iterations,
            seed,
            force,
        } => cmd_create(&cfg, policy, iterations, seed, force),
        Command::Status { failed } => cmd_status(&cfg, failed),
        Command::Next => cmd_next(&cfg),
        Command::Recover => cmd_recover(&cfg),
        Command::Reassign { from, to, seed } => cmd_reassign(&cfg, &from, to, seed),
        Command::Run { limit } => cmd_run(&cfg, limit),
        Command::Reset { yes } => cmd_reset(&cfg, yes),
        Command::Models => cmd_models(&cfg),
    }
}

fn cmd_create(
    cfg: &BenchConfig,
    policy: Option<GenerationPolicy>,
    iterations: Option<u32>,
    seed: Option<u64>,
    force: bool,
) -> Result<i32> {
    let policy = policy.unwrap_or(cfg.generation.policy);
    let iterations = iterations.unwrap_or(cfg.generation.iterations);
    if iterations == 0 {
        bail!("--iterations must be > 0");
    }
    let loaded = catalog_for(cfg)?;
    let store = QueueStore::new(&cfg.queue_path);
    let _lock = SessionLock::acquire(store.path()).context("acquire session lock")?;

    if store.path().exists() && !force {
        bail!(
            "queue already exists at {} (use --force to replace it)",
            store.path().display()
        );
    }

    let mut rng = seeded_rng(seed.or(cfg.generation.seed));
    let plan = loaded.catalog.plan(iterations);
    let doc = build_queue(&plan, policy, Utc::now(), &mut rng).context("build queue")?;
    store.save(&doc).context("save queue")?;
    info!(items = doc.total_items, %policy, "queue created");

    println!(
        "created: items={} policy={policy} iterations={iterations} catalog={} path={}",
        doc.total_items,
        loaded.source,
        store.path().display()
    );
    Ok(exit_codes::OK)
}

fn cmd_status(cfg: &BenchConfig, failed: bool) -> Result<i32> {
    let store = QueueStore::new(&cfg.queue_path);
    let doc = load_existing(&store)?;
    let p = store.progress(&doc);
    println!(
        "progress: total={} completed={} pending={} running={} failed={} percent={}",
        p.total, p.completed, p.pending, p.running, p.failed, p.percent_complete
    );
    let results = JsonlResults::new(&cfg.results_path);
    let r = results.summary()?;
    let mean_questions = r
        .mean_questions
        .map_or_else(|| "-".to_string(), |mean| format!("{mean:.1}"));
    println!(
        "results: entries={} won={} lost={} mean_questions={mean_questions} path={}",
        r.entries,
        r.won,
        r.lost,
        results.path().display()
    );
    if failed {
        for item in doc.items.iter().filter(|i| i.status == ItemStatus::Failed) {
            println!(
                "failed: id={} guesser={} answerer={} error={}",
                item.id,
                item.guesser_model_id,
                item.answerer_model_id,
                item.error.as_deref().unwrap_or("")
            );
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_next(cfg: &BenchConfig) -> Result<i32> {
    let store = QueueStore::new(&cfg.queue_path);
    let doc = load_existing(&store)?;
    match store.next_pending(&doc) {
        Some(item) => {
            println!(
                "next: id={} guesser={} answerer={} category={}",
                item.id, item.guesser_model_id, item.answerer_model_id, item.secret.category
            );
            Ok(exit_codes::OK)
        }
        None => {
            println!("next: none");
            Ok(exit_codes::EXHAUSTED)
        }
    }
}

fn cmd_recover(cfg: &BenchConfig) -> Result<i32> {
    let store = QueueStore::new(&cfg.queue_path);
    let _lock = SessionLock::acquire(store.path()).context("acquire session lock")?;
    let mut doc = load_existing(&store)?;
    let reset = store.recover(&mut doc).context("recover queue")?;
    println!("recovered: items={reset}");
    Ok(exit_codes::OK)
}

fn cmd_reassign(
    cfg: &BenchConfig,
    from: &str,
    to: Vec<String>,
    seed: Option<u64>,
) -> Result<i32> {
    let replacements = if to.is_empty() {
        let loaded = catalog_for(cfg)?;
        loaded
            .catalog
            .answerers
            .iter()
            .filter(|id| id.as_str() != from)
            .cloned()
            .collect()
    } else {
        to
    };

    let store = QueueStore::new(&cfg.queue_path);
    let _lock = SessionLock::acquire(store.path()).context("acquire session lock")?;
    let mut doc = load_existing(&store)?;
    let mut rng = seeded_rng(seed.or(cfg.generation.seed));
    let summary = store
        .reassign_answerers(&mut doc, from, &replacements, &mut rng)
        .with_context(|| format!("reassign answerer {from}"))?;

    println!("reassigned: from={from} items={}", summary.replaced);
    for (answerer, count) in &summary.distribution {
        println!("reassigned: to={answerer} items={count}");
    }
    Ok(exit_codes::OK)
}

fn cmd_run(cfg: &BenchConfig, limit: Option<usize>) -> Result<i32> {
    let loaded = catalog_for(cfg)?;
    let game = CommandGame::from_config(&cfg.game)?;
    let sink = JsonlResults::new(&cfg.results_path);
    let store = QueueStore::new(&cfg.queue_path);

    let summary = run_session(
        &store,
        &loaded,
        &game,
        &sink,
        &DispatchOptions { limit },
        |outcome| match &outcome.error {
            Some(error) => println!(
                "item: id={} run_id={} status={} error={error}",
                outcome.item_id, outcome.run_id, outcome.status
            ),
            None => println!(
                "item: id={} run_id={} status={}",
                outcome.item_id, outcome.run_id, outcome.status
            ),
        },
    )?;

    let stop = match summary.stop {
        DispatchStop::Exhausted => "exhausted",
        DispatchStop::LimitReached => "limit",
    };
    println!(
        "run: recovered={} attempted={} completed={} failed={} stop={stop}",
        summary.recovered, summary.attempted, summary.completed, summary.failed
    );
    Ok(exit_codes::OK)
}

fn cmd_reset(cfg: &BenchConfig, yes: bool) -> Result<i32> {
    let store = QueueStore::new(&cfg.queue_path);
    if !yes {
        bail!(
            "refusing to delete {} without --yes",
            store.path().display()
        );
    }
    let _lock = SessionLock::acquire(store.path()).context("acquire session lock")?;
    let deleted = store.delete_all().context("delete queue")?;
    println!("reset: deleted={deleted} path={}", store.path().display());
    Ok(exit_codes::OK)
}

fn cmd_models(cfg: &BenchConfig) -> Result<i32> {
    let loaded = catalog_for(cfg)?;
    let catalog = &loaded.catalog;
    for model in &catalog.models {
        let mut roles = Vec::new();
        if catalog.guessers.contains(&model.id) {
            roles.push("guesser");
        }
        if catalog.answerers.contains(&model.id) {
            roles.push("answerer");
        }
        println!(
            "model: id={} name={} provider={} thinking={} roles={}",
            model.id,
            model.name,
            model.provider,
            model.thinking_level.as_deref().unwrap_or("-"),
            if roles.is_empty() {
                "-".to_string()
            } else {
                roles.join(",")
            }
        );
    }
    Ok(exit_codes::OK)
}

fn catalog_for(cfg: &BenchConfig) -> Result<LoadedCatalog> {
    load_catalog(cfg.catalog_path.as_deref())
}

fn load_existing(store: &QueueStore) -> Result<QueueDocument> {
    store.load().context("load queue")?.ok_or_else(|| {
        anyhow!(
            "no queue at {} (run `bench create` first)",
            store.path().display()
        )
    })
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
