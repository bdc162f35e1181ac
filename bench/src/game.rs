//! Game runner abstraction.
//!
//! The [`GameRunner`] trait decouples dispatch from the actual model exchange.
//! [`CommandGame`] hands each run to an external program; tests use scripted
//! runners that return predetermined outcomes without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use queue::QueueItem;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::catalog::ResolvedModel;
use crate::config::GameConfig;
use crate::process::{ProcessLimits, run_supervised};

const STDERR_TAIL_BYTES: usize = 2_000;

/// Everything a game needs to play one queue item.
#[derive(Debug, Clone, Copy)]
pub struct GameRequest<'a> {
    pub run_id: &'a str,
    pub item: &'a QueueItem,
    pub guesser: ResolvedModel<'a>,
    pub answerer: ResolvedModel<'a>,
}

/// Outcome of a successful game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameReport {
    /// Opaque round-by-round transcript produced by the game.
    pub transcript: Value,
}

/// Abstraction over game backends.
pub trait GameRunner {
    /// Play one game. An `Err` is recorded as the item's failure text.
    fn play(&self, request: &GameRequest<'_>) -> Result<GameReport>;
}

/// Game runner that spawns the configured `game.command`.
///
/// The request is passed through `BENCH_*` environment variables; the
/// program must exit 0 and print a JSON transcript on stdout.
#[derive(Debug, Clone)]
pub struct CommandGame {
    command: Vec<String>,
    limits: ProcessLimits,
}

impl CommandGame {
    pub fn from_config(cfg: &GameConfig) -> Result<Self> {
        if cfg.command.is_empty() {
            bail!("game.command is not configured");
        }
        Ok(Self {
            command: cfg.command.clone(),
            limits: ProcessLimits {
                timeout: Duration::from_secs(cfg.timeout_secs),
                capture_bytes: cfg.output_limit_bytes,
            },
        })
    }
}

impl GameRunner for CommandGame {
    #[instrument(skip_all, fields(run_id = request.run_id, item_id = %request.item.id))]
    fn play(&self, request: &GameRequest<'_>) -> Result<GameReport> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("game.command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).envs(game_env(request));

        info!(program = %program, "starting game");
        let exit =
            run_supervised(cmd, self.limits).with_context(|| format!("run game {program}"))?;

        if exit.timed_out {
            bail!("game timed out after {}s", self.limits.timeout.as_secs());
        }
        if !exit.status.success() {
            let code = exit
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            bail!(
                "game exited with {code}: {}",
                exit.stderr.tail(STDERR_TAIL_BYTES)
            );
        }
        if exit.stdout.dropped > 0 {
            bail!(
                "game transcript exceeded {} bytes ({} dropped)",
                self.limits.capture_bytes,
                exit.stdout.dropped
            );
        }
        if !exit.stdout.complete {
            bail!("game transcript stream never closed");
        }

        let transcript: Value =
            serde_json::from_slice(&exit.stdout.bytes).context("parse game transcript")?;
        debug!(stderr_dropped = exit.stderr.dropped, "game finished");
        Ok(GameReport { transcript })
    }
}

/// Environment handed to the game program, in a stable order.
pub fn game_env(request: &GameRequest<'_>) -> Vec<(String, String)> {
    let mut env = vec![
        ("BENCH_RUN_ID".to_string(), request.run_id.to_string()),
        ("BENCH_ITEM_ID".to_string(), request.item.id.clone()),
        (
            "BENCH_CATEGORY".to_string(),
            request.item.secret.category.clone(),
        ),
        ("BENCH_SECRET".to_string(), request.item.secret.secret.clone()),
    ];
    for (role, resolved) in [("GUESSER", request.guesser), ("ANSWERER", request.answerer)] {
        let model = resolved.model;
        env.push((format!("BENCH_{role}_ID"), model.id.clone()));
        env.push((format!("BENCH_{role}_NAME"), model.name.clone()));
        env.push((format!("BENCH_{role}_PROVIDER"), model.provider.clone()));
        env.push((
            format!("BENCH_{role}_THINKING"),
            model.thinking_level.clone().unwrap_or_default(),
        ));
        env.push((
            format!("BENCH_{role}_API_KEY_ENV"),
            resolved.provider.api_key_env.clone(),
        ));
        env.push((format!("BENCH_{role}_URL"), resolved.provider.url.clone()));
    }
    env
}
