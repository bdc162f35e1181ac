//! Bench configuration stored in `bench.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use queue::GenerationPolicy;
use serde::Deserialize;

/// Bench configuration (TOML).
///
/// Missing fields default to values that work from the repository root.
/// Relative paths resolve against the directory holding the config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BenchConfig {
    /// Persisted queue document.
    pub queue_path: PathBuf,

    /// Append-only JSONL log of finished runs.
    pub results_path: PathBuf,

    /// Catalog override; the built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,

    pub generation: GenerationConfig,

    pub game: GameConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    pub policy: GenerationPolicy,
    /// How many times the full expansion is repeated.
    pub iterations: u32,
    /// Seed for answerer draws. Entropy when unset.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    /// Command that plays one game (e.g. `["bun", "run", "play.ts"]`).
    pub command: Vec<String>,

    /// Wall-clock budget for a single game in seconds.
    pub timeout_secs: u64,

    /// Truncate captured game stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            queue_path: PathBuf::from(".bench/queue.json"),
            results_path: PathBuf::from(".bench/results/benchmark-results.jsonl"),
            catalog_path: None,
            generation: GenerationConfig::default(),
            game: GameConfig::default(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            policy: GenerationPolicy::RandomAnswerer,
            iterations: 1,
            seed: None,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_path.as_os_str().is_empty() {
            return Err(anyhow!("queue_path must be non-empty"));
        }
        if self.results_path.as_os_str().is_empty() {
            return Err(anyhow!("results_path must be non-empty"));
        }
        if self.generation.iterations == 0 {
            return Err(anyhow!("generation.iterations must be > 0"));
        }
        if self.game.timeout_secs == 0 {
            return Err(anyhow!("game.timeout_secs must be > 0"));
        }
        if self.game.output_limit_bytes == 0 {
            return Err(anyhow!("game.output_limit_bytes must be > 0"));
        }
        if self.game.command.iter().any(|arg| arg.trim().is_empty()) {
            return Err(anyhow!("game.command entries must be non-empty"));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.queue_path = base.join(&self.queue_path);
        self.results_path = base.join(&self.results_path);
        if let Some(catalog) = &self.catalog_path {
            self.catalog_path = Some(base.join(catalog));
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BenchConfig::default()` rooted next to
/// where the file would be.
pub fn load_config(path: &Path) -> Result<BenchConfig> {
    let base = path.parent().unwrap_or(Path::new("")).to_path_buf();
    let mut cfg = if path.exists() {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str::<BenchConfig>(&contents)
            .with_context(|| format!("parse {}", path.display()))?
    } else {
        BenchConfig::default()
    };
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    cfg.resolve_paths(&base);
    Ok(cfg)
}
