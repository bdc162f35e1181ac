//! Benchmark catalog: provider endpoints, model registry, rosters, and secrets.
//!
//! Catalogs are TOML files. A default catalog is compiled in; `catalog_path`
//! in `bench.toml` replaces it.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use queue::{QueuePlan, SecretEntry};
use serde::Deserialize;
use sha2::{Digest, Sha256};

const DEFAULT_CATALOG: &str = include_str!("../catalog/default.toml");

/// A parsed, validated catalog.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    /// Model ids that play the guesser role, in generation order.
    #[serde(default)]
    pub guessers: Vec<String>,
    /// Model ids that play the answerer role, in generation order.
    #[serde(default)]
    pub answerers: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<SecretEntry>,
}

/// Auth and endpoint for a model provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Environment variable holding the API key (the key itself is never stored).
    pub api_key_env: String,
    pub url: String,
}

/// One registry entry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    /// Stable id used in the queue (e.g. `gpt5_2_high`).
    pub id: String,
    /// Model name sent to the provider API (e.g. `gpt-5.2`).
    pub name: String,
    pub provider: String,
    /// `low`, `medium`, `high`, or `max`; absent when the model has no knob.
    pub thinking_level: Option<String>,
}

/// Registry entry joined with its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedModel<'a> {
    pub model: &'a ModelConfig,
    pub provider: &'a ProviderConfig,
}

/// Catalog plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    pub catalog: Catalog,
    /// `built-in` or the file path.
    pub source: String,
    /// SHA-256 of the catalog text, recorded with every result.
    pub sha256: String,
}

impl Catalog {
    pub fn parse_str(contents: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(contents).context("parse catalog")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn model(&self, id: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|model| model.id == id)
    }

    /// Look up a model and its provider.
    pub fn resolve(&self, id: &str) -> Option<ResolvedModel<'_>> {
        let model = self.model(id)?;
        let provider = self.providers.get(&model.provider)?;
        Some(ResolvedModel { model, provider })
    }

    /// Ordered generation inputs for the queue builder.
    pub fn plan(&self, iterations: u32) -> QueuePlan {
        QueuePlan {
            guessers: self.guessers.clone(),
            answerers: self.answerers.clone(),
            secrets: self.secrets.clone(),
            iterations,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, provider) in &self.providers {
            if provider.api_key_env.trim().is_empty() {
                bail!("providers.{name}.api_key_env must be non-empty");
            }
            if provider.url.trim().is_empty() {
                bail!("providers.{name}.url must be non-empty");
            }
        }

        let mut ids = HashSet::new();
        for (index, model) in self.models.iter().enumerate() {
            validate_model_id(&model.id).with_context(|| format!("models[{index}] invalid"))?;
            if !ids.insert(model.id.as_str()) {
                bail!("duplicate model id {}", model.id);
            }
            if model.name.trim().is_empty() {
                bail!("model {} name must be non-empty", model.id);
            }
            if !self.providers.contains_key(&model.provider) {
                bail!(
                    "model {} uses undeclared provider {}",
                    model.id,
                    model.provider
                );
            }
        }

        for (role, roster) in [("guessers", &self.guessers), ("answerers", &self.answerers)] {
            for id in roster {
                if !ids.contains(id.as_str()) {
                    bail!("{role} references unknown model {id}");
                }
            }
        }

        for (index, entry) in self.secrets.iter().enumerate() {
            if entry.category.trim().is_empty() || entry.secret.trim().is_empty() {
                bail!("secrets[{index}] must have non-empty category and secret");
            }
        }
        Ok(())
    }
}

/// Load the catalog at `path`, or the built-in one.
pub fn load_catalog(path: Option<&Path>) -> Result<LoadedCatalog> {
    let (contents, source) = match path {
        Some(path) => (
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?,
            path.display().to_string(),
        ),
        None => (DEFAULT_CATALOG.to_string(), "built-in".to_string()),
    };
    let catalog =
        Catalog::parse_str(&contents).with_context(|| format!("load catalog {source}"))?;
    Ok(LoadedCatalog {
        catalog,
        source,
        sha256: sha256_hex(contents.as_bytes()),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn validate_model_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(anyhow!("model id must be non-empty"));
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.')
    {
        return Err(anyhow!("model id {id} must use [A-Za-z0-9_.-] only"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
guessers = ["g1", "g2"]
answerers = ["a1"]

[providers.openai]
api_key_env = "OPENAI_API_KEY"
url = "https://api.openai.com/v1"

[[models]]
id = "g1"
name = "gpt-5.2"
provider = "openai"
thinking_level = "high"

[[models]]
id = "g2"
name = "gpt-5.2"
provider = "openai"

[[models]]
id = "a1"
name = "gpt-5.2"
provider = "openai"

[[secrets]]
category = "place"
secret = "Svalbard"
"#;

    #[test]
    fn built_in_catalog_is_valid() {
        let loaded = load_catalog(None).expect("built-in");
        let catalog = &loaded.catalog;
        assert_eq!(loaded.source, "built-in");
        assert_eq!(catalog.guessers.len(), 14);
        assert_eq!(catalog.answerers.len(), 4);
        assert_eq!(catalog.secrets.len(), 50);
        assert_eq!(loaded.sha256.len(), 64);

        let categories: HashSet<&str> = catalog
            .secrets
            .iter()
            .map(|entry| entry.category.as_str())
            .collect();
        assert_eq!(categories.len(), 5);
    }

    #[test]
    fn resolves_model_with_provider() {
        let catalog = Catalog::parse_str(SMALL).expect("parse");
        let resolved = catalog.resolve("g1").expect("g1");
        assert_eq!(resolved.model.name, "gpt-5.2");
        assert_eq!(resolved.model.thinking_level.as_deref(), Some("high"));
        assert_eq!(resolved.provider.api_key_env, "OPENAI_API_KEY");
        assert!(catalog.resolve("missing").is_none());
    }

    #[test]
    fn plan_keeps_roster_order() {
        let catalog = Catalog::parse_str(SMALL).expect("parse");
        let plan = catalog.plan(2);
        assert_eq!(plan.guessers, vec!["g1", "g2"]);
        assert_eq!(plan.answerers, vec!["a1"]);
        assert_eq!(plan.secrets.len(), 1);
        assert_eq!(plan.iterations, 2);
    }

    #[test]
    fn rejects_unknown_roster_model() {
        let input = SMALL.replace("answerers = [\"a1\"]", "answerers = [\"a9\"]");
        let err = Catalog::parse_str(&input).expect_err("unknown model");
        assert!(err.to_string().contains("a9"));
    }

    #[test]
    fn rejects_duplicate_and_malformed_ids() {
        let duplicate = SMALL.replace("id = \"g2\"", "id = \"g1\"");
        assert!(Catalog::parse_str(&duplicate).is_err());

        let malformed = SMALL.replace("id = \"a1\"", "id = \"a/1\"");
        assert!(Catalog::parse_str(&malformed).is_err());
    }

    #[test]
    fn rejects_undeclared_provider() {
        let input = SMALL.replace(
            "id = \"a1\"\nname = \"gpt-5.2\"\nprovider = \"openai\"",
            "id = \"a1\"\nname = \"gpt-5.2\"\nprovider = \"mystery\"",
        );
        let err = Catalog::parse_str(&input).expect_err("undeclared provider");
        assert!(err.to_string().contains("mystery"));
    }
}
