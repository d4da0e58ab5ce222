//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge compiled defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RETRIEVAL__TEXT_WEIGHT=0.6`). Paths accept `~` and `${VAR}`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

const WEIGHT_TOLERANCE: f32 = 1e-6;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::from_figment(Self::layered(&env_name))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    fn layered(env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub clustering: ClusteringSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub index_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self { Self { index_dir: "data/index".to_string() } }
}

impl DataSettings {
    pub fn index_dir(&self) -> PathBuf { expand_path(&self.index_dir) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Local sentence-transformer directory (tokenizer.json, config.json, weights).
    pub model_dir: Option<String>,
    pub dimension: usize,
    pub max_len: usize,
    /// Use the deterministic hashing encoder instead of the transformer.
    pub use_hashing: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, dimension: 384, max_len: 256, use_hashing: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub max_results: usize,
    pub text_weight: f32,
    pub metadata_weight: f32,
    /// Each hybrid sub-search keeps `k * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 10, max_results: 50, text_weight: 0.7, metadata_weight: 0.3, candidate_multiplier: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringSettings {
    pub min_clusters: usize,
    pub max_clusters: usize,
    pub num_keywords: usize,
    pub seed: u64,
    pub max_iterations: usize,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self { min_clusters: 3, max_clusters: 10, num_keywords: 5, seed: 42, max_iterations: 300 }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;
        self.clustering.validate()?;
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be positive".into()));
        }
        if self.embedding.max_len == 0 {
            return Err(Error::InvalidConfig("embedding.max_len must be positive".into()));
        }
        Ok(())
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        validate_weights(self.text_weight, self.metadata_weight)?;
        if self.candidate_multiplier < 2 {
            return Err(Error::InvalidConfig(format!(
                "retrieval.candidate_multiplier must be >= 2, got {}",
                self.candidate_multiplier
            )));
        }
        if self.top_k > self.max_results {
            return Err(Error::InvalidConfig(format!(
                "retrieval.top_k ({}) exceeds retrieval.max_results ({})",
                self.top_k, self.max_results
            )));
        }
        Ok(())
    }
}

impl ClusteringSettings {
    pub fn validate(&self) -> Result<()> {
        if self.min_clusters < 2 {
            return Err(Error::InvalidConfig("clustering.min_clusters must be >= 2".into()));
        }
        if self.max_clusters < self.min_clusters {
            return Err(Error::InvalidConfig(format!(
                "clustering.max_clusters ({}) is below min_clusters ({})",
                self.max_clusters, self.min_clusters
            )));
        }
        Ok(())
    }
}

/// Both weights in `[0, 1]` and summing to 1.
pub fn validate_weights(text_weight: f32, metadata_weight: f32) -> Result<()> {
    let in_range = |w: f32| (0.0..=1.0).contains(&w);
    if !in_range(text_weight) || !in_range(metadata_weight) {
        return Err(Error::InvalidConfig(format!(
            "weights must lie in [0, 1] (text={text_weight}, metadata={metadata_weight})"
        )));
    }
    if (text_weight + metadata_weight - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(Error::InvalidConfig(format!(
            "weights must sum to 1 (text={text_weight}, metadata={metadata_weight})"
        )));
    }
    Ok(())
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
