//! papernav-embed
//!
//! Vector encoders behind `papernav_core::traits::Embedder`: a candle
//! sentence-transformer (`BertEmbedder`), a deterministic feature-hashing
//! encoder for tests and offline work, and `SharedEncoder`, the process-wide
//! lazily initialised handle the engine holds.

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use papernav_core::config::EmbeddingSettings;
pub use papernav_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_on_device;

const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Sentence-transformer encoder (BERT backbone, masked mean pooling, L2 norm).
pub struct BertEmbedder { model: BertModel, tokenizer: Tokenizer, device: Device, max_len: usize, pad_id: u32, dim: usize, id: String }

impl BertEmbedder {
    pub fn new(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading sentence-transformer");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.get_padding().map_or(0, |p| p.pad_id);
        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        let dim = config.hidden_size;
        let name = model_dir.file_name().map_or_else(|| DEFAULT_MODEL_NAME.to_string(), |n| n.to_string_lossy().to_string());
        let id = format!("bert:{name}:d{dim}");
        info!(%id, "sentence-transformer loaded");
        Ok(Self { model, tokenizer, device, max_len, pad_id, dim, id })
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if emb.len() != self.dim { return Err(anyhow!("model produced {} dims, expected {}", emb.len(), self.dim)); }
        if start.elapsed().as_millis() > 100 { debug!(elapsed_ms = start.elapsed().as_millis() as u64, "slow embedding"); }
        Ok(emb)
    }
}

impl Embedder for BertEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() { return Ok(vec![0.0; self.dim]); }
        self.encode(text)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<std::collections::HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let weights = candle_core::pickle::read_all(&pickle)?;
        return Ok(weights.into_iter().collect());
    }
    Err(anyhow!("No model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

/// Bag-of-tokens feature hashing into `dim` buckets, L2-normalised.
///
/// Deterministic and model-free; lowercased alphanumeric tokens only.
pub struct HashingEmbedder { dim: usize, id: String }

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("hashing:d{dim}") } }
}

impl Embedder for HashingEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 { return Ok(v); }
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64)?;
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 { for x in &mut v { *x /= norm; } }
        Ok(v)
    }
}

fn use_hashing_from_env() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Build the encoder selected by `settings` (or by `APP_USE_FAKE_EMBEDDINGS=1`).
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    if settings.use_hashing || use_hashing_from_env() {
        info!(dim = settings.dimension, "using hashing encoder");
        return Ok(Box::new(HashingEmbedder::new(settings.dimension)));
    }
    let model_dir = resolve_model_dir(settings.model_dir.as_deref())?;
    let embedder = BertEmbedder::new(&model_dir, settings.max_len)?;
    if embedder.dim() != settings.dimension {
        return Err(anyhow!("model at {} produces {} dims but embedding.dimension is {}", model_dir.display(), embedder.dim(), settings.dimension));
    }
    Ok(Box::new(embedder))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured { let p = papernav_core::config::expand_path(dir); if p.exists() { return Ok(p); } warn!(path = %p.display(), "configured model_dir does not exist"); }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { let p = PathBuf::from(&dir); if p.exists() { debug!(var, path = %p.display(), "using model dir from env"); return Ok(p); } }
    }
    for candidate in [Path::new("../models").join(DEFAULT_MODEL_NAME), Path::new("models").join(DEFAULT_MODEL_NAME)] {
        if candidate.exists() { return Ok(candidate); }
    }
    Err(anyhow!("Could not locate {} model directory", DEFAULT_MODEL_NAME))
}

/// Process-wide encoder handle. The first `get()` builds the encoder; concurrent
/// first callers block on that single initialisation and later calls reuse it.
pub struct SharedEncoder {
    settings: EmbeddingSettings,
    cell: OnceCell<Box<dyn Embedder>>,
}

impl SharedEncoder {
    pub fn new(settings: EmbeddingSettings) -> Self { Self { settings, cell: OnceCell::new() } }

    /// Wrap an already-built encoder.
    pub fn from_embedder(embedder: Box<dyn Embedder>) -> Self {
        let settings = EmbeddingSettings { dimension: embedder.dim(), ..EmbeddingSettings::default() };
        Self { settings, cell: OnceCell::with_value(embedder) }
    }

    pub fn get(&self) -> Result<&dyn Embedder> {
        self.cell.get_or_try_init(|| get_default_embedder(&self.settings)).map(|b| &**b)
    }

    pub fn is_initialized(&self) -> bool { self.cell.get().is_some() }
}
