/// Maps text to a fixed-dimension vector.
///
/// Implementations must be deterministic for a fixed model and input, and must
/// return the all-zero vector of length `dim()` for empty or whitespace-only text.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model (e.g. `hashing:d384`).
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}
