//! On-disk layout of a committed corpus.
//!
//! One bincode file per index directory: a `u32` format version first, then
//! the encoder id, the vector dimension and the four position-aligned
//! sequences. Writes go to a temp file in the same directory and are renamed
//! into place.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use papernav_core::types::{Document, MetadataRecord};
use papernav_core::{Error, Result};

pub const FORMAT_VERSION: u32 = 1;
pub const SNAPSHOT_FILE: &str = "index.bin";

pub fn snapshot_path(location: &Path) -> PathBuf { location.join(SNAPSHOT_FILE) }

#[derive(Serialize)]
pub(crate) struct SnapshotRef<'a> {
    pub version: u32,
    pub encoder_id: &'a str,
    pub dim: usize,
    pub documents: &'a [Document],
    pub metadata: &'a [MetadataRecord],
    pub text_vectors: &'a [Vec<f32>],
    pub metadata_vectors: &'a [Vec<f32>],
}

#[derive(Debug, Deserialize)]
pub(crate) struct Snapshot {
    pub version: u32,
    pub encoder_id: String,
    pub dim: usize,
    pub documents: Vec<Document>,
    pub metadata: Vec<MetadataRecord>,
    pub text_vectors: Vec<Vec<f32>>,
    pub metadata_vectors: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// What `load` found. Only `Loaded` changes the store's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { n_documents: usize },
    Missing,
    Corrupt(String),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool { matches!(self, Self::Loaded { .. }) }
}

pub(crate) fn write_snapshot(location: &Path, snapshot: &SnapshotRef<'_>) -> Result<PathBuf> {
    fs::create_dir_all(location)?;
    let target = snapshot_path(location);
    let mut tmp = tempfile::NamedTempFile::new_in(location)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        bincode::serialize_into(&mut writer, snapshot).map_err(|e| Error::Persistence(e.to_string()))?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| Error::Io(e.error))?;
    Ok(target)
}

pub(crate) enum ReadResult {
    Found(Snapshot),
    Missing,
    Corrupt(String),
}

pub(crate) fn read_snapshot(location: &Path) -> ReadResult {
    let path = snapshot_path(location);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return ReadResult::Missing,
        Err(e) if location.is_file() => return ReadResult::Corrupt(format!("{} is not a directory: {e}", location.display())),
        Err(e) => return ReadResult::Corrupt(format!("unreadable {}: {e}", path.display())),
    };
    let header: VersionHeader = match bincode::deserialize(&bytes) {
        Ok(h) => h,
        Err(e) => return ReadResult::Corrupt(format!("bad header: {e}")),
    };
    if header.version != FORMAT_VERSION {
        return ReadResult::Corrupt(format!("format version {} (expected {FORMAT_VERSION})", header.version));
    }
    match bincode::deserialize::<Snapshot>(&bytes) {
        Ok(snapshot) => ReadResult::Found(snapshot),
        Err(e) => ReadResult::Corrupt(format!("undecodable snapshot: {e}")),
    }
}

impl Snapshot {
    /// Lengths of the four sequences agree and every vector has `dim` entries.
    pub(crate) fn check_alignment(&self, expected_dim: usize) -> std::result::Result<(), String> {
        if self.dim != expected_dim {
            return Err(format!("dimension {} (expected {expected_dim})", self.dim));
        }
        let n = self.documents.len();
        if self.metadata.len() != n || self.text_vectors.len() != n || self.metadata_vectors.len() != n {
            return Err(format!(
                "misaligned sequences: {} documents, {} metadata, {} text vectors, {} metadata vectors",
                n, self.metadata.len(), self.text_vectors.len(), self.metadata_vectors.len()
            ));
        }
        if let Some(bad) = self.text_vectors.iter().chain(&self.metadata_vectors).find(|v| v.len() != expected_dim) {
            return Err(format!("vector of length {} in a d{expected_dim} index", bad.len()));
        }
        Ok(())
    }
}
