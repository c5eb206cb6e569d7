//! Persisted stores: the chunk store and the index/metadata pair.
//!
//! Three files, all written by the single batch producer:
//!
//! | Store | File | Format |
//! |-------|------|--------|
//! | Chunk store | `chunks.json` | pretty-printed JSON array |
//! | Vector index | `index.bin` | bincode [`FlatIndex`] |
//! | Metadata sidecar | `metadata.bin` | bincode `Vec<EmbeddingRecord>` |
//!
//! The index and its sidecar are only valid together: [`VectorStore`]
//! refuses to load one without the other, and every load and save checks
//! that vector count equals record count. A mismatch is corruption and
//! aborts the run rather than silently repairing.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::PipelineError;
use crate::index::FlatIndex;
use crate::models::{Chunk, EmbeddingRecord};

/// Write the chunk store.
pub fn save_chunks(path: &Path, chunks: &[Chunk]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, chunks).map_err(|e| PipelineError::Parse {
        document: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Read the chunk store.
pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>, PipelineError> {
    let file = BufReader::new(File::open(path)?);
    serde_json::from_reader(file).map_err(|e| PipelineError::Parse {
        document: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// The loaded index/metadata pair. Immutable once loaded at query time;
/// the batch pipeline builds a new one and saves it atomically as a pair.
#[derive(Debug, Clone)]
pub struct VectorStore {
    index: FlatIndex,
    records: Vec<EmbeddingRecord>,
}

/// Whether the persisted pair exists on disk.
pub fn store_state(index_path: &Path, metadata_path: &Path) -> Result<bool, PipelineError> {
    match (index_path.exists(), metadata_path.exists()) {
        (true, true) => Ok(true),
        (false, false) => Ok(false),
        (true, false) => Err(PipelineError::UnpairedStore(format!(
            "index {} exists but metadata {} is missing",
            index_path.display(),
            metadata_path.display()
        ))),
        (false, true) => Err(PipelineError::UnpairedStore(format!(
            "metadata {} exists but index {} is missing",
            metadata_path.display(),
            index_path.display()
        ))),
    }
}

impl VectorStore {
    /// Assemble a store, validating positional correspondence.
    pub fn from_parts(
        index: FlatIndex,
        records: Vec<EmbeddingRecord>,
    ) -> Result<Self, PipelineError> {
        if index.len() != records.len() {
            return Err(PipelineError::IndexCorruption {
                vectors: index.len(),
                records: records.len(),
            });
        }
        Ok(Self { index, records })
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append new records and their vectors, preserving 1:1 positional
    /// correspondence. Existing positions are never reordered or removed.
    pub fn append(&mut self, records: Vec<EmbeddingRecord>) -> Result<(), PipelineError> {
        for record in records {
            self.index.push(&record.embedding)?;
            self.records.push(record);
        }
        debug_assert_eq!(self.index.len(), self.records.len());
        Ok(())
    }

    /// Persist index and sidecar together.
    pub fn save(&self, index_path: &Path, metadata_path: &Path) -> Result<(), PipelineError> {
        if self.index.len() != self.records.len() {
            return Err(PipelineError::IndexCorruption {
                vectors: self.index.len(),
                records: self.records.len(),
            });
        }
        if let Some(parent) = index_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = metadata_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let index_file = BufWriter::new(File::create(index_path)?);
        bincode::serialize_into(index_file, &self.index)?;

        let metadata_file = BufWriter::new(File::create(metadata_path)?);
        bincode::serialize_into(metadata_file, &self.records)?;

        Ok(())
    }

    /// Load the pair, failing closed: any missing or unreadable file is
    /// [`PipelineError::RetrievalUnavailable`], and a count mismatch after a
    /// successful read is [`PipelineError::IndexCorruption`].
    pub fn load(index_path: &Path, metadata_path: &Path) -> Result<Self, PipelineError> {
        store_state(index_path, metadata_path)?;

        let index_file = File::open(index_path).map_err(|e| {
            PipelineError::RetrievalUnavailable(format!(
                "cannot open index {}: {e}",
                index_path.display()
            ))
        })?;
        let index: FlatIndex = bincode::deserialize_from(BufReader::new(index_file))
            .map_err(|e| {
                PipelineError::RetrievalUnavailable(format!(
                    "cannot decode index {}: {e}",
                    index_path.display()
                ))
            })?;

        let metadata_file = File::open(metadata_path).map_err(|e| {
            PipelineError::RetrievalUnavailable(format!(
                "cannot open metadata {}: {e}",
                metadata_path.display()
            ))
        })?;
        let records: Vec<EmbeddingRecord> =
            bincode::deserialize_from(BufReader::new(metadata_file)).map_err(|e| {
                PipelineError::RetrievalUnavailable(format!(
                    "cannot decode metadata {}: {e}",
                    metadata_path.display()
                ))
            })?;

        Self::from_parts(index, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(chunk_id: &str, embedding: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk_id: chunk_id.to_string(),
            source: "about.html".to_string(),
            title: Some("About".to_string()),
            text: format!("text for {chunk_id}"),
            token_count: 4,
            embedding,
            content_hash: format!("hash-{chunk_id}"),
        }
    }

    fn store_of(n: usize, dims: usize) -> VectorStore {
        let mut index = FlatIndex::new(dims);
        let mut records = Vec::new();
        for i in 0..n {
            let mut v = vec![0.0f32; dims];
            v[i % dims] = i as f32 + 1.0;
            index.push(&v).unwrap();
            records.push(record(&format!("c{i}"), v));
        }
        VectorStore::from_parts(index, records).unwrap()
    }

    #[test]
    fn from_parts_rejects_count_mismatch() {
        let mut index = FlatIndex::new(2);
        index.push(&[1.0, 2.0]).unwrap();
        let err = VectorStore::from_parts(index, vec![]).unwrap_err();
        assert!(matches!(err, PipelineError::IndexCorruption { .. }));
    }

    #[test]
    fn save_load_roundtrip_preserves_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.bin");
        let metadata_path = dir.path().join("metadata.bin");

        let store = store_of(10, 4);
        store.save(&index_path, &metadata_path).unwrap();

        let loaded = VectorStore::load(&index_path, &metadata_path).unwrap();
        assert_eq!(loaded.index().len(), loaded.records().len());
        assert_eq!(loaded.len(), 10);
        assert_eq!(loaded.records()[3].chunk_id, "c3");

        // Querying with a previously-indexed vector returns that vector's
        // own metadata as the zero-distance nearest result.
        let query = loaded.records()[3].embedding.clone();
        let results = loaded.index().search(&query, 5).unwrap();
        assert_eq!(results[0].0, 3);
        assert_eq!(results[0].1, 0.0);
    }

    #[test]
    fn loading_missing_pair_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let err = VectorStore::load(
            &dir.path().join("index.bin"),
            &dir.path().join("metadata.bin"),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::RetrievalUnavailable(_)));
    }

    #[test]
    fn loading_half_a_pair_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.bin");
        let metadata_path = dir.path().join("metadata.bin");

        let store = store_of(2, 2);
        store.save(&index_path, &metadata_path).unwrap();
        std::fs::remove_file(&metadata_path).unwrap();

        let err = VectorStore::load(&index_path, &metadata_path).unwrap_err();
        assert!(matches!(err, PipelineError::UnpairedStore(_)));
    }

    #[test]
    fn garbage_file_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.bin");
        let metadata_path = dir.path().join("metadata.bin");
        std::fs::write(&index_path, b"not bincode").unwrap();
        std::fs::write(&metadata_path, b"also not bincode").unwrap();

        let err = VectorStore::load(&index_path, &metadata_path).unwrap_err();
        assert!(matches!(err, PipelineError::RetrievalUnavailable(_)));
    }

    #[test]
    fn append_preserves_positions() {
        let mut store = store_of(3, 2);
        store
            .append(vec![record("c-new", vec![9.0, 9.0])])
            .unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.index().vector(3), Some(&[9.0, 9.0][..]));
        assert_eq!(store.records()[3].chunk_id, "c-new");
    }

    #[test]
    fn chunk_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.json");
        let chunks = vec![Chunk {
            id: "c1".to_string(),
            chunk_index: 0,
            source: "about.html".to_string(),
            title: None,
            text: "hello".to_string(),
            token_count: 1,
        }];
        save_chunks(&path, &chunks).unwrap();
        let loaded = load_chunks(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c1");
    }
}
