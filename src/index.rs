//! Flat exact nearest-neighbor index.
//!
//! Vectors of one fixed dimension are stored contiguously and searched
//! exhaustively with squared L2 distance — exact results, no approximation.
//! Positions are append-only: a vector's position at insert time is its
//! position forever, which is what keeps the index aligned with the
//! metadata sidecar it is persisted next to.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of vectors stored.
    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector. Positions are never reordered or removed.
    pub fn push(&mut self, vector: &[f32]) -> Result<(), PipelineError> {
        if vector.len() != self.dims {
            return Err(PipelineError::DimensionMismatch {
                got: vector.len(),
                want: self.dims,
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Borrow the vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dims;
        Some(&self.data[start..start + self.dims])
    }

    /// Exact top-k search by squared L2 distance, nearest first. Ties break
    /// by position, so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, PipelineError> {
        if query.len() != self.dims {
            return Err(PipelineError::DimensionMismatch {
                got: query.len(),
                want: self.dims,
            });
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|pos| {
                let start = pos * self.dims;
                let candidate = &self.data[start..start + self.dims];
                let dist: f32 = candidate
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| {
                        let d = a - b;
                        d * d
                    })
                    .sum();
                (pos, dist)
            })
            .collect();

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }
}
