//! Exhaustive squared-L2 index over fixed-dimension rows.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VectorStoreError;

const MAGIC: &[u8; 4] = b"SRFX";
const FORMAT_VERSION: u32 = 1;

/// Append-only flat index. Row `i` is `data[i * dim..(i + 1) * dim]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        self.data.get(i * self.dim..(i + 1) * self.dim)
    }

    /// Append rows. Every vector must already have length `dim`.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), VectorStoreError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dim,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dim);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// The `k` nearest rows as `(row, squared distance)`, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, VectorStoreError> {
        if query.len() != self.dim {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim.max(1))
            .enumerate()
            .map(|(row, vector)| (row, squared_l2(query, vector)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k.min(self.len()));
        Ok(scored)
    }

    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Drop every row from `rows` onwards.
    pub fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows.saturating_mul(self.dim));
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VectorStoreError> {
        let file = IndexFile {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            dim: self.dim as u32,
            rows: self.len() as u64,
            data: self.data.clone(),
        };
        Ok(bincode::serialize(&file)?)
    }

    /// Decode an index file. `path` is only used for error reporting.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self, VectorStoreError> {
        let file: IndexFile = bincode::deserialize(bytes)
            .map_err(|e| VectorStoreError::corrupt(path, e.to_string()))?;

        if &file.magic != MAGIC {
            return Err(VectorStoreError::corrupt(path, "bad magic"));
        }
        if file.version != FORMAT_VERSION {
            return Err(VectorStoreError::corrupt(
                path,
                format!("unsupported format version {}", file.version),
            ));
        }

        let dim = file.dim as usize;
        let expected = (file.rows as usize)
            .checked_mul(dim)
            .ok_or_else(|| VectorStoreError::corrupt(path, "row count overflow"))?;
        if file.data.len() != expected {
            return Err(VectorStoreError::corrupt(
                path,
                format!(
                    "header declares {} values, found {}",
                    expected,
                    file.data.len()
                ),
            ));
        }

        Ok(Self {
            dim,
            data: file.data,
        })
    }
}

/// On-disk layout of an index file.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    magic: [u8; 4],
    version: u32,
    dim: u32,
    rows: u64,
    data: Vec<f32>,
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> FlatL2Index {
        let mut index = FlatL2Index::new(2);
        index
            .add(&[vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0]])
            .unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_distance() {
        let hits = index().search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(hits, vec![(0, 0.0), (2, 1.0), (1, 25.0)]);
    }

    #[test]
    fn test_search_clamps_k() {
        assert_eq!(index().search(&[0.0, 0.0], 10).unwrap().len(), 3);
        assert!(FlatL2Index::new(2).search(&[0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_ties_break_by_row() {
        let mut index = FlatL2Index::new(1);
        index.add(&[vec![1.0], vec![-1.0], vec![1.0]]).unwrap();
        let rows: Vec<usize> = index.search(&[0.0], 3).unwrap().iter().map(|h| h.0).collect();
        assert_eq!(rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_add_rejects_wrong_dimension() {
        let mut index = FlatL2Index::new(2);
        let err = index.add(&[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_bytes_round_trip() {
        let original = index();
        let decoded =
            FlatL2Index::from_bytes(&original.to_bytes().unwrap(), Path::new("x")).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.row(1), Some(&[3.0, 4.0][..]));
    }

    #[test]
    fn test_truncated_bytes_are_corrupt() {
        let mut bytes = index().to_bytes().unwrap();
        bytes.pop();
        assert!(matches!(
            FlatL2Index::from_bytes(&bytes, Path::new("x")),
            Err(VectorStoreError::Corrupt { .. })
        ));
        assert!(matches!(
            FlatL2Index::from_bytes(b"garbage", Path::new("x")),
            Err(VectorStoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let mut bytes = index().to_bytes().unwrap();
        bytes[0] = b'X';
        let err = FlatL2Index::from_bytes(&bytes, Path::new("x")).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_truncate_drops_trailing_rows() {
        let mut index = index();
        index.truncate(1);
        assert_eq!(index.len(), 1);
        assert_eq!(index.row(0), Some(&[0.0, 0.0][..]));
        index.truncate(5);
        assert_eq!(index.len(), 1);
    }
}
