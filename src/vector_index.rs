use std::io::{Read, Write};

use rayon::prelude::*;

use crate::error::{Error, Result};

/// File magic for serialized indexes.
const MAGIC: [u8; 4] = *b"LXIV";

/// Current serialization format version.
const FORMAT_VERSION: u32 = 1;

/// Header size: magic + version (u32) + dimension (u32) + count (u64).
const HEADER_SIZE: usize = 20;

/// Vectors per rayon task when scoring.
const SCORE_CHUNK: usize = 1024;

/// A nearest-neighbour hit: the ordinal of the stored vector and its
/// squared Euclidean distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Append-only flat index with exact L2 search.
///
/// Vectors are stored row-major in one contiguous buffer, so the vector at
/// ordinal `i` lives at `data[i * dimension..(i + 1) * dimension]`.
///
/// Binary format (all integers little-endian):
/// - 4 bytes: magic `LXIV`
/// - 4 bytes: format version (u32)
/// - 4 bytes: dimension D (u32)
/// - 8 bytes: vector count N (u64)
/// - N * D * 4 bytes: f32 LE values in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` components.
    ///
    /// # Examples
    ///
    /// ```
    /// use lectern::VectorIndex;
    ///
    /// let mut index = VectorIndex::new(2);
    /// index.add(&[vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
    ///
    /// let hits = index.search(&[3.0, 3.0], 1).unwrap();
    /// assert_eq!(hits[0].position, 1);
    /// assert_eq!(hits[0].distance, 1.0);
    /// ```
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Append vectors to the end of the index.
    ///
    /// Either every vector is appended or, when any has the wrong dimension,
    /// none is.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Drop every vector at or after ordinal `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension);
    }

    /// Return the `k` stored vectors nearest to `query`, ascending by
    /// squared L2 distance. Returns every vector when fewer than `k` are
    /// stored. Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = self.dimension;
        let mut hits: Vec<Neighbor> = self
            .data
            .par_chunks(SCORE_CHUNK * dimension)
            .enumerate()
            .flat_map_iter(|(block, rows)| {
                rows.chunks_exact(dimension).enumerate().map(
                    move |(offset, row)| Neighbor {
                        position: block * SCORE_CHUNK + offset,
                        distance: squared_l2(query, row),
                    },
                )
            })
            .collect();

        let by_distance = |a: &Neighbor, b: &Neighbor| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        };

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, by_distance);
            hits.truncate(k);
        }
        hits.sort_unstable_by(by_distance);
        Ok(hits)
    }

    /// Serialize the index to `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let dimension = u32::try_from(self.dimension).map_err(|_| {
            Error::CorruptIndex(format!(
                "dimension {} does not fit the index format",
                self.dimension
            ))
        })?;

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&MAGIC);
        header[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        header[8..12].copy_from_slice(&dimension.to_le_bytes());
        header[12..20].copy_from_slice(&(self.len() as u64).to_le_bytes());

        writer.write_all(&header)?;
        if cfg!(target_endian = "little") {
            writer.write_all(bytemuck::cast_slice(&self.data))?;
        } else {
            for value in &self.data {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Deserialize an index previously produced by [`write_to`].
    ///
    /// [`write_to`]: VectorIndex::write_to
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header).map_err(|e| {
            Error::CorruptIndex(format!("failed to read header: {e}"))
        })?;

        if header[0..4] != MAGIC {
            return Err(Error::CorruptIndex("bad magic".to_string()));
        }
        let version = u32::from_le_bytes(read_array(&header[4..8]));
        if version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!(
                "unsupported format version {version}"
            )));
        }
        let dimension = u32::from_le_bytes(read_array(&header[8..12])) as usize;
        let count = u64::from_le_bytes(read_array(&header[12..20]));

        let payload_len = usize::try_from(count)
            .ok()
            .and_then(|n| n.checked_mul(dimension))
            .and_then(|values| values.checked_mul(4))
            .ok_or_else(|| {
                Error::CorruptIndex(format!(
                    "{count} vectors of dimension {dimension} overflow"
                ))
            })?;

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        if payload.len() != payload_len {
            return Err(Error::CorruptIndex(format!(
                "expected {payload_len} payload bytes, found {}",
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(read_array(b)))
            .collect();

        Ok(Self { dimension, data })
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(3);
        index
            .add(&[
                vec![0.0, 0.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![0.0, 2.0, 0.0],
                vec![0.0, 0.0, 3.0],
            ])
            .unwrap();
        index
    }

    #[test]
    fn search_orders_by_distance() {
        let index = sample_index();
        let hits = index.search(&[0.9, 0.0, 0.0], 4).unwrap();

        let positions: Vec<_> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, [1, 0, 2, 3]);
        assert!((hits[0].distance - 0.01).abs() < 1e-6);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn search_returns_all_when_k_exceeds_len() {
        let index = sample_index();
        assert_eq!(index.search(&[0.0; 3], 100).unwrap().len(), 4);
    }

    #[test]
    fn search_truncates_to_k() {
        let index = sample_index();
        let hits = index.search(&[0.0, 0.0, 2.9], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 3);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = VectorIndex::new(1);
        index.add(&[vec![1.0], vec![-1.0], vec![1.0]]).unwrap();
        let hits = index.search(&[0.0], 3).unwrap();
        let positions: Vec<_> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, [0, 1, 2]);
    }

    #[test]
    fn empty_index_search_is_empty() {
        let index = VectorIndex::new(3);
        assert!(index.search(&[0.0; 3], 5).unwrap().is_empty());
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let mut index = sample_index();
        let err = index.add(&[vec![1.0, 2.0, 3.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
        // Nothing from the rejected batch was appended.
        assert_eq!(index.len(), 4);

        assert!(index.search(&[0.0; 2], 1).is_err());
    }

    #[test]
    fn truncate_drops_tail() {
        let mut index = sample_index();
        index.truncate(2);
        assert_eq!(index.len(), 2);
        assert_eq!(index.vector(1), Some(&[1.0, 0.0, 0.0][..]));
        assert_eq!(index.vector(2), None);
    }

    #[test]
    fn serialization_preserves_vectors_and_order() {
        let index = sample_index();
        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 4 * 3 * 4);

        let restored = VectorIndex::read_from(bytes.as_slice()).unwrap();
        assert_eq!(restored, index);
        assert_eq!(restored.vector(2), Some(&[0.0, 2.0, 0.0][..]));
    }

    #[test]
    fn empty_index_roundtrip() {
        let index = VectorIndex::new(384);
        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();

        let restored = VectorIndex::read_from(bytes.as_slice()).unwrap();
        assert_eq!(restored.dimension(), 384);
        assert!(restored.is_empty());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let index = sample_index();
        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);

        assert!(matches!(
            VectorIndex::read_from(bytes.as_slice()),
            Err(Error::CorruptIndex(_))
        ));
    }

    #[test]
    fn oversized_header_count_is_rejected() {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&(1u64 << 62).to_le_bytes());

        assert!(matches!(
            VectorIndex::read_from(bytes.as_slice()),
            Err(Error::CorruptIndex(_))
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bytes = [0u8; HEADER_SIZE];
        assert!(matches!(
            VectorIndex::read_from(&bytes[..]),
            Err(Error::CorruptIndex(_))
        ));
    }
}
