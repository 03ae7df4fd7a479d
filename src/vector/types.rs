//! Type-safe wrappers and core types for the vector index.
//!
//! Newtypes here keep dimensions and cluster identifiers from being mixed
//! up with plain integers, and the option types mirror the index's
//! configuration surface.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use thiserror::Error;

use crate::vector::clustering::cosine_similarity;

/// Type-safe wrapper for cluster IDs in the inverted-list index.
///
/// Clusters are identified by non-zero IDs to prevent confusion
/// with uninitialized or error states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterId(NonZeroU32);

impl ClusterId {
    /// Creates a new `ClusterId` from a non-zero u32.
    ///
    /// Returns `None` if the provided ID is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Creates the ID for a zero-based list position.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index as u32))
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Zero-based position of the cluster's list.
    #[must_use]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Validated once at construction; every vector entering the index or a
/// query is checked against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Distance metric used to rank vectors. Smaller distance is closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Cosine distance, `1 - cos(a, b)`
    #[default]
    Cos,
    /// Inner-product distance, `1 - a·b`
    Ip,
    /// Squared euclidean distance
    L2sq,
}

impl Metric {
    /// Distance between two vectors of equal length.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
        match self {
            Self::Cos => 1.0 - cosine_similarity(a, b),
            Self::Ip => 1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
            Self::L2sq => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cos => "cos",
            Self::Ip => "ip",
            Self::L2sq => "l2sq",
        }
    }
}

/// Storage precision for vectors held by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum Quantization {
    F32,
    /// Upper 16 bits of the f32 representation
    #[default]
    Bf16,
    /// Symmetric per-vector int8 with a stored scale
    I8,
}

/// Tuning parameters for [`VectorIndex`](crate::vector::VectorIndex).
///
/// `connectivity` is the target number of vectors per inverted list,
/// `expansion_add` bounds the k-means refinement passes run when lists are
/// rebuilt, and `expansion_search` is the minimum number of lists scanned
/// per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(default)]
pub struct IndexParams {
    pub metric: Metric,
    pub quantization: Quantization,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            metric: Metric::Cos,
            quantization: Quantization::Bf16,
            connectivity: 32,
            expansion_add: 40,
            expansion_search: 16,
        }
    }
}

impl IndexParams {
    pub fn validate(&self) -> Result<(), VectorError> {
        let checks = [
            ("connectivity", self.connectivity),
            ("expansion_add", self.expansion_add),
            ("expansion_search", self.expansion_search),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(VectorError::InvalidParameter {
                    name,
                    reason: "must be greater than zero",
                });
            }
        }
        Ok(())
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid index parameter '{name}': {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },

    #[error("Key {0} is already present in the index\nSuggestion: Remove the key before adding it again")]
    DuplicateKey(u64),

    #[error(
        "Clustering failed: {0}\nSuggestion: Ensure sufficient vectors are available for clustering (minimum: k clusters)"
    )]
    ClusteringFailed(String),

    #[error(
        "Index snapshot is inconsistent: {0}\nSuggestion: Check that vector data is valid and not corrupted"
    )]
    CorruptSnapshot(String),
}
