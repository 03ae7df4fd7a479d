//! Vector storage and approximate nearest-neighbour search.
//!
//! The [`VectorIndex`] keeps quantized vectors in inverted lists built by
//! k-means over the stored vectors and answers filtered k-nearest queries.

mod clustering;
mod index;
mod quantize;
mod types;

pub use clustering::{ClusteringError, KMeansResult, cosine_similarity, kmeans_clustering};
pub use index::{KeyFilter, VectorIndex};
pub use quantize::StoredVector;
pub use types::{ClusterId, IndexParams, Metric, Quantization, VectorDimension, VectorError};
