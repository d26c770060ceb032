// LanceDB vector database module
// Named course collection with cosine similarity search


pub mod vector_store;

pub use vector_store::CourseIndex;

use ::lancedb::DistanceType;
use serde::Serialize;

use crate::chunking::CourseMetadata;

/// Minimum row count before an approximate index is worth building.
/// Smaller tables are scanned exhaustively.
pub const ANN_INDEX_MIN_ROWS: usize = 256;

/// Similarity settings for the course collection.
#[derive(Debug, Clone, Copy)]
pub struct IndexParams {
    pub distance_type: DistanceType,
    /// HNSW graph degree (`m`)
    pub num_edges: u32,
    pub ef_construction: u32,
    pub ef_search: usize,
    pub ann_min_rows: usize,
}

impl Default for IndexParams {
    #[inline]
    fn default() -> Self {
        Self {
            distance_type: DistanceType::Cosine,
            num_edges: 32,
            ef_construction: 400,
            ef_search: 200,
            ann_min_rows: ANN_INDEX_MIN_ROWS,
        }
    }
}

/// Result of an ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The table was empty and this many rows were written
    Inserted(usize),
    /// The table already held this many rows; nothing was embedded or written
    Skipped(usize),
}

impl InsertOutcome {
    /// Row count after the attempt.
    #[inline]
    pub fn total(self) -> usize {
        match self {
            Self::Inserted(n) | Self::Skipped(n) => n,
        }
    }
}

/// One nearest-neighbour hit, closest first in query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub sequence: usize,
    pub text: String,
    pub metadata: CourseMetadata,
    /// Cosine distance to the query vector (0 is identical)
    pub distance: f32,
}
