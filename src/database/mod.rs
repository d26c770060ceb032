// Database module
// Embedded LanceDB storage for course embeddings

pub mod lancedb;

pub use self::lancedb::{CourseIndex, IndexParams, InsertOutcome, RetrievedChunk};
