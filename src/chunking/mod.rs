
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CourseRecord;

const CHUNK_ID_PREFIX: &str = "SoD";

/// Represents one catalog row ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseChunk {
    /// `SoD_{ID}_{snake_cased course name}`; not guaranteed unique
    pub id: String,
    /// 1-based position of the source row in the catalog
    pub sequence: usize,
    /// `key = value` lines covering every field of the row
    pub text: String,
    pub metadata: CourseMetadata,
}

/// Subset of a course kept next to its vector for filtering
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CourseMetadata {
    pub course_name: String,
    pub instructor: String,
    pub course_type: String,
    pub location: String,
    pub cost: String,
}

/// Derive the chunk identifier from a course ID and name.
#[inline]
pub fn chunk_id(id: &str, course_name: &str) -> String {
    format!(
        "{}_{}_{}",
        CHUNK_ID_PREFIX,
        id,
        course_name.replace(' ', "_").to_lowercase()
    )
}

/// Render every field of `record` as newline-terminated `key = value` lines.
#[inline]
pub fn chunk_text(record: &CourseRecord) -> String {
    let fields = [
        ("id", &record.id),
        ("course_name", &record.course_name),
        ("instructor", &record.instructor),
        ("course_type", &record.course_type),
        ("location", &record.location),
        ("cost", &record.cost),
        ("learning_objectives", &record.learning_objectives),
        ("provided_materials", &record.provided_materials),
        ("skills_developed", &record.skills_developed),
        ("description", &record.description),
    ];

    fields.iter().fold(String::new(), |mut text, (key, value)| {
        text.push_str(key);
        text.push_str(" = ");
        text.push_str(value);
        text.push('\n');
        text
    })
}

/// Build the chunk for one catalog row. Pure and deterministic.
#[inline]
pub fn build_chunk(record: &CourseRecord, sequence: usize) -> CourseChunk {
    CourseChunk {
        id: chunk_id(&record.id, &record.course_name),
        sequence,
        text: chunk_text(record),
        metadata: CourseMetadata {
            course_name: record.course_name.clone(),
            instructor: record.instructor.clone(),
            course_type: record.course_type.clone(),
            location: record.location.clone(),
            cost: record.cost.clone(),
        },
    }
}

/// Build one chunk per record, numbering rows from 1 in input order.
#[inline]
pub fn build_chunks(records: &[CourseRecord]) -> Vec<CourseChunk> {
    let chunks: Vec<CourseChunk> = records
        .iter()
        .enumerate()
        .map(|(index, record)| build_chunk(record, index + 1))
        .collect();

    debug!("Built {} course chunks", chunks.len());
    chunks
}
