// Course catalog loading
// Reads the CSV catalog into ordered rows, keeping every column as written


use serde::Serialize;
use serde::ser::SerializeMap;
use std::path::Path;
use tracing::debug;

use crate::{DandoriError, Result};

pub const COL_ID: &str = "ID";
pub const COL_COURSE_NAME: &str = "Course Name";
pub const COL_INSTRUCTOR: &str = "Instructor";
pub const COL_COURSE_TYPE: &str = "Course Type";
pub const COL_LOCATION: &str = "Location";
pub const COL_COST: &str = "Cost";
pub const COL_LEARNING_OBJECTIVES: &str = "Learning Objectives";
pub const COL_PROVIDED_MATERIALS: &str = "Provided Materials";
pub const COL_SKILLS_DEVELOPED: &str = "Skills Developed";
pub const COL_DESCRIPTION: &str = "Description";

/// One data row of the catalog, as `(column, value)` pairs in header order.
///
/// Serializes as a JSON object whose keys follow the header, so the
/// `/courses` listing mirrors the file exactly, unknown columns included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    fields: Vec<(String, String)>,
}

impl CatalogRow {
    #[inline]
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Value for `column`, or the empty string when the column is absent.
    #[inline]
    pub fn get(&self, column: &str) -> &str {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map_or("", |(_, value)| value.as_str())
    }

    #[inline]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for CatalogRow {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// The ten catalog fields the assistant understands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CourseRecord {
    pub id: String,
    pub course_name: String,
    pub instructor: String,
    pub course_type: String,
    pub location: String,
    pub cost: String,
    pub learning_objectives: String,
    pub provided_materials: String,
    pub skills_developed: String,
    pub description: String,
}

impl CourseRecord {
    #[inline]
    pub fn from_row(row: &CatalogRow) -> Self {
        Self {
            id: row.get(COL_ID).to_string(),
            course_name: row.get(COL_COURSE_NAME).to_string(),
            instructor: row.get(COL_INSTRUCTOR).to_string(),
            course_type: row.get(COL_COURSE_TYPE).to_string(),
            location: row.get(COL_LOCATION).to_string(),
            cost: row.get(COL_COST).to_string(),
            learning_objectives: row.get(COL_LEARNING_OBJECTIVES).to_string(),
            provided_materials: row.get(COL_PROVIDED_MATERIALS).to_string(),
            skills_developed: row.get(COL_SKILLS_DEVELOPED).to_string(),
            description: row.get(COL_DESCRIPTION).to_string(),
        }
    }
}

impl From<&CatalogRow> for CourseRecord {
    #[inline]
    fn from(row: &CatalogRow) -> Self {
        Self::from_row(row)
    }
}

/// Load every row of the catalog at `path`, in file order.
///
/// A missing file, a ragged row or invalid UTF-8 fails the whole load.
#[inline]
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<CatalogRow>> {
    let path = path.as_ref();
    debug!("Loading course catalog from {}", path.display());

    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        DandoriError::Catalog(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let rows = read_rows(&mut reader)
        .map_err(|e| DandoriError::Catalog(format!("Failed to read {}: {}", path.display(), e)))?;

    debug!("Loaded {} catalog rows", rows.len());
    Ok(rows)
}

/// Parse catalog rows from any CSV source with a header row.
#[inline]
pub fn parse_catalog<R: std::io::Read>(source: R) -> Result<Vec<CatalogRow>> {
    let mut reader = csv::Reader::from_reader(source);
    read_rows(&mut reader).map_err(|e| DandoriError::Catalog(format!("Failed to parse catalog: {}", e)))
}

/// Load the catalog and project each row onto a [`CourseRecord`].
#[inline]
pub fn load_course_records<P: AsRef<Path>>(path: P) -> Result<Vec<CourseRecord>> {
    Ok(load_catalog(path)?
        .iter()
        .map(CourseRecord::from_row)
        .collect())
}

fn read_rows<R: std::io::Read>(reader: &mut csv::Reader<R>) -> csv::Result<Vec<CatalogRow>> {
    let headers = reader.headers()?.clone();

    reader
        .records()
        .map(|record| {
            let record = record?;
            let fields = headers
                .iter()
                .zip(record.iter())
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect();
            Ok(CatalogRow::new(fields))
        })
        .collect()
}
