// Catalog overview statistics
// Summary counts fed to the answer model alongside the retrieved courses


use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::chunking::CourseChunk;

/// Aggregate figures over the whole catalog.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogStats {
    pub total_courses: usize,
    pub locations: BTreeMap<String, usize>,
    pub course_types: BTreeMap<String, usize>,
    pub instructor_count: usize,
    /// `(min, max)` over every cost that parsed; `None` when none did
    pub price_range: Option<(f64, f64)>,
}

impl CatalogStats {
    #[inline]
    pub fn from_chunks(chunks: &[CourseChunk]) -> Self {
        let mut locations = BTreeMap::new();
        let mut course_types = BTreeMap::new();
        let mut instructors = HashSet::new();
        let mut price_range: Option<(f64, f64)> = None;

        for chunk in chunks {
            let meta = &chunk.metadata;

            *locations.entry(meta.location.clone()).or_insert(0) += 1;
            *course_types.entry(meta.course_type.clone()).or_insert(0) += 1;
            instructors.insert(meta.instructor.as_str());

            if let Some(price) = parse_price(&meta.cost) {
                price_range = Some(match price_range {
                    Some((min, max)) => (min.min(price), max.max(price)),
                    None => (price, price),
                });
            }
        }

        Self {
            total_courses: chunks.len(),
            locations,
            course_types,
            instructor_count: instructors.len(),
            price_range,
        }
    }

    /// `£min - £max` with two decimals, or `N/A`.
    #[inline]
    pub fn price_range_label(&self) -> String {
        self.price_range.map_or_else(
            || "N/A".to_string(),
            |(min, max)| format!("£{:.2} - £{:.2}", min, max),
        )
    }

    #[inline]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CatalogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SCHOOL OVERVIEW:")?;
        writeln!(f, "- Total Courses: {}", self.total_courses)?;
        writeln!(f, "- Locations: {}", join_keys(&self.locations))?;
        writeln!(f, "- Course Types: {}", join_keys(&self.course_types))?;
        writeln!(f, "- Price Range: {}", self.price_range_label())?;
        writeln!(
            f,
            "- Instructors: {} unique instructors",
            self.instructor_count
        )?;
        writeln!(f)?;
        writeln!(f, "LOCATION BREAKDOWN:")?;
        write_breakdown(f, &self.locations)?;
        writeln!(f)?;
        writeln!(f, "COURSE TYPE BREAKDOWN:")?;
        write_breakdown(f, &self.course_types)
    }
}

/// Parse a currency-prefixed cost such as `£1,250.50`.
///
/// Strips `£` and thousands separators; anything that is still not a finite
/// number is rejected.
#[inline]
pub fn parse_price(cost: &str) -> Option<f64> {
    let cleaned = cost.replace(['£', ','], "");
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|price| price.is_finite())
}

fn join_keys(counts: &BTreeMap<String, usize>) -> String {
    counts.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn write_breakdown(f: &mut fmt::Formatter<'_>, counts: &BTreeMap<String, usize>) -> fmt::Result {
    for (name, count) in counts {
        writeln!(f, "  - {}: {} courses", name, count)?;
    }
    Ok(())
}
