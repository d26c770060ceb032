// In-process fakes for the provider seams plus catalog fixtures

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{CatalogConfig, Config, IndexConfig};
use crate::provider::{ChatModel, Embedder};
use crate::{DandoriError, Result};

const KEYWORDS: [&str; 6] = ["pottery", "baking", "hiking", "weaving", "london", "leeds"];

pub const THREE_ROW_CSV: &str = "\
ID,Course Name,Instructor,Course Type,Location,Cost,Learning Objectives,Provided Materials,Skills Developed,Description
1,Moonlit Pottery,Ada Fern,Craft,London,£100,Throw a pot,Clay,Patience,Pottery under the stars
2,Whimsical Baking,Bo Reed,Culinary,London,£250,Bake bread,Flour,Kneading,A warm kitchen
3,Fell Hiking,Ada Fern,Craft,Leeds,£bad,Read a map,Compass,Navigation,Hills and weather
";

/// Deterministic embedder: one axis per keyword plus a small shared bias.
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
    fail: bool,
}

impl KeywordEmbedder {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DandoriError::Provider("embedding service down".to_string()));
        }
        let lower = text.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|word| if lower.contains(word) { 1.0 } else { 0.05 })
            .collect())
    }
}

/// Chat model that records every prompt and replies with a canned answer.
#[derive(Debug)]
pub struct RecordingChat {
    answer: String,
    fail: bool,
    delay: Duration,
    prompts: Mutex<Vec<(String, String)>>,
}

impl RecordingChat {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            fail: false,
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::answering("")
        }
    }

    pub fn slow(answer: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::answering(answer)
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompt log poisoned").len()
    }

    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.prompts.lock().expect("prompt log poisoned").last().cloned()
    }
}

impl ChatModel for RecordingChat {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push((system.to_string(), user.to_string()));
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(DandoriError::Provider(
                "upstream said: invalid api key sk-secret".to_string(),
            ));
        }
        Ok(self.answer.clone())
    }
}

/// Config rooted at `dir` with a small vector dimension and the catalog at
/// `dir/courses.csv`.
pub fn test_config(dir: &Path) -> Config {
    Config {
        base_dir: dir.to_path_buf(),
        catalog: CatalogConfig {
            path: dir.join("courses.csv"),
        },
        index: IndexConfig {
            embedding_dimension: KEYWORDS.len() as u32,
            ..IndexConfig::default()
        },
        ..Config::default()
    }
}

pub fn write_catalog(dir: &Path, csv: &str) {
    std::fs::write(dir.join("courses.csv"), csv).expect("should write catalog");
}
