//! Index storage and analysis configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::{Display, EnumString};
use validator::Validate;

/// Text analysis implementation used by tokenized fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnalyzerKind {
    /// Word splitting and lowercasing
    #[default]
    Standard,
    /// Standard plus English stemming
    English,
    /// Whitespace splitting and lowercasing
    Whitespace,
}

/// Index locations and engine settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchConfig {
    /// Primary index, the only one ever written
    pub primary_dir: PathBuf,

    /// Additional indexes searched alongside the primary one
    #[serde(default)]
    pub read_only_dirs: Vec<PathBuf>,

    #[serde(default)]
    pub analyzer: AnalyzerKind,

    /// Index writer heap size in bytes
    #[validate(range(min = 15_000_000))]
    pub writer_heap_size: usize,

    /// Hits collected per index before merging relevance-ranked results
    #[validate(range(min = 1))]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            primary_dir: PathBuf::from("./data/index"),
            read_only_dirs: Vec::new(),
            analyzer: AnalyzerKind::Standard,
            writer_heap_size: 50_000_000, // 50MB
            max_results: 1000,
        }
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn primary_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.primary_dir = path.into();
        self
    }

    pub fn read_only_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.read_only_dirs.push(path.into());
        self
    }

    pub fn analyzer(mut self, analyzer: AnalyzerKind) -> Self {
        self.config.analyzer = analyzer;
        self
    }

    pub fn writer_heap_size(mut self, size: usize) -> Self {
        self.config.writer_heap_size = size;
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = max;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
