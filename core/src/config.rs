use crate::error::{Error, Result};
use crate::segment::RegexSentenceSplitter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on snippets handed to an end user in one response.
pub const MAX_RESULT_CEILING: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f64,
    /// Length normalization, 0.0 disables it.
    #[serde(default = "default_b")]
    pub b: f64,
}

fn default_k1() -> f64 { 1.5 }
fn default_b() -> f64 { 0.75 }

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: default_k1(), b: default_b() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Directory holding converted documents and their `_toc.md` siblings.
    pub source_dir: PathBuf,
    pub index_path: PathBuf,
    /// Maximum characters per chunk; a single longer sentence still forms one chunk.
    pub chunk_size: usize,
    pub language: String,
    pub bm25: Bm25Params,
    pub result_ceiling: usize,
    pub extensions: Vec<String>,
    pub read_timeout_ms: u64,
    pub lock_timeout_ms: u64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("docs/output"),
            index_path: PathBuf::from("bm25_retriever.bin"),
            chunk_size: 1000,
            language: "english".into(),
            bm25: Bm25Params::default(),
            result_ceiling: MAX_RESULT_CEILING,
            extensions: vec!["md".into()],
            read_timeout_ms: 10_000,
            lock_timeout_ms: 30_000,
        }
    }
}

impl RetrieverConfig {
    /// Load from a TOML file (JSON when the extension is `.json`), apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let parsed = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        } else {
            toml::from_str(&text).map_err(|e| e.to_string())
        };
        parsed.map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("RETRIEVER_SOURCE_DIR") {
            self.source_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("RETRIEVER_INDEX_PATH") {
            self.index_path = PathBuf::from(path);
        }
        if let Ok(size) = std::env::var("RETRIEVER_CHUNK_SIZE") {
            self.chunk_size = size
                .trim()
                .parse()
                .map_err(|_| Error::Configuration(format!("RETRIEVER_CHUNK_SIZE is not a number: {size}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be positive".into()));
        }
        if !self.bm25.k1.is_finite() || self.bm25.k1 < 0.0 {
            return Err(Error::Configuration(format!("bm25.k1 must be finite and >= 0, got {}", self.bm25.k1)));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(Error::Configuration(format!("bm25.b must lie in [0, 1], got {}", self.bm25.b)));
        }
        if !(1..=MAX_RESULT_CEILING).contains(&self.result_ceiling) {
            return Err(Error::Configuration(format!(
                "result_ceiling must lie in 1..={MAX_RESULT_CEILING}, got {}",
                self.result_ceiling
            )));
        }
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(Error::Configuration("extensions must name at least one file type".into()));
        }
        RegexSentenceSplitter::for_language(&self.language)?;
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration { Duration::from_millis(self.read_timeout_ms) }
    pub fn lock_timeout(&self) -> Duration { Duration::from_millis(self.lock_timeout_ms) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = RetrieverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bm25.k1, 1.5);
        assert_eq!(config.bm25.b, 0.75);
        assert_eq!(config.result_ceiling, 5);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let config = RetrieverConfig { chunk_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn rejects_out_of_range_b_and_ceiling() {
        let mut config = RetrieverConfig::default();
        config.bm25.b = 1.5;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        let config = RetrieverConfig { result_ceiling: 6, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn rejects_unknown_language() {
        let config = RetrieverConfig { language: "klingon".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn parses_partial_toml() {
        let parsed: RetrieverConfig = toml::from_str(
            r#"
            chunk_size = 250
            [bm25]
            k1 = 1.2
            "#,
        )
        .unwrap();
        assert_eq!(parsed.chunk_size, 250);
        assert_eq!(parsed.bm25.k1, 1.2);
        assert_eq!(parsed.bm25.b, 0.75);
        assert_eq!(parsed.language, "english");
    }
}
