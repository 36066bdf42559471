use crate::assemble::{self, AssembleOptions, ResultLimit, SnippetView};
use crate::bm25::{self, ScoredDocument};
use crate::config::{Bm25Params, RetrieverConfig};
use crate::error::Result;
use crate::persist::{self, IndexOrigin};
use crate::segment::strip_chunk_header;
use crate::CorpusIndex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// A ranked chunk in structured form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub filename: String,
    pub section: String,
    pub score: f64,
    pub snippet: String,
}

/// Query side of the engine: an immutable index plus the scoring and display settings.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<CorpusIndex>,
    params: Bm25Params,
    toc_dir: PathBuf,
    ceiling: usize,
}

impl Retriever {
    /// Load the persisted index, building it first when missing or when `refresh` is set.
    pub fn open(config: &RetrieverConfig, refresh: bool) -> Result<Self> {
        let outcome = persist::load_or_build(config, refresh)?;
        if let IndexOrigin::Built { skipped } = &outcome.origin {
            if !skipped.is_empty() {
                let warning = crate::PartialBuildWarning { skipped: skipped.clone() };
                tracing::warn!(%warning, "index built from a partial corpus");
            }
        }
        Ok(Self::from_index(outcome.index, config))
    }

    pub fn from_index(index: CorpusIndex, config: &RetrieverConfig) -> Self {
        Self {
            index: Arc::new(index),
            params: config.bm25,
            toc_dir: config.source_dir.clone(),
            ceiling: config.result_ceiling,
        }
    }

    pub fn index(&self) -> &CorpusIndex { &self.index }

    pub fn rank(&self, query: &str) -> Vec<ScoredDocument<'_>> {
        bm25::rank(query, &self.index, self.params)
    }

    /// Formatted snippets for at most `limit` (capped) chunks. An empty query gives `""`.
    pub fn search(&self, query: &str, limit: usize) -> String {
        if query.trim().is_empty() {
            return String::new();
        }
        self.format(&self.rank(query), limit)
    }

    /// Formatted top-`k` view without the end-user cap.
    pub fn top_k(&self, query: &str, k: usize, view: SnippetView) -> String {
        if query.trim().is_empty() {
            return String::new();
        }
        let mut ranked = self.rank(query);
        ranked.truncate(k);
        assemble::assemble(&ranked, ResultLimit::Unbounded, &self.options(view))
    }

    pub fn format(&self, ranked: &[ScoredDocument<'_>], limit: usize) -> String {
        assemble::assemble(ranked, ResultLimit::Snippets(limit), &self.options(SnippetView::Full))
    }

    /// Structured hits in display order (grouped by filename).
    pub fn hits(&self, query: &str, limit: usize) -> Vec<Hit> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        self.to_hits(&self.rank(query), limit)
    }

    pub fn to_hits(&self, ranked: &[ScoredDocument<'_>], limit: usize) -> Vec<Hit> {
        assemble::select(ranked, ResultLimit::Snippets(limit), self.ceiling)
            .into_iter()
            .map(|r| Hit {
                filename: r.document.filename().unwrap_or_default().to_string(),
                section: r.document.section().unwrap_or(assemble::UNKNOWN_SECTION).to_string(),
                score: r.score,
                snippet: strip_chunk_header(r.document.content()).to_string(),
            })
            .collect()
    }

    fn options(&self, view: SnippetView) -> AssembleOptions {
        AssembleOptions { toc_dir: Some(self.toc_dir.clone()), ceiling: self.ceiling, view }
    }
}
