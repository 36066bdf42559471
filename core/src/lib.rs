pub mod assemble;
pub mod bm25;
pub mod builder;
pub mod config;
pub mod error;
pub mod persist;
pub mod search;
pub mod segment;
pub mod tokenizer;
pub mod toc;

pub use config::{Bm25Params, RetrieverConfig};
pub use error::{Error, PartialBuildWarning, Result, SkippedFile};
pub use search::{Hit, Retriever};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const META_FILENAME: &str = "filename";
pub const META_SECTION: &str = "section";

/// One indexed chunk. The derived fields are computed from `content` at
/// construction and never updated separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    content: String,
    metadata: BTreeMap<String, String>,
    terms: Vec<String>,
    term_frequency: HashMap<String, u32>,
    length: u32,
}

impl DocumentRecord {
    pub fn new(content: String, metadata: BTreeMap<String, String>) -> Self {
        let terms = tokenizer::tokenize(&content);
        let mut term_frequency: HashMap<String, u32> = HashMap::new();
        for term in &terms {
            *term_frequency.entry(term.clone()).or_insert(0) += 1;
        }
        let length = terms.len() as u32;
        Self { content, metadata, terms, term_frequency, length }
    }

    pub fn content(&self) -> &str { &self.content }
    pub fn metadata(&self) -> &BTreeMap<String, String> { &self.metadata }
    pub fn terms(&self) -> &[String] { &self.terms }
    pub fn term_frequency(&self) -> &HashMap<String, u32> { &self.term_frequency }
    pub fn length(&self) -> u32 { self.length }

    pub fn filename(&self) -> Option<&str> { self.metadata.get(META_FILENAME).map(String::as_str) }
    pub fn section(&self) -> Option<&str> { self.metadata.get(META_SECTION).map(String::as_str) }

    /// Whether the derived fields still agree with `content`.
    pub fn is_consistent(&self) -> bool {
        let fresh = Self::new(self.content.clone(), BTreeMap::new());
        fresh.terms == self.terms && fresh.term_frequency == self.term_frequency && fresh.length == self.length
    }
}

/// Corpus-wide statistics plus every indexed chunk. Built wholesale, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusIndex {
    documents: Vec<DocumentRecord>,
    document_count: u32,
    average_chunk_length: f64,
    document_frequency: HashMap<String, u32>,
}

/// Add one to the document frequency of every distinct term in `doc`.
pub fn accumulate_document_frequency(df: &mut HashMap<String, u32>, doc: &DocumentRecord) {
    for term in doc.term_frequency.keys() {
        *df.entry(term.clone()).or_insert(0) += 1;
    }
}

/// Sum `part` into `total`.
pub fn merge_document_frequency(total: &mut HashMap<String, u32>, part: HashMap<String, u32>) {
    for (term, count) in part {
        *total.entry(term).or_insert(0) += count;
    }
}

impl CorpusIndex {
    pub fn new() -> Self { Self::default() }

    pub fn from_documents(documents: Vec<DocumentRecord>) -> Self {
        let mut df = HashMap::new();
        for doc in &documents {
            accumulate_document_frequency(&mut df, doc);
        }
        Self::from_parts(documents, df)
    }

    /// Assemble from records and an already aggregated frequency map.
    pub(crate) fn from_parts(documents: Vec<DocumentRecord>, document_frequency: HashMap<String, u32>) -> Self {
        let document_count = documents.len() as u32;
        let average_chunk_length = mean_length(&documents);
        Self { documents, document_count, average_chunk_length, document_frequency }
    }

    pub fn documents(&self) -> &[DocumentRecord] { &self.documents }
    pub fn document_count(&self) -> u32 { self.document_count }
    pub fn average_chunk_length(&self) -> f64 { self.average_chunk_length }
    pub fn document_frequency(&self) -> &HashMap<String, u32> { &self.document_frequency }
    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    /// Check every corpus invariant, returning the first violation found.
    pub fn verify(&self) -> std::result::Result<(), String> {
        if self.document_count as usize != self.documents.len() {
            return Err(format!("document_count {} but {} documents", self.document_count, self.documents.len()));
        }
        let expected_avg = mean_length(&self.documents);
        if (expected_avg - self.average_chunk_length).abs() > 1e-9 * expected_avg.max(1.0) {
            return Err(format!("average_chunk_length {} but expected {expected_avg}", self.average_chunk_length));
        }
        if let Some(pos) = self.documents.iter().position(|d| !d.is_consistent()) {
            return Err(format!("document {pos} has stale term statistics"));
        }
        let mut expected_df = HashMap::new();
        for doc in &self.documents {
            accumulate_document_frequency(&mut expected_df, doc);
        }
        if expected_df != self.document_frequency {
            let terms: HashSet<&String> = expected_df.keys().chain(self.document_frequency.keys()).collect();
            let bad = terms
                .into_iter()
                .find(|t| expected_df.get(*t) != self.document_frequency.get(*t))
                .cloned()
                .unwrap_or_default();
            return Err(format!("document_frequency disagrees with documents for term {bad:?}"));
        }
        Ok(())
    }
}

fn mean_length(documents: &[DocumentRecord]) -> f64 {
    if documents.is_empty() {
        return 0.0;
    }
    let total: u64 = documents.iter().map(|d| d.length as u64).sum();
    total as f64 / documents.len() as f64
}
