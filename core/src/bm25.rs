//! Okapi BM25 scoring and ranking over a [`CorpusIndex`].
//!
//! IDF uses the non-negative form `ln((N - df + 0.5) / (df + 0.5) + 1)`. A
//! query term missing from the corpus-wide frequency map counts as `df = 1`.

use crate::config::Bm25Params;
use crate::tokenizer::tokenize;
use crate::{CorpusIndex, DocumentRecord};
use rayon::prelude::*;
use std::collections::HashMap;

/// A document paired with its relevance to one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDocument<'a> {
    pub document: &'a DocumentRecord,
    pub score: f64,
}

/// Corpus statistics the scorer needs, borrowed from an index.
#[derive(Debug, Clone, Copy)]
pub struct CorpusStats<'a> {
    pub document_count: u32,
    pub average_chunk_length: f64,
    pub document_frequency: &'a HashMap<String, u32>,
}

impl<'a> From<&'a CorpusIndex> for CorpusStats<'a> {
    fn from(index: &'a CorpusIndex) -> Self {
        Self {
            document_count: index.document_count(),
            average_chunk_length: index.average_chunk_length(),
            document_frequency: index.document_frequency(),
        }
    }
}

pub fn idf(n: u32, df: u32) -> f64 {
    let (n, df) = (n as f64, df as f64);
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// BM25 score of `document` for already normalized `query_terms`.
/// `stats.average_chunk_length` must be positive.
pub fn score(query_terms: &[String], document: &DocumentRecord, stats: CorpusStats<'_>, params: Bm25Params) -> f64 {
    let Bm25Params { k1, b } = params;
    let length_norm = 1.0 - b + b * document.length() as f64 / stats.average_chunk_length;
    let mut total = 0.0;
    for term in query_terms {
        let Some(&tf) = document.term_frequency().get(term) else { continue };
        let df = stats.document_frequency.get(term).copied().unwrap_or(1);
        let tf = tf as f64;
        total += idf(stats.document_count, df) * (tf * (k1 + 1.0)) / (tf + k1 * length_norm);
    }
    total
}

/// Score every document against `query`, highest first. Equal scores keep index order.
/// An empty corpus yields no results.
pub fn rank<'a>(query: &str, index: &'a CorpusIndex, params: Bm25Params) -> Vec<ScoredDocument<'a>> {
    if index.is_empty() || index.average_chunk_length() <= 0.0 {
        return Vec::new();
    }
    let query_terms = tokenize(query);
    let stats = CorpusStats::from(index);
    let mut scored: Vec<ScoredDocument<'a>> = index
        .documents()
        .par_iter()
        .map(|document| ScoredDocument { document, score: score(&query_terms, document, stats, params) })
        .collect();
    // stable sort
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}
