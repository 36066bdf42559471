use crate::bm25::ScoredDocument;
use crate::builder::TOC_SUFFIX;
use crate::config::MAX_RESULT_CEILING;
use crate::segment::strip_chunk_header;
use std::path::{Path, PathBuf};

pub const UNKNOWN_SECTION: &str = "Unknown Section";
const ABBREVIATED_EDGE: usize = 100;

/// How many ranked results to keep before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultLimit {
    /// End-user request, capped at the ceiling.
    Snippets(usize),
    /// Internal top-K use.
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnippetView {
    #[default]
    Full,
    /// First and last 100 characters around `...`.
    Abbreviated,
}

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// Directory searched for `<stem>_toc.md` files.
    pub toc_dir: Option<PathBuf>,
    pub ceiling: usize,
    pub view: SnippetView,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self { toc_dir: None, ceiling: MAX_RESULT_CEILING, view: SnippetView::Full }
    }
}

/// Keep the first `limit` results, then order them by filename. The sort is
/// stable so relevance order survives inside each file.
pub fn select<'a>(ranked: &[ScoredDocument<'a>], limit: ResultLimit, ceiling: usize) -> Vec<ScoredDocument<'a>> {
    let keep = match limit {
        ResultLimit::Snippets(n) => n.min(ceiling.min(MAX_RESULT_CEILING)),
        ResultLimit::Unbounded => ranked.len(),
    };
    let mut selected: Vec<ScoredDocument<'a>> = ranked.iter().take(keep).copied().collect();
    selected.sort_by(|a, b| filename_of(a).cmp(filename_of(b)));
    selected
}

/// Render ranked results grouped by source file.
pub fn assemble(ranked: &[ScoredDocument<'_>], limit: ResultLimit, options: &AssembleOptions) -> String {
    let selected = select(ranked, limit, options.ceiling);
    let mut output: Vec<String> = Vec::new();

    for group in selected.chunk_by(|a, b| filename_of(a) == filename_of(b)) {
        let filename = filename_of(&group[0]);
        output.push(format!("============================{filename}============================"));
        if let Some(toc) = options.toc_dir.as_deref().and_then(|dir| read_toc(dir, filename)) {
            output.push("Table of Content".to_string());
            output.push(toc);
            output.push("\n===========\n".to_string());
        }
        for hit in group {
            let section = hit.document.section().unwrap_or(UNKNOWN_SECTION);
            output.push(format!("Section: {section}"));
            let snippet = render_snippet(strip_chunk_header(hit.document.content()), options.view);
            output.push(format!("\nRelevant Snippet: \n{snippet}\nScore: {:.1}", hit.score));
            output.push("\n==============\n".to_string());
        }
        output.push("\n=======================\n".to_string());
    }
    output.join("\n")
}

fn filename_of<'b>(hit: &'b ScoredDocument<'_>) -> &'b str {
    hit.document.filename().unwrap_or_default()
}

pub fn toc_path(dir: &Path, filename: &str) -> PathBuf {
    let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
    dir.join(format!("{stem}{TOC_SUFFIX}"))
}

fn read_toc(dir: &Path, filename: &str) -> Option<String> {
    let path = toc_path(dir, filename);
    match std::fs::read_to_string(&path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read table of contents");
            None
        }
    }
}

pub fn render_snippet(snippet: &str, view: SnippetView) -> String {
    match view {
        SnippetView::Full => snippet.to_string(),
        SnippetView::Abbreviated => {
            let count = snippet.chars().count();
            if count <= 2 * ABBREVIATED_EDGE {
                return snippet.to_string();
            }
            let head: String = snippet.chars().take(ABBREVIATED_EDGE).collect();
            let tail: String = snippet.chars().skip(count - ABBREVIATED_EDGE).collect();
            format!("{head}...{tail}")
        }
    }
}
