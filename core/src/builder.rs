use crate::config::RetrieverConfig;
use crate::error::{Error, PartialBuildWarning, Result, SkippedFile};
use crate::segment::{segment_into_sections, Chunker, RegexSentenceSplitter};
use crate::{accumulate_document_frequency, merge_document_frequency, CorpusIndex, DocumentRecord};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use walkdir::WalkDir;

pub const TOC_SUFFIX: &str = "_toc.md";

/// Output of a build: the index plus any files that had to be left out.
#[derive(Debug)]
pub struct BuildReport {
    pub index: CorpusIndex,
    pub skipped: Vec<SkippedFile>,
}

impl BuildReport {
    pub fn warning(&self) -> Option<PartialBuildWarning> {
        if self.skipped.is_empty() {
            None
        } else {
            Some(PartialBuildWarning { skipped: self.skipped.clone() })
        }
    }
}

/// Records and partial document frequencies produced from one source file.
#[derive(Debug, Default)]
struct FileContribution {
    records: Vec<DocumentRecord>,
    document_frequency: HashMap<String, u32>,
}

pub struct CorpusBuilder {
    splitter: RegexSentenceSplitter,
    chunk_size: usize,
    extensions: Vec<String>,
    read_timeout: Duration,
}

impl CorpusBuilder {
    pub fn new(config: &RetrieverConfig) -> Result<Self> {
        Ok(Self {
            splitter: RegexSentenceSplitter::for_language(&config.language)?,
            chunk_size: config.chunk_size,
            extensions: config.extensions.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect(),
            read_timeout: config.read_timeout(),
        })
    }

    pub fn build(&self, documents_dir: &Path) -> Result<BuildReport> {
        let (files, mut skipped) = eligible_files(documents_dir, &self.extensions)?;
        tracing::info!(dir = %documents_dir.display(), files = files.len(), "building corpus index");

        let contributions: Vec<(PathBuf, std::result::Result<FileContribution, String>)> = files
            .into_par_iter()
            .map(|path| {
                let outcome = self.process_file(&path);
                (path, outcome)
            })
            .collect();

        let mut documents = Vec::new();
        let mut document_frequency = HashMap::new();
        for (path, outcome) in contributions {
            match outcome {
                Ok(part) => {
                    tracing::debug!(file = %path.display(), chunks = part.records.len(), "indexed file");
                    documents.extend(part.records);
                    merge_document_frequency(&mut document_frequency, part.document_frequency);
                }
                Err(reason) => {
                    tracing::warn!(file = %path.display(), %reason, "skipping file");
                    skipped.push(SkippedFile { path, reason });
                }
            }
        }

        let index = CorpusIndex::from_parts(documents, document_frequency);
        tracing::info!(
            num_chunks = index.document_count(),
            num_terms = index.document_frequency().len(),
            avgdl = index.average_chunk_length(),
            skipped = skipped.len(),
            "corpus index built"
        );
        Ok(BuildReport { index, skipped })
    }

    fn process_file(&self, path: &Path) -> std::result::Result<FileContribution, String> {
        let text = read_with_timeout(path, self.read_timeout)?;
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let chunker = Chunker::new(&self.splitter, self.chunk_size);

        let mut part = FileContribution::default();
        for (title, body) in segment_into_sections(&text) {
            for record in chunker.segment_into_chunks(filename, &title, &body) {
                accumulate_document_frequency(&mut part.document_frequency, &record);
                part.records.push(record);
            }
        }
        Ok(part)
    }
}

/// Files directly inside `dir` with an eligible extension, excluding TOC artifacts, sorted by name.
pub fn eligible_files(dir: &Path, extensions: &[String]) -> Result<(Vec<PathBuf>, Vec<SkippedFile>)> {
    if !dir.is_dir() {
        return Err(Error::NotFound { path: dir.to_path_buf() });
    }
    let mut files = Vec::new();
    let mut skipped = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && is_eligible(path, extensions) {
                    files.push(path.to_path_buf());
                }
            }
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                tracing::warn!(file = %path.display(), error = %e, "cannot list entry");
                skipped.push(SkippedFile { path, reason: e.to_string() });
            }
        }
    }
    Ok((files, skipped))
}

pub fn is_eligible(path: &Path, extensions: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else { return false };
    let name = name.to_lowercase();
    if name.ends_with(TOC_SUFFIX) {
        return false;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions.iter().any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Read a whole file as UTF-8 on a helper thread, giving up after `timeout`.
/// A timed-out read is not cancelled; the helper thread finishes it in the
/// background and its result is dropped.
fn read_with_timeout(path: &Path, timeout: Duration) -> std::result::Result<String, String> {
    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();
    std::thread::spawn(move || {
        let _ = tx.send(std::fs::read_to_string(&owned));
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(e.to_string()),
        Err(RecvTimeoutError::Timeout) => Err(format!("read timed out after {} ms", timeout.as_millis())),
        Err(RecvTimeoutError::Disconnected) => Err("reader thread exited without a result".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> { vec!["md".to_string()] }

    #[test]
    fn eligibility() {
        assert!(is_eligible(Path::new("/d/report.md"), &exts()));
        assert!(is_eligible(Path::new("/d/REPORT.MD"), &exts()));
        assert!(!is_eligible(Path::new("/d/report_toc.md"), &exts()));
        assert!(!is_eligible(Path::new("/d/report.pdf"), &exts()));
        assert!(!is_eligible(Path::new("/d/README"), &exts()));
        assert!(is_eligible(Path::new("/d/notes.txt"), &["md".to_string(), ".txt".to_string()]));
    }

    #[test]
    fn missing_dir_is_not_found() {
        let builder = CorpusBuilder::new(&RetrieverConfig::default()).unwrap();
        let err = builder.build(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn report_without_skips_has_no_warning() {
        let report = BuildReport { index: CorpusIndex::new(), skipped: vec![] };
        assert!(report.warning().is_none());
    }
}
