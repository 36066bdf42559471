use crate::error::{Error, Result};
use crate::{DocumentRecord, META_FILENAME, META_SECTION};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

/// Marker run length below which a line is not a heading (`#` alone is usually a title page artifact).
pub const MIN_HEADING_MARKERS: usize = 2;
/// Shortest title, in characters, that makes a heading.
pub const MIN_TITLE_CHARS: usize = 5;

lazy_static! {
    static ref HEADING: Regex = Regex::new(r"^([#*|$]+)\s*(.*)$").expect("valid regex");
    static ref SENTENCE_END: Regex = Regex::new(r#"[.!?]+["')\]]*(?:\s+|$)"#).expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub title: String,
}

/// Recognize a heading line: a run of `# * | $` markers followed by title text.
pub fn parse_heading(line: &str) -> Option<Heading> {
    let caps = HEADING.captures(line)?;
    let level = caps[1].chars().count();
    let raw = caps[2].trim();
    if level < MIN_HEADING_MARKERS || raw.chars().count() < MIN_TITLE_CHARS {
        return None;
    }
    // closing markers count toward the length but are not part of the title
    let title = raw.trim_end_matches(|c: char| matches!(c, '#' | '*')).trim_end();
    if title.is_empty() {
        return None;
    }
    Some(Heading { level, title: title.to_string() })
}

/// Split `text` into `(title, body)` pairs. Lines before the first heading are dropped.
pub fn segment_into_sections(text: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut title: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        if let Some(heading) = parse_heading(line) {
            if let Some(prev) = title.take() {
                sections.push((prev, body.join("\n")));
            }
            body.clear();
            title = Some(heading.title);
            continue;
        }
        body.push(line);
    }
    if let Some(prev) = title {
        sections.push((prev, body.join("\n")));
    }
    sections
}

/// Sentence tokenization used by the chunker.
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Punctuation-driven splitter that refuses to break after known abbreviations.
#[derive(Debug, Clone)]
pub struct RegexSentenceSplitter {
    language: &'static str,
    abbreviations: &'static [&'static str],
}

const ENGLISH: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "fig", "no", "vol",
    "inc", "ltd", "co", "corp", "approx", "dept", "est", "jan", "feb", "mar", "apr", "jun", "jul", "aug",
    "sep", "sept", "oct", "nov", "dec",
];
const GERMAN: &[&str] = &[
    "z.b", "bzw", "usw", "dr", "prof", "nr", "ca", "vgl", "ggf", "evtl", "inkl", "d.h", "u.a", "s", "str",
];
const FRENCH: &[&str] = &["m", "mme", "mlle", "dr", "etc", "p.ex", "cf", "env", "av", "bd"];
const SPANISH: &[&str] = &["sr", "sra", "srta", "dr", "dra", "etc", "ud", "uds", "p.ej", "pág", "núm"];
const DUTCH: &[&str] = &["dhr", "mevr", "dr", "prof", "bijv", "enz", "o.a", "m.b.t", "nr"];

impl RegexSentenceSplitter {
    pub fn for_language(language: &str) -> Result<Self> {
        let (language, abbreviations) = match language.trim().to_lowercase().as_str() {
            "english" => ("english", ENGLISH),
            "german" => ("german", GERMAN),
            "french" => ("french", FRENCH),
            "spanish" => ("spanish", SPANISH),
            "dutch" => ("dutch", DUTCH),
            other => return Err(Error::Configuration(format!("unsupported sentence tokenizer language: {other}"))),
        };
        Ok(Self { language, abbreviations })
    }

    pub fn language(&self) -> &str { self.language }

    fn is_abbreviation(&self, before: &str) -> bool {
        let word = before
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .trim_end_matches('.')
            .to_lowercase();
        if word.is_empty() {
            return false;
        }
        // Single letters are initials ("J. Smith").
        (word.chars().count() == 1 && word.chars().all(char::is_alphabetic)) || self.abbreviations.contains(&word.as_str())
    }
}

impl SentenceSplitter for RegexSentenceSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        let mut sentences = Vec::new();
        let mut start = 0;
        for mat in SENTENCE_END.find_iter(text) {
            let punct = mat.as_str().trim_end();
            let single_dot = punct.trim_end_matches(|c: char| matches!(c, '"' | '\'' | ')' | ']')) == ".";
            let next_lower = text[mat.end()..].chars().next().is_some_and(char::is_lowercase);
            if single_dot && (self.is_abbreviation(&text[start..mat.start()]) || next_lower) {
                continue;
            }
            let sentence = text[start..mat.end()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = mat.end();
        }
        let rest = text[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }
        sentences
    }
}

/// Packs a section's sentences into chunks of at most `max_chunk_chars` characters.
pub struct Chunker<'a> {
    splitter: &'a dyn SentenceSplitter,
    max_chunk_chars: usize,
}

impl<'a> Chunker<'a> {
    pub fn new(splitter: &'a dyn SentenceSplitter, max_chunk_chars: usize) -> Self {
        Self { splitter, max_chunk_chars }
    }

    pub fn segment_into_chunks(&self, filename: &str, section_title: &str, section_body: &str) -> Vec<DocumentRecord> {
        let sentences = self.splitter.split(section_body);
        group_sentences(&sentences, self.max_chunk_chars)
            .into_iter()
            .map(|joined| chunk_record(filename, section_title, &joined))
            .collect()
    }
}

/// Greedy grouping; a sentence that alone exceeds the limit becomes its own group.
pub fn group_sentences(sentences: &[String], max_chunk_chars: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;
    for sentence in sentences {
        let len = sentence.chars().count();
        if !current.is_empty() && current_len + len > max_chunk_chars {
            groups.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
        current.push(sentence);
        current_len += len;
    }
    if !current.is_empty() {
        groups.push(current.join(" "));
    }
    groups
}

pub fn chunk_record(filename: &str, section_title: &str, snippet: &str) -> DocumentRecord {
    let content = format!("Document: {filename}\nSection: {section_title}\nSnippet: {snippet}");
    let mut metadata = BTreeMap::new();
    metadata.insert(META_FILENAME.to_string(), filename.to_string());
    metadata.insert(META_SECTION.to_string(), section_title.to_string());
    DocumentRecord::new(content, metadata)
}

/// The chunk text without its `Document:` / `Section:` / `Snippet:` header.
pub fn strip_chunk_header(content: &str) -> &str {
    let mut parts = content.splitn(3, '\n');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(doc), Some(sec), Some(rest)) if doc.starts_with("Document: ") && sec.starts_with("Section: ") => {
            rest.strip_prefix("Snippet: ").unwrap_or(rest)
        }
        _ => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn english() -> RegexSentenceSplitter {
        RegexSentenceSplitter::for_language("english").unwrap()
    }

    #[test]
    fn headings_need_two_markers_and_five_chars() {
        assert_eq!(parse_heading("## Introduction").map(|h| h.title), Some("Introduction".into()));
        assert_eq!(parse_heading("**Overview of things**").map(|h| h.level), Some(2));
        assert!(parse_heading("# Introduction").is_none());
        assert!(parse_heading("## Tiny").is_none());
        assert!(parse_heading("plain text line").is_none());
    }

    #[test]
    fn closing_markers_count_toward_title_length() {
        let h = parse_heading("**Note**").unwrap();
        assert_eq!(h.level, 2);
        assert_eq!(h.title, "Note");
        assert!(parse_heading("**Tip*").is_none());
        assert!(parse_heading("## #####").is_none());
        let sections = segment_into_sections("## First section
alpha
**Note**
beta");
        assert_eq!(
            sections,
            vec![("First section".to_string(), "alpha".to_string()), ("Note".to_string(), "beta".to_string())]
        );
    }

    #[test]
    fn sections_drop_preamble() {
        let text = "preamble line\n## First section\nalpha\nbeta\n### Second section\ngamma";
        let sections = segment_into_sections(text);
        assert_eq!(
            sections,
            vec![
                ("First section".to_string(), "alpha\nbeta".to_string()),
                ("Second section".to_string(), "gamma".to_string()),
            ]
        );
    }

    #[test]
    fn no_headings_no_sections() {
        assert!(segment_into_sections("just text\nmore text").is_empty());
        assert!(segment_into_sections("").is_empty());
    }

    #[test]
    fn heading_with_empty_body_still_emitted() {
        let sections = segment_into_sections("## Empty section\n## Next section here\nx");
        assert_eq!(sections[0], ("Empty section".to_string(), String::new()));
        assert_eq!(sections.len(), 2);
    }

    #[test]
    fn splits_sentences() {
        let s = english().split("Hello. This is a longer sentence.");
        assert_eq!(s, vec!["Hello.", "This is a longer sentence."]);
    }

    #[test]
    fn keeps_abbreviations_and_initials() {
        let s = english().split("Dr. Smith met J. Doe today. They talked e.g. about tea! Done?");
        assert_eq!(s, vec!["Dr. Smith met J. Doe today.", "They talked e.g. about tea!", "Done?"]);
    }

    #[test]
    fn trailing_text_without_punctuation() {
        assert_eq!(english().split("One. two words"), vec!["One. two words"]);
        assert_eq!(english().split("One. Two words"), vec!["One.", "Two words"]);
        assert!(english().split("   ").is_empty());
    }

    #[test]
    fn chunk_closes_before_overflow() {
        let sentences = vec!["Hello.".to_string(), "This is a longer sentence.".to_string()];
        let groups = group_sentences(&sentences, 10);
        assert_eq!(groups, vec!["Hello.", "This is a longer sentence."]);
    }

    #[test]
    fn sentences_fill_up_to_limit() {
        let sentences: Vec<String> = ["Aa.", "Bb.", "Cc.", "Dd."].iter().map(|s| s.to_string()).collect();
        assert_eq!(group_sentences(&sentences, 6), vec!["Aa. Bb.", "Cc. Dd."]);
        assert_eq!(group_sentences(&sentences, 100), vec!["Aa. Bb. Cc. Dd."]);
    }

    #[test]
    fn oversized_sentence_is_not_split() {
        let sentences = vec!["This single sentence is far too long.".to_string()];
        assert_eq!(group_sentences(&sentences, 5), vec!["This single sentence is far too long."]);
    }

    #[test]
    fn chunk_content_and_metadata() {
        let splitter = english();
        let chunker = Chunker::new(&splitter, 10);
        let chunks = chunker.segment_into_chunks("a.md", "Intro section", "Hello. This is a longer sentence.");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content(), "Document: a.md\nSection: Intro section\nSnippet: Hello.");
        assert_eq!(chunks[0].filename(), Some("a.md"));
        assert_eq!(chunks[0].section(), Some("Intro section"));
        assert_eq!(strip_chunk_header(chunks[1].content()), "This is a longer sentence.");
    }

    #[test]
    fn strip_leaves_unheaded_text_alone() {
        assert_eq!(strip_chunk_header("no header here"), "no header here");
        assert_eq!(strip_chunk_header("Document: a\nSection: b\nSnippet: one\ntwo"), "one\ntwo");
    }
}
