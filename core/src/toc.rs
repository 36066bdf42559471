use crate::assemble::toc_path;
use crate::builder::eligible_files;
use crate::error::{Error, Result};
use crate::segment::parse_heading;
use std::path::{Path, PathBuf};

/// One `- title` line per heading, indented four spaces per level below the
/// shallowest heading in the document.
pub fn generate_toc(markdown: &str) -> String {
    let headings: Vec<_> = markdown.lines().filter_map(parse_heading).collect();
    let base = headings.iter().map(|h| h.level).min().unwrap_or(0);
    headings
        .iter()
        .map(|h| format!("{}- {}", "    ".repeat(h.level - base), h.title))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write `<stem>_toc.md` next to every eligible document in `dir`. Returns the files written.
pub fn write_toc_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let (files, _) = eligible_files(dir, extensions)?;
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else { continue };
        let text = std::fs::read_to_string(&file).map_err(|e| Error::io(&file, e))?;
        let out = toc_path(dir, name);
        std::fs::write(&out, generate_toc(&text)).map_err(|e| Error::io(&out, e))?;
        tracing::info!(toc = %out.display(), "table of contents written");
        written.push(out);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_by_level() {
        let md = "# Title page\n## Getting started\ntext\n### Installing things\n## Reference guide";
        assert_eq!(generate_toc(md), "- Getting started\n    - Installing things\n- Reference guide");
    }

    #[test]
    fn no_headings_empty_toc() {
        assert_eq!(generate_toc("plain\ntext"), "");
    }

    #[test]
    fn writes_sibling_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("manual.md"), "## Chapter one\nbody").unwrap();
        let written = write_toc_files(dir.path(), &["md".to_string()]).unwrap();
        assert_eq!(written, vec![dir.path().join("manual_toc.md")]);
        assert_eq!(std::fs::read_to_string(&written[0]).unwrap(), "- Chapter one");
        // a second run must not index the toc artifact itself
        assert_eq!(write_toc_files(dir.path(), &["md".to_string()]).unwrap().len(), 1);
    }
}
