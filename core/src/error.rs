use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("corrupt index at {}: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("index at {} is locked by another writer", path.display())]
    IndexLocked { path: PathBuf },
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound { path }
        } else {
            Error::Io { path, source }
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Error::CorruptIndex { path: path.into(), reason: reason.to_string() }
    }
}

/// A source file the builder could not use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Non-fatal outcome of a build that had to leave files out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialBuildWarning {
    pub skipped: Vec<SkippedFile>,
}

impl fmt::Display for PartialBuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index built without {} file(s):", self.skipped.len())?;
        for s in &self.skipped {
            write!(f, " {} ({});", s.path.display(), s.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for PartialBuildWarning {}
