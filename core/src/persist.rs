use crate::builder::{BuildReport, CorpusBuilder};
use crate::config::RetrieverConfig;
use crate::error::{Error, Result, SkippedFile};
use crate::CorpusIndex;
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const FORMAT_MAGIC: [u8; 4] = *b"BM25";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub created_at: String,
}

/// How `load_or_build` produced its index.
#[derive(Debug)]
pub enum IndexOrigin {
    Loaded,
    Built { skipped: Vec<SkippedFile> },
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub index: CorpusIndex,
    pub origin: IndexOrigin,
}

/// Owner of the persisted index file.
pub struct IndexStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl IndexStore {
    pub fn new<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> Self {
        Self { path: path.as_ref().to_path_buf(), lock_timeout }
    }

    pub fn from_config(config: &RetrieverConfig) -> Self {
        Self::new(&config.index_path, config.lock_timeout())
    }

    pub fn path(&self) -> &Path { &self.path }
    fn lock_path(&self) -> PathBuf { sibling(&self.path, "lock") }
    fn temp_path(&self) -> PathBuf { sibling(&self.path, "tmp") }

    /// Return the persisted index when present and `refresh` is off, otherwise
    /// rebuild from `source_dir` and overwrite the persisted copy.
    pub fn load_or_build(&self, source_dir: &Path, builder: &CorpusBuilder, refresh: bool) -> Result<LoadOutcome> {
        let _lock = IndexLock::acquire(self.lock_path(), self.lock_timeout)?;
        if self.path.exists() && !refresh {
            let index = self.load_unlocked()?;
            return Ok(LoadOutcome { index, origin: IndexOrigin::Loaded });
        }
        let BuildReport { index, skipped } = builder.build(source_dir)?;
        self.save_unlocked(&index)?;
        Ok(LoadOutcome { index, origin: IndexOrigin::Built { skipped } })
    }

    pub fn load(&self) -> Result<CorpusIndex> {
        let _lock = IndexLock::acquire(self.lock_path(), self.lock_timeout)?;
        self.load_unlocked()
    }

    pub fn save(&self, index: &CorpusIndex) -> Result<()> {
        let _lock = IndexLock::acquire(self.lock_path(), self.lock_timeout)?;
        self.save_unlocked(index)
    }

    fn load_unlocked(&self) -> Result<CorpusIndex> {
        let f = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let len = f.metadata().map_err(|e| Error::io(&self.path, e))?.len();
        let mut reader = BufReader::new(f);
        let header: IndexHeader = codec()
            .with_limit(len)
            .deserialize_from(&mut reader)
            .map_err(|e| Error::corrupt(&self.path, format!("bad header: {e}")))?;
        if header.magic != FORMAT_MAGIC {
            return Err(Error::corrupt(&self.path, "not an index file"));
        }
        if header.version != FORMAT_VERSION {
            return Err(Error::corrupt(&self.path, format!("unsupported format version {}", header.version)));
        }
        let index: CorpusIndex = codec()
            .with_limit(len)
            .deserialize_from(&mut reader)
            .map_err(|e| Error::corrupt(&self.path, format!("bad body: {e}")))?;
        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing).map_err(|e| Error::io(&self.path, e))? != 0 {
            return Err(Error::corrupt(&self.path, "trailing bytes after index"));
        }
        index.verify().map_err(|reason| Error::corrupt(&self.path, reason))?;
        tracing::info!(
            path = %self.path.display(),
            created_at = %header.created_at,
            num_chunks = index.document_count(),
            "loaded index"
        );
        Ok(index)
    }

    fn save_unlocked(&self, index: &CorpusIndex) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let header = IndexHeader {
            magic: FORMAT_MAGIC,
            version: FORMAT_VERSION,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
        };
        let tmp = self.temp_path();
        let write = || -> std::io::Result<()> {
            let mut w = BufWriter::new(File::create(&tmp)?);
            codec().serialize_into(&mut w, &header).map_err(std::io::Error::other)?;
            codec().serialize_into(&mut w, index).map_err(std::io::Error::other)?;
            w.flush()?;
            w.get_ref().sync_all()?;
            Ok(())
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io(&tmp, e));
        }
        fs::rename(&tmp, &self.path).map_err(|e| Error::io(&self.path, e))?;
        tracing::info!(path = %self.path.display(), num_chunks = index.document_count(), "stored index");
        Ok(())
    }
}

/// `load_or_build` driven entirely by configuration.
pub fn load_or_build(config: &RetrieverConfig, refresh: bool) -> Result<LoadOutcome> {
    let builder = CorpusBuilder::new(config)?;
    IndexStore::from_config(config).load_or_build(&config.source_dir, &builder, refresh)
}

/// Fixed-width little-endian encoding; reads are capped at the file size.
fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding().allow_trailing_bytes()
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Exclusive sidecar lock file, removed on drop.
struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    fn acquire(path: PathBuf, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    let _ = writeln!(f, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(Error::IndexLocked { path });
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(e) => return Err(Error::io(&path, e)),
            }
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
