//! Streaming tar+gzip archive writer.
//!
//! Every dump is a single `.tar.gz` written in one pass. Entries are
//! appended as they are collected; nothing is buffered beyond what the
//! content producer itself holds. The writer owns its destination until
//! [`ArchiveWriter::close`] hands it back.

use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header};
use tracing::warn;

/// Default mode for generated entries (command output, pod manifests).
pub const GENERATED_MODE: u32 = 0o644;

/// Mode recorded on symlink entries.
pub const SYMLINK_MODE: u32 = 0o777;

/// Errors produced by the archive layer.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive is already closed")]
    Closed,

    #[error("invalid archive entry name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("archive io error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for archive operations.
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Header metadata for a content entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    /// Exact number of body bytes the entry will carry.
    pub size: u64,
    /// Unix permission bits.
    pub mode: u32,
    /// Modification time, seconds since the epoch.
    pub mtime: u64,
}

impl EntryMeta {
    /// Metadata for content generated at collection time.
    pub fn generated(size: u64, mtime: u64) -> Self {
        Self {
            size,
            mode: GENERATED_MODE,
            mtime,
        }
    }
}

/// Normalise an entry name into archive-relative form.
///
/// Leading `/` and `.` components are dropped and `..` is resolved
/// lexically. Names that are empty after normalisation or that climb above
/// the archive root are rejected.
pub fn normalize_name(name: &str) -> ArchiveResult<PathBuf> {
    let invalid = |reason: &str| ArchiveError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut normalized = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(invalid("path escapes the archive root"));
                }
            }
            Component::Prefix(_) => return Err(invalid("path has a prefix")),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(invalid("name is empty"));
    }
    Ok(normalized)
}

/// Reader that yields exactly `len` bytes from `inner`.
///
/// Extra bytes are left unread; a short source is zero-filled. Either way
/// the body matches the size already written into the tar header.
struct SizedReader<R> {
    inner: R,
    remaining: u64,
    padded: u64,
}

impl<R: Read> SizedReader<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
            padded: 0,
        }
    }
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = match self.inner.read(&mut buf[..want])? {
            0 => {
                buf[..want].fill(0);
                self.padded += want as u64;
                want
            }
            n => n,
        };
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Tar+gzip writer bound to a single destination.
///
/// Lifecycle: created, zero or more entries appended, closed once. Any
/// operation after [`close`](Self::close) returns [`ArchiveError::Closed`].
pub struct ArchiveWriter<W: Write> {
    builder: Option<Builder<GzEncoder<W>>>,
    entries: usize,
}

impl<W: Write> ArchiveWriter<W> {
    /// Bind a new archive to `dest`.
    pub fn new(dest: W) -> Self {
        let encoder = GzEncoder::new(dest, Compression::default());
        Self {
            builder: Some(Builder::new(encoder)),
            entries: 0,
        }
    }

    fn builder(&mut self) -> ArchiveResult<&mut Builder<GzEncoder<W>>> {
        self.builder.as_mut().ok_or(ArchiveError::Closed)
    }

    /// Append a regular file entry, draining `content` for exactly
    /// `meta.size` bytes. Returns the number of body bytes written.
    pub fn append_file<R: Read>(
        &mut self,
        name: &str,
        meta: &EntryMeta,
        content: R,
    ) -> ArchiveResult<u64> {
        let path = normalize_name(name)?;
        let builder = self.builder()?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(meta.size);
        header.set_mode(meta.mode);
        header.set_mtime(meta.mtime);

        let mut body = SizedReader::new(content, meta.size);
        builder.append_data(&mut header, &path, &mut body)?;

        if body.padded > 0 {
            warn!(
                entry = %path.display(),
                missing_bytes = body.padded,
                "Content ended early; entry zero-filled to its recorded size"
            );
        }

        self.entries += 1;
        Ok(meta.size)
    }

    /// Append a symbolic-link entry with no body.
    pub fn append_symlink(&mut self, name: &str, target: &str, mtime: u64) -> ArchiveResult<()> {
        let path = normalize_name(name)?;
        if target.is_empty() {
            return Err(ArchiveError::InvalidName {
                name: name.to_string(),
                reason: "symlink target is empty".to_string(),
            });
        }
        let builder = self.builder()?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(SYMLINK_MODE);
        header.set_mtime(mtime);
        builder.append_link(&mut header, &path, target)?;

        self.entries += 1;
        Ok(())
    }

    /// Finish the tar stream and the gzip stream, flush, and hand the
    /// destination back to the caller. Only the first call succeeds.
    pub fn close(&mut self) -> ArchiveResult<W> {
        let builder = self.builder.take().ok_or(ArchiveError::Closed)?;
        let encoder = builder.into_inner()?;
        let mut dest = encoder.finish()?;
        dest.flush()?;
        Ok(dest)
    }

    /// Whether [`close`](Self::close) has already run.
    pub fn is_closed(&self) -> bool {
        self.builder.is_none()
    }

    /// Number of entries appended so far.
    pub fn entries(&self) -> usize {
        self.entries
    }
}
