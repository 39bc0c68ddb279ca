use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Capacity of the user-space append buffer.
pub const WRITE_BUFFER_BYTES: usize = 16 * 1024;

/// Buffered appender over one active segment file.
///
/// Writes land in the buffer and reach the file either on overflow or on an
/// explicit flush, so the on-disk size may lag the logical append position by
/// up to [`WRITE_BUFFER_BYTES`].
#[derive(Debug)]
pub struct SegmentWriter {
    path: PathBuf,
    inner: BufWriter<File>,
}

impl SegmentWriter {
    /// Opens `path` write-only with create-and-append semantics.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o755);
        }
        let file = options.open(&path)?;
        Ok(Self {
            path,
            inner: BufWriter::with_capacity(WRITE_BUFFER_BYTES, file),
        })
    }

    /// Appends `bytes` behind the buffer and returns how many were accepted,
    /// which is all of them or an error. A write that makes no progress
    /// surfaces as [`io::ErrorKind::WriteZero`], never as a short count.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.inner.write_all(bytes)?;
        Ok(bytes.len())
    }

    /// Drains the buffer to the file.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Flushes, then closes the underlying file by consuming the writer.
    pub fn flush_and_close(mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Size of the file on disk, excluding buffered bytes not yet flushed.
    pub fn on_disk_len(&self) -> io::Result<u64> {
        Ok(self.inner.get_ref().metadata()?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
