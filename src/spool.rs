//! Disk-backed output targets that are never observed half-written.
//!
//! - [`Spool`] is an anonymous temporary file. The handler writes each output
//!   stream into one and only uploads it after a successful run; an aborted
//!   run drops the spool and the OS reclaims it.
//! - [`AtomicFile`] writes next to its destination and renames into place on
//!   [`AtomicFile::persist`]. Dropping it without persisting removes the
//!   temporary file, so a failed run leaves no output at the final path.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Anonymous temporary file used as an output stream.
#[derive(Debug)]
pub struct Spool {
    file: File,
    written: u64,
}

impl Spool {
    /// Create a spool in the system temporary directory.
    ///
    /// # Errors
    /// Fails if the temporary file cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
            written: 0,
        })
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.written
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Rewind and hand back the file for reading, together with its length.
    ///
    /// # Errors
    /// Fails if the flush or seek fails.
    pub fn into_reader(mut self) -> io::Result<(File, u64)> {
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok((self.file, self.written))
    }
}

impl Write for Spool {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// A file that appears at its final path only once [`persist`](Self::persist) succeeds.
#[derive(Debug)]
pub struct AtomicFile {
    temp: NamedTempFile,
    final_path: PathBuf,
}

impl AtomicFile {
    /// Start writing a file destined for `final_path`.
    ///
    /// The temporary file lives in the same directory so the final rename
    /// stays on one filesystem.
    ///
    /// # Errors
    /// Fails if the parent directory is missing or not writable.
    pub fn new(final_path: impl AsRef<Path>) -> io::Result<Self> {
        let final_path = final_path.as_ref().to_path_buf();
        let parent = match final_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp = NamedTempFile::new_in(&parent)?;
        Ok(Self { temp, final_path })
    }

    /// Flush and rename into place.
    ///
    /// # Errors
    /// Fails if the flush or rename fails; the temporary file is removed.
    pub fn persist(mut self) -> io::Result<PathBuf> {
        self.temp.flush()?;
        self.temp
            .persist(&self.final_path)
            .map_err(|e| e.error)?;
        Ok(self.final_path)
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}
