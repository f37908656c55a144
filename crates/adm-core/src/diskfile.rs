//! Temp-file lifecycle for downloads.
//!
//! A transfer writes sequentially into `destination.part`, preallocated when
//! the total size is known, then fsyncs and atomically renames onto the final
//! path. Abort discards the `.part`; failure leaves it for inspection.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Temporary suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path of the temp file for a final destination (`file.iso` → `file.iso.part`).
pub fn part_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Sequential writer for one in-flight download.
pub struct PartFile {
    file: File,
    part: PathBuf,
    dest: PathBuf,
    written: u64,
}

impl PartFile {
    /// Create (or truncate) the `.part` file next to `dest`, creating parent
    /// directories as needed.
    pub fn create(dest: &Path) -> io::Result<Self> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let part = part_path(dest);
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&part)?;
        Ok(Self {
            file,
            part,
            dest: dest.to_path_buf(),
            written: 0,
        })
    }

    /// Preallocate `size` bytes. On Unix tries `posix_fallocate` for real
    /// block allocation; falls back to `set_len` on failure or non-Unix.
    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file.set_len(size)
    }

    /// Append `data` at the current position.
    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Sync file data to disk. Call before `finalize` for durability.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Truncate to the bytes actually written (drops preallocated tail),
    /// then atomically rename onto the destination. Consumes the writer.
    pub fn finalize(self) -> io::Result<PathBuf> {
        self.file.set_len(self.written)?;
        self.file.sync_all()?;
        let PartFile { file, part, dest, .. } = self;
        drop(file);
        fs::rename(&part, &dest)?;
        Ok(dest)
    }

    /// Best-effort removal of the `.part` file (abort path). Consumes the writer.
    pub fn discard(self) {
        let PartFile { file, part, .. } = self;
        drop(file);
        if let Err(e) = fs::remove_file(&part) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %part.display(), "could not remove .part file: {e}");
            }
        }
    }
}

/// Remove `path` if it exists; reports whether a file was removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Size of the file at `path`, or None when absent/unreadable.
pub fn stat_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}
