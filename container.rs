//! Random-access reads from an encrypted container blob.
//!
//! This module provides [`Container`], the read engine over a blob written
//! by [`crate::builder::PaketBuilder`] (or any compatible tool) and its
//! [`Index`].
//!
//! ## Read paths
//!
//! - [`Container::read_serialized`] goes through the one file handle opened
//!   at construction. A mutex is held for the whole seek + read + decode, so
//!   calls on the same container run one at a time. Supports optional
//!   decryption and digest verification.
//! - [`Container::read_parallel`] opens its own handle for the duration of
//!   the call and never touches the shared one, so any number of calls can
//!   run concurrently, alongside serialized reads as well. Always decrypts,
//!   never verifies.
//!
//! ## Lifecycle
//!
//! `open` -> reads -> [`Container::shutdown`]. Once shut down, every read
//! returns [`PaketError::Closed`]. Shutdown should be sequenced after all
//! readers have finished.

use crate::crypto::{self, Key, BLOCK_SIZE};
use crate::error::{PaketError, Result};
use crate::index::{Descriptor, Index};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace};

pub struct Container {
    key: Key,
    path: PathBuf,
    index: Index,
    /// Backing file length observed at open
    blob_len: u64,
    handle: Mutex<Option<File>>,
    closed: AtomicBool,
}

impl Container {
    /// Open the blob at `path` for reading with `key` and `index`.
    ///
    /// Fails with [`PaketError::Key`] for a key that is not 16, 24 or 32
    /// bytes, and with [`PaketError::Precondition`] when the blob does not
    /// exist, is not a regular file, or is empty.
    pub fn open(key: &[u8], path: impl AsRef<Path>, index: Index) -> Result<Self> {
        let key = Key::new(key)?;
        let path = path.as_ref().to_path_buf();

        match fs::metadata(&path) {
            Ok(meta) if !meta.is_file() => {
                return Err(PaketError::precondition(format!(
                    "container is not a regular file: {}",
                    path.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PaketError::precondition(format!(
                    "container not found: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let file = File::open(&path)?;
        let blob_len = file.metadata()?.len();
        if blob_len == 0 {
            return Err(PaketError::precondition(format!(
                "there is no data in the container: {}",
                path.display()
            )));
        }

        debug!(path = %path.display(), blob_len, entries = index.len(), "container opened");
        Ok(Self {
            key,
            path,
            index,
            blob_len,
            handle: Mutex::new(Some(file)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Read `name` through the shared handle.
    ///
    /// Returns the segment bytes (decoded when `decrypt` is set) and the
    /// verified flag. With `verify`, decoded bytes are checked against the
    /// descriptor's `hash_original` and raw bytes against `hash_encrypted`.
    /// The flag is always `false` when `verify` is not set. A digest
    /// mismatch is reported through the flag, never as an error.
    pub fn read_serialized(&self, name: &str, decrypt: bool, verify: bool) -> Result<(Vec<u8>, bool)> {
        // The cursor is re-seeked on every call, so a poisoned guard is still usable.
        let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let file = guard.as_mut().ok_or(PaketError::Closed)?;

        let descriptor = self.index.get(name)?;
        let content = read_segment(file, descriptor)?;

        let (bytes, verified) = if decrypt {
            let plaintext = crypto::decode(self.key.as_bytes(), &content)?;
            let verified = verify && crypto::digest_matches(&plaintext, &descriptor.hash_original);
            (plaintext, verified)
        } else {
            let verified = verify && crypto::digest_matches(&content, &descriptor.hash_encrypted);
            (content, verified)
        };

        trace!(entry = name, decrypt, verify, verified, len = bytes.len(), "serialized read");
        if verify && !verified {
            debug!(entry = name, decrypt, "digest mismatch");
        }
        Ok((bytes, verified))
    }

    /// Read and decode `name` through a handle private to this call.
    ///
    /// No digest verification is performed. The descriptor must describe a
    /// range of at least one nonce that lies inside the blob as it was at
    /// open time; otherwise [`PaketError::Format`] is returned before any
    /// file is opened.
    pub fn read_parallel(&self, name: &str) -> Result<Vec<u8>> {
        if self.is_closed() {
            return Err(PaketError::Closed);
        }

        let descriptor = self.index.get(name)?;
        self.check_bounds(name, descriptor)?;

        let content = {
            let mut file = File::open(&self.path)?;
            read_segment(&mut file, descriptor)?
        };

        trace!(entry = name, len = content.len(), "parallel read");
        crypto::decode(self.key.as_bytes(), &content)
    }

    /// `[original_total, encrypted_total]` over the whole index.
    pub fn aggregate_sizes(&self) -> Result<[u64; 2]> {
        self.index.totals()
    }

    /// Close the shared handle.
    ///
    /// The result of the underlying close is returned as-is. A second call
    /// returns [`PaketError::Closed`].
    pub fn shutdown(&self) -> Result<()> {
        let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let file = guard.take().ok_or(PaketError::Closed)?;
        self.closed.store(true, Ordering::Release);

        close_handle(file)?;
        debug!(path = %self.path.display(), "container closed");
        Ok(())
    }

    fn check_bounds(&self, name: &str, descriptor: &Descriptor) -> Result<()> {
        if descriptor.encrypted_length < BLOCK_SIZE as u64 {
            return Err(PaketError::format(format!(
                "{}: encrypted length {} is shorter than the nonce",
                name, descriptor.encrypted_length
            )));
        }
        match descriptor.segment_end() {
            Some(end) if end <= self.blob_len => Ok(()),
            _ => Err(PaketError::format(format!(
                "{}: segment at {} of {} bytes exceeds container size {}",
                name, descriptor.start_offset, descriptor.encrypted_length, self.blob_len
            ))),
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("entries", &self.index.len())
            .field("blob_len", &self.blob_len)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Seek to the segment and read exactly `encrypted_length` bytes.
fn read_segment(file: &mut File, descriptor: &Descriptor) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(descriptor.start_offset))?;

    // Grow with the data actually present instead of trusting the descriptor for the allocation.
    let mut content = Vec::new();
    file.take(descriptor.encrypted_length).read_to_end(&mut content)?;
    if (content.len() as u64) < descriptor.encrypted_length {
        return Err(PaketError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "short read at offset {}: expected {} bytes, got {}",
                descriptor.start_offset,
                descriptor.encrypted_length,
                content.len()
            ),
        )));
    }
    Ok(content)
}

#[cfg(unix)]
fn close_handle(file: File) -> io::Result<()> {
    use std::os::unix::io::IntoRawFd;

    let fd = file.into_raw_fd();
    // SAFETY: `fd` was just released by `File` and is closed exactly once here.
    if unsafe { libc::close(fd) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn close_handle(file: File) -> io::Result<()> {
    drop(file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_handle_success() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let file = File::open(tmp.path()).unwrap();
        assert!(close_handle(file).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_close_handle_reports_failure() {
        use std::os::unix::io::FromRawFd;

        // Far above any RLIMIT_NOFILE, so the descriptor is never live in this process.
        let bogus_fd = 1 << 28;
        // SAFETY: `close_handle` consumes the `File` and closes `bogus_fd` once; nothing else owns it.
        let file = unsafe { File::from_raw_fd(bogus_fd) };

        let err = close_handle(file).expect_err("closing an invalid descriptor must fail");
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));

        // Shutdown maps that failure onto the Io variant
        let mapped: PaketError = err.into();
        assert!(matches!(mapped, PaketError::Io(_)));
    }
}
