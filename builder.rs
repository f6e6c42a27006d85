//! Container writer.
//!
//! [`PaketBuilder`] appends encoded segments to any [`Write`] sink and
//! records a [`Descriptor`] for each one, producing the blob and its
//! [`Index`] in one pass.

use crate::crypto::{self, Key};
use crate::error::{PaketError, Result};
use crate::index::{Descriptor, Index};
use std::io::{self, Write};
use tracing::debug;

pub struct PaketBuilder<W: Write> {
    key: Key,
    writer: W,
    offset: u64,
    index: Index,
    /// Set after a write error; the sink may hold a partial segment
    failed: bool,
}

fn failed_write() -> PaketError {
    PaketError::Io(io::Error::new(
        io::ErrorKind::Other,
        "builder is unusable after a failed write",
    ))
}

impl<W: Write> PaketBuilder<W> {
    pub fn new(key: &[u8], writer: W) -> Result<Self> {
        Ok(Self {
            key: Key::new(key)?,
            writer,
            offset: 0,
            index: Index::new(),
            failed: false,
        })
    }

    /// Encode `data` and append it as the segment for `name`.
    ///
    /// A write error leaves an unknown number of bytes in the sink, so every
    /// later `add` or `finish` fails.
    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<&Descriptor> {
        if self.failed {
            return Err(failed_write());
        }
        if self.index.contains(name) {
            return Err(PaketError::DuplicateEntry(name.to_string()));
        }

        let segment = crypto::encode(self.key.as_bytes(), data)?;
        let encrypted_length = segment.len() as u64;
        let descriptor = Descriptor {
            start_offset: self.offset,
            end_offset: self.offset + encrypted_length,
            original_length: data.len() as u64,
            encrypted_length,
            hash_original: crypto::digest_hex(data),
            hash_encrypted: crypto::digest_hex(&segment),
        };

        if let Err(e) = self.writer.write_all(&segment) {
            self.failed = true;
            return Err(e.into());
        }
        debug!(entry = name, offset = self.offset, len = encrypted_length, "segment appended");

        self.offset += encrypted_length;
        self.index.insert(name.to_string(), descriptor)?;
        self.index.get(name)
    }

    /// Bytes written so far
    pub fn position(&self) -> u64 {
        self.offset
    }

    pub fn finish(mut self) -> Result<(W, Index)> {
        if self.failed {
            return Err(failed_write());
        }
        self.writer.flush()?;
        let index = std::mem::take(&mut self.index);
        Ok((self.writer, index))
    }
}
