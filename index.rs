//! Lookup table mapping logical names to segment descriptors.
//!
//! The index is produced alongside the container blob (see
//! [`crate::builder`]) and handed to [`crate::container::Container`] as an
//! in-memory value. Segment boundaries are not recorded in the blob itself,
//! so the blob cannot be read without its index.

use crate::error::{PaketError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Placement and integrity data for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Offset of the segment's nonce in the blob
    pub start_offset: u64,
    /// Informational end marker; reads use `start_offset + encrypted_length`
    pub end_offset: u64,
    pub original_length: u64,
    /// Stored segment length (nonce + ciphertext)
    pub encrypted_length: u64,
    /// Hex SHA-256 of the plaintext
    pub hash_original: String,
    /// Hex SHA-256 of the stored segment
    pub hash_encrypted: String,
}

impl Descriptor {
    /// Exclusive end of the segment, or `None` on overflow.
    pub fn segment_end(&self) -> Option<u64> {
        self.start_offset.checked_add(self.encrypted_length)
    }
}

/// Immutable name -> [`Descriptor`] mapping, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index {
    entries: BTreeMap<String, Descriptor>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Result<&Descriptor> {
        self.entries
            .get(name)
            .ok_or_else(|| PaketError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Descriptor)> {
        self.entries.iter().map(|(name, d)| (name.as_str(), d))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Sums of `original_length` and `encrypted_length` over all entries.
    ///
    /// An empty index is an error; the totals it would report are zero.
    pub fn totals(&self) -> Result<[u64; 2]> {
        if self.entries.is_empty() {
            return Err(PaketError::EmptyIndex);
        }
        Ok(self.entries.values().fold([0u64, 0u64], |[orig, enc], d| {
            [
                orig.saturating_add(d.original_length),
                enc.saturating_add(d.encrypted_length),
            ]
        }))
    }

    pub(crate) fn insert(&mut self, name: String, descriptor: Descriptor) -> Result<()> {
        if self.entries.contains_key(&name) {
            return Err(PaketError::DuplicateEntry(name));
        }
        self.entries.insert(name, descriptor);
        Ok(())
    }

    /// Load an index from a JSON object of `name -> descriptor`
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&s)?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

impl FromIterator<(String, Descriptor)> for Index {
    fn from_iter<I: IntoIterator<Item = (String, Descriptor)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(start: u64, original: u64) -> Descriptor {
        Descriptor {
            start_offset: start,
            end_offset: start + original + 16,
            original_length: original,
            encrypted_length: original + 16,
            hash_original: String::new(),
            hash_encrypted: String::new(),
        }
    }

    #[test]
    fn test_lookup() {
        let index: Index = [("a.txt".to_string(), descriptor(0, 10))]
            .into_iter()
            .collect();

        assert_eq!(index.get("a.txt").unwrap().original_length, 10);
        assert!(matches!(index.get("b.txt"), Err(PaketError::NotFound(n)) if n == "b.txt"));
    }

    #[test]
    fn test_totals_empty() {
        assert!(matches!(Index::new().totals(), Err(PaketError::EmptyIndex)));
    }

    #[test]
    fn test_totals_sum() {
        let index: Index = vec![
            ("c".to_string(), descriptor(58, 100)),
            ("a".to_string(), descriptor(0, 10)),
            ("b".to_string(), descriptor(26, 16)),
        ]
        .into_iter()
        .collect();

        assert_eq!(index.totals().unwrap(), [126, 174]);
        let names: Vec<_> = index.names().collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut index = Index::new();
        index.insert("a".into(), descriptor(0, 1)).unwrap();
        assert!(matches!(
            index.insert("a".into(), descriptor(17, 1)),
            Err(PaketError::DuplicateEntry(_))
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_json_persistence() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        let index: Index = [("x.bin".to_string(), descriptor(0, 3))]
            .into_iter()
            .collect();

        index.save_json(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"x.bin\""));
        assert!(content.contains("encrypted_length"));
        assert_eq!(Index::load_json(&path).unwrap(), index);
    }

    #[test]
    fn test_load_json_malformed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Index::load_json(&path), Err(PaketError::Format(_))));
    }

    #[test]
    fn test_segment_end_overflow() {
        let mut d = descriptor(0, 4);
        assert_eq!(d.segment_end(), Some(20));
        d.start_offset = u64::MAX;
        assert_eq!(d.segment_end(), None);
    }
}
