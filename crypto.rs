//! Segment encoding with AES in full-block CFB mode.
//!
//! Every encoded segment is laid out as:
//!
//! ```text
//! [nonce:16][ciphertext:plaintext_len]
//! ```
//!
//! The key length selects AES-128, AES-192 or AES-256. The nonce is drawn
//! from the OS random source on every call, so encoding the same plaintext
//! twice never produces the same bytes.
//!
//! ## No authentication
//!
//! CFB is unauthenticated. [`decode`] succeeds mechanically for any key of a
//! valid length and any input of at least one block: a wrong key or a
//! corrupted segment yields garbage of the right length, **not** an error.
//! A successful decode says nothing about correctness. Compare the result
//! against a stored digest (see [`digest_matches`]) before trusting it.

use crate::error::{PaketError, Result};
use aes::{Aes128, Aes192, Aes256};
use cfb_mode::cipher::{AsyncStreamCipher, InvalidLength, KeyIvInit};
use cfb_mode::{Decryptor, Encryptor};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// AES block size, which is also the nonce length prefixed to every segment
pub const BLOCK_SIZE: usize = 16;

/// Accepted key lengths (AES-128, AES-192, AES-256)
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Smallest length accepted by [`random_key`]
pub const MIN_RANDOM_KEY_LEN: usize = 16;
/// Largest length accepted by [`random_key`]
pub const MAX_RANDOM_KEY_LEN: usize = 32;

/// Length-checked key material, zeroized on drop.
pub struct Key {
    bytes: Vec<u8>,
}

impl Key {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let mut bytes = bytes.into();
        if let Err(e) = check_key_len(bytes.len()) {
            bytes.zeroize();
            return Err(e);
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

pub(crate) fn check_key_len(len: usize) -> Result<()> {
    if VALID_KEY_LENGTHS.contains(&len) {
        Ok(())
    } else {
        Err(PaketError::key(format!(
            "key must be 16, 24 or 32 bytes, got {}",
            len
        )))
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

fn invalid_length(_: InvalidLength) -> PaketError {
    PaketError::key("cipher rejected key or nonce length")
}

/// Runs the CFB keystream over `buf` in place.
fn apply_cfb(key: &[u8], nonce: &[u8], buf: &mut [u8], direction: Direction) -> Result<()> {
    match (key.len(), direction) {
        (16, Direction::Encrypt) => Encryptor::<Aes128>::new_from_slices(key, nonce)
            .map_err(invalid_length)?
            .encrypt(buf),
        (24, Direction::Encrypt) => Encryptor::<Aes192>::new_from_slices(key, nonce)
            .map_err(invalid_length)?
            .encrypt(buf),
        (32, Direction::Encrypt) => Encryptor::<Aes256>::new_from_slices(key, nonce)
            .map_err(invalid_length)?
            .encrypt(buf),
        (16, Direction::Decrypt) => Decryptor::<Aes128>::new_from_slices(key, nonce)
            .map_err(invalid_length)?
            .decrypt(buf),
        (24, Direction::Decrypt) => Decryptor::<Aes192>::new_from_slices(key, nonce)
            .map_err(invalid_length)?
            .decrypt(buf),
        (32, Direction::Decrypt) => Decryptor::<Aes256>::new_from_slices(key, nonce)
            .map_err(invalid_length)?
            .decrypt(buf),
        (len, _) => return check_key_len(len),
    }
    Ok(())
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| PaketError::entropy(e.to_string()))
}

/// Encodes `plaintext` as `nonce || ciphertext` under `key`.
pub fn encode(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_key_len(key.len())?;

    let mut blob = vec![0u8; BLOCK_SIZE + plaintext.len()];
    let (nonce, body) = blob.split_at_mut(BLOCK_SIZE);
    fill_random(nonce)?;
    body.copy_from_slice(plaintext);
    apply_cfb(key, nonce, body, Direction::Encrypt)?;
    Ok(blob)
}

/// Decodes a `nonce || ciphertext` blob under `key`.
///
/// **Success is not evidence of correctness.** No authentication takes
/// place: the wrong key or a corrupted blob decodes to garbage of the same
/// length without error. Verify the output against a digest.
pub fn decode(key: &[u8], blob: &[u8]) -> Result<Vec<u8>> {
    check_key_len(key.len())?;
    if blob.len() < BLOCK_SIZE {
        return Err(PaketError::format(format!(
            "segment of {} bytes is shorter than the {}-byte nonce",
            blob.len(),
            BLOCK_SIZE
        )));
    }

    let (nonce, body) = blob.split_at(BLOCK_SIZE);
    let mut plaintext = body.to_vec();
    apply_cfb(key, nonce, &mut plaintext, Direction::Decrypt)?;
    Ok(plaintext)
}

/// Returns `length` bytes from the OS random source; `length` must be in 16..=32.
pub fn random_key(length: usize) -> Result<Zeroizing<Vec<u8>>> {
    if !(MIN_RANDOM_KEY_LEN..=MAX_RANDOM_KEY_LEN).contains(&length) {
        return Err(PaketError::key(format!(
            "random key length must be between {} and {}, got {}",
            MIN_RANDOM_KEY_LEN, MAX_RANDOM_KEY_LEN, length
        )));
    }
    let mut key = Zeroizing::new(vec![0u8; length]);
    fill_random(&mut key)?;
    Ok(key)
}

/// Lowercase hex SHA-256 of `data`, the digest format stored in descriptors.
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn digest_matches(data: &[u8], expected_hex: &str) -> bool {
    digest_hex(data).eq_ignore_ascii_case(expected_hex.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_key_lengths() {
        let plaintext = b"the quick brown fox jumps over the lazy dog, twice over";
        for len in VALID_KEY_LENGTHS {
            let key = vec![0x42u8; len];
            let blob = encode(&key, plaintext).expect("encode");
            assert_eq!(blob.len(), BLOCK_SIZE + plaintext.len());
            let out = decode(&key, &blob).expect("decode");
            assert_eq!(out, plaintext, "round trip failed for {}-byte key", len);
        }
    }

    #[test]
    fn test_round_trip_empty_and_partial_block() {
        let key = [7u8; 16];
        for size in [0usize, 1, 15, 16, 17, 33] {
            let data: Vec<u8> = (0..size as u8).collect();
            let blob = encode(&key, &data).expect("encode");
            assert_eq!(decode(&key, &blob).expect("decode"), data);
        }
    }

    #[test]
    fn test_same_plaintext_encodes_differently() {
        let key = [1u8; 32];
        let plaintext = [0u8; 64];
        let a = encode(&key, &plaintext).unwrap();
        let b = encode(&key, &plaintext).unwrap();
        assert_ne!(a[..BLOCK_SIZE], b[..BLOCK_SIZE]);
        assert_ne!(a[BLOCK_SIZE..], b[BLOCK_SIZE..]);
    }

    #[test]
    fn test_known_answer_cfb128_aes128() {
        // NIST SP 800-38A, F.3.13 CFB128-AES128, first block
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let ciphertext = hex::decode("3b3fd92eb72dad20333449f8e83cfb4a").unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();

        let mut blob = iv;
        blob.extend_from_slice(&ciphertext);
        assert_eq!(decode(&key, &blob).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_decodes_to_garbage_without_error() {
        let plaintext = b"sixteen byte msg and then some more text";
        let blob = encode(&[0x11u8; 24], plaintext).unwrap();

        let out = decode(&[0x22u8; 24], &blob).expect("decode must not fail on wrong key");
        assert_eq!(out.len(), plaintext.len());
        assert_ne!(out.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn test_invalid_key_lengths_rejected() {
        for len in [0usize, 8, 15, 17, 20, 31, 33, 64] {
            let key = vec![0u8; len];
            assert!(matches!(encode(&key, b"x"), Err(PaketError::Key(_))));
            assert!(matches!(decode(&key, &[0u8; 32]), Err(PaketError::Key(_))));
            assert!(matches!(Key::new(key), Err(PaketError::Key(_))));
        }
    }

    #[test]
    fn test_decode_short_blob() {
        let result = decode(&[0u8; 16], &[0u8; BLOCK_SIZE - 1]);
        assert!(matches!(result, Err(PaketError::Format(_))));
        assert!(decode(&[0u8; 16], &[0u8; BLOCK_SIZE]).unwrap().is_empty());
    }

    #[test]
    fn test_random_key_bounds() {
        for len in MIN_RANDOM_KEY_LEN..=MAX_RANDOM_KEY_LEN {
            assert_eq!(random_key(len).unwrap().len(), len);
        }
        assert!(matches!(random_key(15), Err(PaketError::Key(_))));
        assert!(matches!(random_key(33), Err(PaketError::Key(_))));
        assert_ne!(*random_key(32).unwrap(), *random_key(32).unwrap());
    }

    #[test]
    fn test_digest_hex() {
        assert_eq!(
            digest_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(digest_matches(
            b"abc",
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
        ));
        assert!(!digest_matches(b"abd", &digest_hex(b"abc")));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = Key::new(vec![0xABu8; 16]).unwrap();
        let dbg = format!("{:?}", key);
        assert!(dbg.contains("len"));
        assert!(!dbg.to_lowercase().contains("ab, "));
        assert!(!dbg.contains("171"));
    }
}
