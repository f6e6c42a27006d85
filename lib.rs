//! # Paket - Random-Access Encrypted Containers
//!
//! Paket concatenates many logical files into one blob, encrypting each
//! segment separately with AES-CFB, and reads any of them back by name
//! through an external index of offsets, lengths and SHA-256 digests.
//!
//! ## Features
//!
//! - **AES-128/192/256-CFB**: key length selects the strength, fresh random nonce per segment
//! - **Serialized reads**: one shared handle, optional digest verification
//! - **Parallel reads**: per-call handles, no shared locking
//! - **Builder**: write a blob and its index in one pass
//!
//! ## Quick Start
//!
//! ```no_run
//! use paket::{builder::PaketBuilder, container::Container};
//! use std::fs::File;
//!
//! fn main() -> paket::Result<()> {
//!     let key = [0x42u8; 32];
//!     let mut builder = PaketBuilder::new(&key, File::create("assets.pkt")?)?;
//!     builder.add("a.txt", b"hello")?;
//!     let (_file, index) = builder.finish()?;
//!
//!     let container = Container::open(&key, "assets.pkt", index)?;
//!     let (data, verified) = container.read_serialized("a.txt", true, true)?;
//!     assert!(verified);
//!     assert_eq!(data, b"hello");
//!     container.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Integrity
//!
//! Decoding never fails on a wrong key or corrupted data; it yields garbage.
//! Only the `verified` flag returned by
//! [`Container::read_serialized`](container::Container::read_serialized)
//! tells you the bytes are the ones that were packed.

pub mod builder;
pub mod config;
pub mod container;
pub mod crypto;
pub mod error;
pub mod index;
pub mod key_manager;

// Re-export common types for convenience
pub use error::{PaketError, Result};
