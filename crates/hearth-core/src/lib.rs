//! Core building blocks for hearth
//!
//! This crate contains the pure, I/O-free pieces of the persistence core:
//! - Content hashing (truncated BLAKE3 digests)
//! - Blob path scheme (`{year}/{month}/{digest}.{extension}`)
//! - Injectable clock
//! - MIME type to file extension mapping

pub mod clock;
pub mod error;
pub mod hash;
pub mod mime;
pub mod path;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CoreError, Result};
pub use hash::{ContentHasher, DEFAULT_DIGEST_HEX_LEN};
pub use path::BlobPath;
