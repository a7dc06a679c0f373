//! Annotrieve Common Library
//!
//! Shared types, utilities, and error handling for the Annotrieve mirror.
//!
//! # Overview
//!
//! - **Error Handling**: Custom error type and result alias
//! - **Checksums**: Incremental MD5 accumulation for streamed content
//! - **Types**: Annotation records, source databases and catalog keys
//! - **Logging**: Tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use annotrieve_common::checksum::Md5Accumulator;
//!
//! let mut acc = Md5Accumulator::new();
//! acc.update(b"##gff-version 3\n");
//! let bytes = acc.bytes();
//! println!("{} ({} bytes)", acc.hex_digest(), bytes);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{AnnoError, Result};
pub use types::{AnnotationRecord, CatalogKey, SourceDatabase};
