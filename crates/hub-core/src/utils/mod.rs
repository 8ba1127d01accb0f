//! Allocation-light helpers shared across the crate.
//!
//! - [`hex_buffer`]: address formatting through a thread-local buffer.
//! - [`json_hash`]: canonical JSON fingerprints for payload comparison.

pub mod hex_buffer;
pub mod json_hash;

pub use hex_buffer::{format_address, parse_hex_array};
pub use json_hash::{fingerprint, fingerprint_bytes, unordered_fingerprint};
