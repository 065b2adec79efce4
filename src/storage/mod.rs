//! Storage helpers for skillvault
//!
//! Atomic JSON and byte writes used for settings, reports and rehomed files.

pub mod file_io;

pub use file_io::{write_bytes_atomic, write_json_atomic};
