//! Shared utility modules used across Camellia components.

pub mod bytes;
pub mod packed;
pub mod varint;
