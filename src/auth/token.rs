//! Issued token records and their secret payloads.

pub mod record;
pub mod secret;
