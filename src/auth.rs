//! Token domain models: issued records and the redacting secret wrapper.

pub mod token;

pub use token::{record::*, secret::*};
