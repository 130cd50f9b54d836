//! Data models for mbs.
//!
//! - Card (a Metabase question, kept as a loosely typed JSON document)

pub mod card;

pub use card::{Card, CardId};
