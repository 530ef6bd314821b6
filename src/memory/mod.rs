//! The memory engine: content indexing, retrieval, profiles, and the behavior log.

pub mod behavior;
pub mod content;
pub mod index;
pub mod profile;
pub mod search;
pub mod types;
