//! Domain layer
//!
//! Contains the search engine and the rules it composes.

pub mod search;
pub mod specification;
