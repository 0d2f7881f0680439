//! Pure memory-engine logic: data model, judge response parsing, and retrieval ranking.
//!
//! Nothing in this crate performs I/O. The service crate feeds it judge output and store
//! results.

pub mod decision;
pub mod facts;
pub mod language;
pub mod memory;
pub mod ranking;
pub mod response;
pub mod time_serde;

mod error;

pub use error::ParseError;
