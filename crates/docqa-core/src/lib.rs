//! docqa-core
//!
//! Domain types, capability traits and shared helpers used by every
//! retrieval path. Concrete engines live in the sibling crates.

pub mod chunking;
pub mod config;
pub mod error;
pub mod math;
pub mod ranking;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
