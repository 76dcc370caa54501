//! docqa-vector
//!
//! Approximate nearest-neighbour path backed by lancedb. Vectors are stored
//! L2-normalized and searched by inner product; large slots get an IVF-PQ
//! index, small ones are scanned flat.

pub mod approximate;
pub mod index_build;
pub mod schema;
pub mod table;

pub use approximate::{ApproximateIndex, Slot};
