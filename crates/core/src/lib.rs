//! Domain core for sticker sheet production.
//!
//! Pure, synchronous building blocks: grid geometry, batch planning,
//! chroma keying, sheet slicing and the per-item status machine. No
//! network or filesystem access lives here.

pub mod batch;
pub mod chroma;
pub mod codec;
pub mod error;
pub mod grid_spec;
pub mod item;
pub mod lifecycle;
pub mod slicer;
pub mod types;
