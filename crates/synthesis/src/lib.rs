//! Boundary to the external image-synthesis service.
//!
//! Defines the provider traits consumed by the pipeline, the request
//! payloads, and a REST implementation backed by [`reqwest`].

pub mod api;
pub mod error;
pub mod provider;
pub mod request;

pub use error::SynthesisError;
pub use provider::{ItemEditor, SheetSynthesizer};
pub use request::{SheetItem, SheetRequest};
