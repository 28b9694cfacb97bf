//! Traits for the external image-synthesis collaborators.
//!
//! Both calls return encoded image bytes (PNG, JPEG or WebP). Timeouts and
//! transport retries are the implementor's concern; callers only see
//! success or [`SynthesisError`].

use async_trait::async_trait;

use crate::error::SynthesisError;
use crate::request::SheetRequest;

/// Renders one composite sheet on a chroma-key background, one subject
/// per cell in row-major order, at exactly the requested canvas size.
#[async_trait]
pub trait SheetSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        base_image: &[u8],
        request: &SheetRequest,
    ) -> Result<Vec<u8>, SynthesisError>;
}

/// Regenerates or retouches a single image from a masked input.
#[async_trait]
pub trait ItemEditor: Send + Sync {
    async fn edit(&self, masked_image: &[u8], instruction: &str)
        -> Result<Vec<u8>, SynthesisError>;
}
