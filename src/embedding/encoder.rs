//! The text encoder abstraction.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for components that turn text into fixed-dimension vectors.
///
/// Implementations must be deterministic for a fixed model within a
/// session: encoding the same text twice yields the same vector.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Encode text into a vector of [`TextEncoder::dimension`] length.
    ///
    /// Outputs are not required to be unit length; callers normalize.
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Native output dimension of this encoder.
    fn dimension(&self) -> usize;

    /// Encoder name (for logs and health reporting).
    fn name(&self) -> &'static str;
}
