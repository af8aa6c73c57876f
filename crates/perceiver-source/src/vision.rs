//! Vision service port.

use async_trait::async_trait;

use crate::error::CaptureError;

/// Turns a screenshot into a textual description of the visible screen.
///
/// Implemented over an OpenAI-compatible chat API in the CLI; callers
/// treat failures as "no description available" rather than aborting.
#[async_trait]
pub trait VisionDescriber: Send + Sync {
    async fn describe(&self, jpeg: &[u8], goal: &str) -> Result<String, CaptureError>;
}
