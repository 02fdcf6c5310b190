//! Entity extraction service boundary
//!
//! Given one unit of text, an extractor returns the entities and
//! relationships it found as a [`GraphDocument`]. Two implementations:
//! - `ChatExtractor`: OpenAI-compatible chat completion endpoint (production)
//! - `MockExtractor`: returns preconfigured documents (testing)

mod chat;
mod mock;

pub use chat::{ChatExtractor, ChatExtractorConfig};
pub use mock::MockExtractor;

use crate::graph::GraphDocument;
use async_trait::async_trait;

/// Errors from extraction service calls.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction service not available: {0}")]
    Unavailable(String),
    #[error("extraction request failed: {0}")]
    RequestFailed(String),
    #[error("malformed extraction response: {0}")]
    MalformedResponse(String),
}

/// Client trait for the extraction service.
///
/// Abstracts over transport so the merge engine doesn't depend on how
/// the service is reached.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Extract graph elements from one text unit.
    async fn extract(&self, text: &str) -> Result<GraphDocument, ExtractionError>;
}
