//! Mock extractor for testing: returns preconfigured documents.

use super::{EntityExtractor, ExtractionError};
use crate::graph::GraphDocument;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct MockExtractor {
    available: bool,
    responses: HashMap<String, GraphDocument>,
    failures: HashMap<String, String>,
    fallback: GraphDocument,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::available()
    }
}

impl MockExtractor {
    /// An extractor that answers every text with an empty document
    /// unless a response is registered for it.
    pub fn available() -> Self {
        Self {
            available: true,
            responses: HashMap::new(),
            failures: HashMap::new(),
            fallback: GraphDocument::new(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// An extractor whose every call fails as unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Register the document returned for an exact text.
    pub fn with_response(mut self, text: impl Into<String>, document: GraphDocument) -> Self {
        self.responses.insert(text.into(), document);
        self
    }

    /// Register a failure for an exact text.
    pub fn with_failure(mut self, text: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(text.into(), message.into());
        self
    }

    /// Document returned for texts without a registered response.
    pub fn with_fallback(mut self, document: GraphDocument) -> Self {
        self.fallback = document;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts received, in call order.
    pub fn seen_texts(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl EntityExtractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn extract(&self, text: &str) -> Result<GraphDocument, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(text.to_string());

        if !self.available {
            return Err(ExtractionError::Unavailable(
                "mock extractor configured as unavailable".to_string(),
            ));
        }
        if let Some(message) = self.failures.get(text) {
            return Err(ExtractionError::RequestFailed(message.clone()));
        }
        Ok(self
            .responses
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
