//! Extraction through an OpenAI-compatible chat completion endpoint.

use super::{EntityExtractor, ExtractionError};
use crate::graph::GraphDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and model settings for [`ChatExtractor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatExtractorConfig {
    /// Base URL; `/chat/completions` is appended
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Retries after the first attempt, for 429, 5xx and network errors
    pub max_retries: u32,
    /// Language requested for node ids, labels and relationship types
    pub output_language: String,
    /// Replaces the built-in instructions when set
    pub system_prompt: Option<String>,
}

impl Default for ChatExtractorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-0125-preview".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            timeout_secs: 120,
            max_retries: 3,
            output_language: "German".to_string(),
            system_prompt: None,
        }
    }
}

fn default_system_prompt(language: &str) -> String {
    format!(
        "You extract information from text into a knowledge graph.\n\
         Nodes are entities and concepts; relationships connect them.\n\
         - Use basic, general node types (e.g. 'Person' rather than 'Mathematician').\n\
         - Node ids are names or human-readable identifiers exactly as found in the text, never integers.\n\
         - Use general, timeless relationship types ('PROFESSOR' rather than 'BECAME_PROFESSOR').\n\
         - Refer to an entity mentioned several ways by its most complete name.\n\
         - Do not add information that is not explicitly in the text.\n\
         - All node ids, node types and relationship types must be in {language}.\n\
         Answer with a single JSON object and nothing else:\n\
         {{\"nodes\": [{{\"id\": string, \"type\": string}}], \
         \"relationships\": [{{\"source\": node id, \"target\": node id, \"type\": string}}]}}"
    )
}

/// Extractor backed by a chat completion API
pub struct ChatExtractor {
    config: ChatExtractorConfig,
    api_key: String,
    system_prompt: String,
    client: reqwest::Client,
}

impl ChatExtractor {
    /// Build a client; fails when the API key variable is not set.
    pub fn new(config: ChatExtractorConfig) -> Result<Self, ExtractionError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ExtractionError::Unavailable(format!("{} is not set", config.api_key_env))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Unavailable(e.to_string()))?;

        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| default_system_prompt(&config.output_language));

        Ok(Self {
            config,
            api_key,
            system_prompt,
            client,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": format!("Extract the knowledge graph from the following input: {}", text) },
            ],
        })
    }
}

#[async_trait]
impl EntityExtractor for ChatExtractor {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn extract(&self, text: &str) -> Result<GraphDocument, ExtractionError> {
        let body = self.request_body(text);
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying extraction request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(self.url())
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;
                        return parse_completion(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = ExtractionError::RequestFailed(format!("{}: {}", status, body_text));

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(ExtractionError::RequestFailed(e.to_string()));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ExtractionError::RequestFailed("extraction failed after retries".into())))
    }
}

/// Pull the message content out of a chat completion and parse it.
fn parse_completion(json: &serde_json::Value) -> Result<GraphDocument, ExtractionError> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            ExtractionError::MalformedResponse("missing choices[0].message.content".into())
        })?;
    parse_document(content)
}

/// Parse model output into a document, tolerating a Markdown code fence.
fn parse_document(content: &str) -> Result<GraphDocument, ExtractionError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    let document: GraphDocument = serde_json::from_str(body.trim())
        .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

    if let Some(node) = document
        .nodes
        .iter()
        .find(|n| n.id.trim().is_empty() || n.label.trim().is_empty())
    {
        return Err(ExtractionError::MalformedResponse(format!(
            "node with empty id or type: {:?}",
            node
        )));
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_content() {
        let doc = parse_document(
            r#"{"nodes": [{"id": "Aspirin", "type": "Medikament"}, {"id": "Fieber", "type": "Symptom"}],
                "relationships": [{"source": "Aspirin", "target": "Fieber", "type": "BEHANDELT"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.relationships[0].rel_type, "BEHANDELT");
    }

    #[test]
    fn parses_fenced_content() {
        let doc = parse_document("```json\n{\"nodes\": [], \"relationships\": []}\n```").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn integer_ids_are_rejected() {
        let err = parse_document(r#"{"nodes": [{"id": 1, "type": "Person"}]}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedResponse(_)));
    }

    #[test]
    fn empty_type_is_rejected() {
        let err = parse_document(r#"{"nodes": [{"id": "Ada", "type": " "}]}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedResponse(_)));
    }

    #[test]
    fn completion_without_content_is_malformed() {
        let err = parse_completion(&serde_json::json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedResponse(_)));
    }

    #[test]
    fn completion_content_is_parsed() {
        let json = serde_json::json!({
            "choices": [{"message": {"content": "{\"nodes\": [{\"id\": \"Herz\", \"type\": \"Organ\"}]}"}}]
        });
        let doc = parse_completion(&json).unwrap();
        assert_eq!(doc.nodes[0].id, "Herz");
    }

    #[test]
    fn default_prompt_names_language() {
        assert!(default_system_prompt("German").contains("must be in German"));
    }

    #[test]
    fn missing_api_key_is_unavailable() {
        let config = ChatExtractorConfig {
            api_key_env: "CORPUS_GRAPH_TEST_KEY_THAT_IS_NOT_SET".into(),
            ..Default::default()
        };
        assert!(matches!(
            ChatExtractor::new(config),
            Err(ExtractionError::Unavailable(_))
        ));
    }
}
