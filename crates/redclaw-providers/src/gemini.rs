//! Google Gemini provider — native `generateContent` / `embedContent` REST.
//!
//! Auth is a `?key=API_KEY` query parameter, not a header. Generation uses
//! `contents` with text parts and a `generationConfig`; embeddings come
//! back as `embedding.values`.

use async_trait::async_trait;
use serde_json::{Value, json};

use redclaw_core::config::GeminiConfig;
use redclaw_core::error::{RedClawError, Result};
use redclaw_core::traits::Provider;
use redclaw_core::types::GenerateParams;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    api_key: String,
    model: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!(
            "{BASE_URL}/models/{model}:{method}?key={}",
            self.api_key
        )
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| RedClawError::Http(format!("Gemini connection failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RedClawError::Provider(format!(
                "Gemini API error {status}: {text}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| RedClawError::Http(e.to_string()))
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty() && !self.api_key.starts_with("your_")
    }

    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<String> {
        if !self.is_available() {
            return Err(RedClawError::ApiKeyMissing("gemini".into()));
        }

        let body = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": params.temperature,
                "maxOutputTokens": params.max_output_tokens,
                "topP": params.top_p,
            },
        });

        let url = self.url(&self.model, "generateContent");
        let reply = self.post(&url, &body).await?;

        // Concatenate all text parts of the first candidate.
        let parts = reply["candidates"]
            .get(0)
            .and_then(|c| c["content"]["parts"].as_array())
            .ok_or_else(|| RedClawError::Provider("No candidates in Gemini response".into()))?;

        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(RedClawError::Provider("Empty Gemini response".into()));
        }
        Ok(text)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.is_available() {
            return Err(RedClawError::ApiKeyMissing("gemini".into()));
        }

        let requests: Vec<Value> = texts
            .iter()
            .map(|t| {
                json!({
                    "model": format!("models/{}", self.embedding_model),
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();

        let url = self.url(&self.embedding_model, "batchEmbedContents");
        let reply = self.post(&url, &json!({ "requests": requests })).await?;

        let embeddings = reply["embeddings"]
            .as_array()
            .ok_or_else(|| RedClawError::Provider("No embeddings in Gemini response".into()))?;

        let vectors: Vec<Vec<f32>> = embeddings
            .iter()
            .map(|e| {
                e["values"]
                    .as_array()
                    .map(|vals| {
                        vals.iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();

        if vectors.len() != texts.len() {
            return Err(RedClawError::Provider(format!(
                "Embedding count mismatch: sent {}, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_with_key(key: &str) -> GeminiProvider {
        GeminiProvider {
            api_key: key.into(),
            model: "gemini-2.5-flash".into(),
            embedding_model: "text-embedding-004".into(),
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn test_availability() {
        assert!(!provider_with_key("").is_available());
        assert!(!provider_with_key("your_api_key_here").is_available());
        assert!(provider_with_key("AIza-real-key").is_available());
    }

    #[test]
    fn test_url_building() {
        let p = provider_with_key("k");
        let url = p.url("gemini-2.5-flash", "generateContent");
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=k"
        );
    }

    #[tokio::test]
    async fn test_generate_without_key_errors() {
        let p = provider_with_key("");
        let err = p
            .generate("hi", &GenerateParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RedClawError::ApiKeyMissing(_)));
    }
}
