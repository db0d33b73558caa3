//! Gemini (Google Generative Language API) client.
//! Embeddings via `models/{model}:embedContent`, answers via `models/{model}:generateContent`.

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for the Gemini REST API. Cheap to clone; the inner reqwest client is shared.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    chat_model: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("gemini api key not configured")]
    MissingApiKey,
    #[error("gemini request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gemini api error: {0}")]
    Api(String),
}

impl GeminiClient {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        embedding_model: &str,
        chat_model: &str,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key,
            embedding_model: embedding_model.to_string(),
            chat_model: chat_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Result<&str, GeminiError> {
        self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)
    }

    /// POST models/{embeddingModel}:embedContent — embedding values for one text.
    pub async fn embed_content(&self, text: &str) -> Result<Vec<f32>, GeminiError> {
        let key = self.api_key()?;
        let model = model_path(&self.embedding_model);
        let url = format!("{}/{}:embedContent", self.base_url, model);
        let body = EmbedContentRequest {
            model: model.clone(),
            content: Content::user_text(text),
        };
        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GeminiError::Api(format!("{} {}", status, body)));
        }
        let data: EmbedContentResponse = res.json().await?;
        Ok(data.embedding.map(|e| e.values).unwrap_or_default())
    }

    /// POST models/{chatModel}:generateContent — text of the first candidate (all parts joined).
    pub async fn generate_content(&self, prompt: &str) -> Result<String, GeminiError> {
        let key = self.api_key()?;
        let url = format!(
            "{}/{}:generateContent",
            self.base_url,
            model_path(&self.chat_model)
        );
        let body = GenerateContentRequest {
            contents: vec![Content::user_text(prompt)],
        };
        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GeminiError::Api(format!("{} {}", status, body)));
        }
        let data: GenerateContentResponse = res.json().await?;
        Ok(data.text())
    }
}

/// "text-embedding-004" -> "models/text-embedding-004"; already-prefixed names pass through.
fn model_path(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user_text(text: &str) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    #[serde(default)]
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}
