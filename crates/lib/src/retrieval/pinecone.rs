//! Pinecone client: data-plane `POST /query` and control-plane index lookup.

use crate::retrieval::RetrievalMatch;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const API_VERSION: &str = "2024-07";

/// Handle to one Pinecone index. The data-plane host is fixed at construction.
#[derive(Clone)]
pub struct PineconeIndex {
    host: Option<String>,
    api_key: Option<String>,
    namespace: Option<String>,
    text_field: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum PineconeError {
    #[error("pinecone api key not configured")]
    MissingApiKey,
    #[error("pinecone index host not resolved")]
    MissingHost,
    #[error("pinecone request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("pinecone api error: {0}")]
    Api(String),
}

impl PineconeIndex {
    pub fn new(
        host: Option<String>,
        api_key: Option<String>,
        namespace: Option<String>,
        text_field: &str,
    ) -> Self {
        Self {
            host: host.map(|h| normalize_host(&h)).filter(|h| !h.is_empty()),
            api_key,
            namespace: namespace.filter(|n| !n.is_empty()),
            text_field: text_field.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// GET {control_plane_url}/indexes/{name} — the index's data-plane host.
    pub async fn describe_host(
        control_plane_url: &str,
        index_name: &str,
        api_key: &str,
    ) -> Result<String, PineconeError> {
        let url = format!(
            "{}/indexes/{}",
            control_plane_url.trim_end_matches('/'),
            index_name
        );
        let res = reqwest::Client::new()
            .get(&url)
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(PineconeError::Api(format!("{} {}", status, body)));
        }
        let data: DescribeIndexResponse = res.json().await?;
        data.host
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PineconeError::Api(format!("index {} has no host", index_name)))
    }

    /// POST https://{host}/query with includeMetadata. Matches without the text field are dropped.
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: u32,
    ) -> Result<Vec<RetrievalMatch>, PineconeError> {
        let key = self.api_key.as_deref().ok_or(PineconeError::MissingApiKey)?;
        let host = self.host.as_deref().ok_or(PineconeError::MissingHost)?;
        let url = format!("{}/query", host);
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let res = self
            .client
            .post(&url)
            .header("Api-Key", key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(PineconeError::Api(format!("{} {}", status, body)));
        }
        let data: QueryResponse = res.json().await?;
        Ok(data.into_matches(&self.text_field))
    }
}

/// "idx.svc.pinecone.io" -> "https://idx.svc.pinecone.io"; explicit schemes are kept.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() || host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: u32,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    #[serde(default)]
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<HashMap<String, serde_json::Value>>,
}

impl QueryResponse {
    fn into_matches(self, text_field: &str) -> Vec<RetrievalMatch> {
        self.matches
            .into_iter()
            .filter_map(|m| {
                let text = m
                    .metadata
                    .as_ref()
                    .and_then(|md| md.get(text_field))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                match text {
                    Some(text) => Some(RetrievalMatch {
                        id: m.id,
                        score: m.score,
                        text,
                    }),
                    None => {
                        log::debug!("pinecone: match {} has no {} metadata, skipped", m.id, text_field);
                        None
                    }
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct DescribeIndexResponse {
    #[serde(default)]
    host: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_gets_https_scheme() {
        assert_eq!(normalize_host("idx-1.svc.pinecone.io"), "https://idx-1.svc.pinecone.io");
        assert_eq!(normalize_host("http://127.0.0.1:5080/"), "http://127.0.0.1:5080");
        assert_eq!(normalize_host("  "), "");
    }

    #[test]
    fn query_request_is_camel_case() {
        let vector = [0.5f32, 0.25];
        let body = serde_json::to_value(QueryRequest {
            vector: &vector,
            top_k: 3,
            include_metadata: true,
            namespace: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "vector": [0.5, 0.25], "topK": 3, "includeMetadata": true })
        );
    }

    #[test]
    fn matches_keep_order_and_drop_textless() {
        let data: QueryResponse = serde_json::from_str(
            r#"{"matches":[
                {"id":"a","score":0.82,"metadata":{"text_chunk":"Áo sơ mi giá 250.000đ"}},
                {"id":"b","score":0.71,"metadata":{"title":"no text"}},
                {"id":"c","score":0.55,"metadata":{"text_chunk":"Quần jean"}},
                {"id":"d","score":0.50}
            ],"namespace":""}"#,
        )
        .unwrap();
        let matches = data.into_matches("text_chunk");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[0].text, "Áo sơ mi giá 250.000đ");
        assert_eq!(matches[1].id, "c");
    }

    #[tokio::test]
    async fn unresolved_index_fails_query() {
        let index = PineconeIndex::new(None, Some("key".to_string()), None, "text_chunk");
        assert!(matches!(
            index.query(&[0.1], 3).await,
            Err(PineconeError::MissingHost)
        ));
        let index = PineconeIndex::new(Some("idx.example".to_string()), None, None, "text_chunk");
        assert!(matches!(
            index.query(&[0.1], 3).await,
            Err(PineconeError::MissingApiKey)
        ));
    }
}
