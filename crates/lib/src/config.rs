//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.hapi/config.json`) and environment.
//! Secrets may be given in the file or via env; env always wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (Zalo Official Account).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Embedding and generation backend.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Similarity index and relevance filtering.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Reply composition (persona, fallback text, failure policy).
    #[serde(default)]
    pub responder: ResponderConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub zalo: ZaloChannelConfig,
}

/// Zalo Official Account channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZaloChannelConfig {
    /// OA access token for the send API. Overridden by ZALO_ACCESS_TOKEN env when set.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Open API base URL (default "https://openapi.zalo.me").
    #[serde(default = "default_zalo_api_base")]
    pub api_base: String,
    /// Route the webhook is served on (default "/zalo/webhook").
    #[serde(default = "default_zalo_webhook_path")]
    pub webhook_path: String,
    /// App id used in the webhook signature. Verification runs only when both this and the secret are set.
    #[serde(default)]
    pub app_id: Option<String>,
    /// OA secret key used in the webhook signature. Overridden by ZALO_OA_SECRET_KEY env when set.
    #[serde(default)]
    pub oa_secret_key: Option<String>,
}

fn default_zalo_api_base() -> String {
    "https://openapi.zalo.me".to_string()
}

fn default_zalo_webhook_path() -> String {
    "/zalo/webhook".to_string()
}

impl Default for ZaloChannelConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            api_base: default_zalo_api_base(),
            webhook_path: default_zalo_webhook_path(),
            app_id: None,
            oa_secret_key: None,
        }
    }
}

/// Which service produces embeddings and generated answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Google Generative Language API (embedContent / generateContent).
    #[default]
    Gemini,
    /// Local Ollama instance (/api/embed, /api/chat).
    Ollama,
}

impl LlmBackend {
    pub fn name(self) -> &'static str {
        match self {
            LlmBackend::Gemini => "gemini",
            LlmBackend::Ollama => "ollama",
        }
    }
}

/// Embedding and generation backend config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default)]
    pub backend: LlmBackend,
    /// Gemini API key. Overridden by GEMINI_API_KEY env when set. Unused for Ollama.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Backend base URL. When absent the backend's default is used.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model used for embeddings (default "text-embedding-004").
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Model used for answers (default "gemini-2.5-flash").
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}

fn default_chat_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            api_key: None,
            base_url: None,
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
        }
    }
}

/// Pinecone index and relevance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Pinecone API key. Overridden by PINECONE_API_KEY env when set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Index name, used to look up the data-plane host when `index_host` is not set.
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Data-plane host of the index (e.g. "wehappicms-abc123.svc.aped-1234.pinecone.io").
    #[serde(default)]
    pub index_host: Option<String>,
    /// Optional namespace inside the index.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Control-plane URL for index lookup (default "https://api.pinecone.io").
    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,
    /// Number of nearest neighbours to request (default 3).
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Matches must score strictly above this to be used as context (default 0.60).
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Metadata field holding the chunk text (default "text_chunk").
    #[serde(default = "default_metadata_text_field")]
    pub metadata_text_field: String,
}

fn default_index_name() -> String {
    "wehappicms".to_string()
}

fn default_control_plane_url() -> String {
    "https://api.pinecone.io".to_string()
}

fn default_top_k() -> u32 {
    3
}

fn default_threshold() -> f32 {
    0.60
}

fn default_metadata_text_field() -> String {
    "text_chunk".to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            index_name: default_index_name(),
            index_host: None,
            namespace: None,
            control_plane_url: default_control_plane_url(),
            top_k: default_top_k(),
            threshold: default_threshold(),
            metadata_text_field: default_metadata_text_field(),
        }
    }
}

/// What to do when the generative model fails after relevant context was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationFailurePolicy {
    /// Send nothing; the customer gets no reply.
    #[default]
    Silent,
    /// Send the fallback message instead.
    Fallback,
}

/// Reply composition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderConfig {
    /// Sent verbatim when no match passes the relevance threshold.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Persona instruction placed before the context in the prompt.
    #[serde(default = "default_persona")]
    pub persona: String,
    /// Style instruction placed after the question in the prompt.
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub on_generation_failure: GenerationFailurePolicy,
}

fn default_fallback_message() -> String {
    "Dạ em chưa tìm thấy thông tin này. Anh/chị chờ chút để nhân viên hỗ trợ nhé!".to_string()
}

fn default_persona() -> String {
    "Bạn là trợ lý ảo WeHappi Shop. Dựa vào thông tin sau để trả lời:".to_string()
}

fn default_style() -> String {
    "Trả lời ngắn gọn, thân thiện.".to_string()
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            fallback_message: default_fallback_message(),
            persona: default_persona(),
            style: default_style(),
            on_generation_failure: GenerationFailurePolicy::default(),
        }
    }
}

/// Env value if set and non-empty, otherwise the trimmed, non-empty config value.
fn env_or_config(var: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            configured
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the Zalo OA access token: env ZALO_ACCESS_TOKEN overrides config.
pub fn resolve_zalo_access_token(config: &Config) -> Option<String> {
    env_or_config("ZALO_ACCESS_TOKEN", config.channels.zalo.access_token.as_ref())
}

/// Resolve the OA secret key used for webhook signatures: env ZALO_OA_SECRET_KEY overrides config.
pub fn resolve_zalo_secret_key(config: &Config) -> Option<String> {
    env_or_config("ZALO_OA_SECRET_KEY", config.channels.zalo.oa_secret_key.as_ref())
}

/// Resolve the Gemini API key: env GEMINI_API_KEY overrides config.
pub fn resolve_gemini_api_key(config: &Config) -> Option<String> {
    env_or_config("GEMINI_API_KEY", config.llm.api_key.as_ref())
}

/// Resolve the Pinecone API key: env PINECONE_API_KEY overrides config.
pub fn resolve_pinecone_api_key(config: &Config) -> Option<String> {
    env_or_config("PINECONE_API_KEY", config.retrieval.api_key.as_ref())
}

/// Webhook signing material (app id, secret) when both are configured.
pub fn resolve_webhook_signing(config: &Config) -> Option<(String, String)> {
    let app_id = config
        .channels
        .zalo
        .app_id
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;
    let secret = resolve_zalo_secret_key(config)?;
    Some((app_id, secret))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Reject values the pipeline cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.topK must be at least 1");
    }
    let t = config.retrieval.threshold;
    if !(0.0..=1.0).contains(&t) {
        anyhow::bail!("retrieval.threshold must be within [0, 1], got {}", t);
    }
    if config.responder.fallback_message.trim().is_empty() {
        anyhow::bail!("responder.fallbackMessage must not be empty");
    }
    if !config.channels.zalo.webhook_path.starts_with('/') {
        anyhow::bail!(
            "channels.zalo.webhookPath must start with '/', got {:?}",
            config.channels.zalo.webhook_path
        );
    }
    Ok(())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("HAPI_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".hapi").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or HAPI_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 15152);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn empty_json_yields_pipeline_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.threshold - 0.60).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.index_name, "wehappicms");
        assert_eq!(config.retrieval.metadata_text_field, "text_chunk");
        assert_eq!(config.llm.backend, LlmBackend::Gemini);
        assert_eq!(config.channels.zalo.webhook_path, "/zalo/webhook");
        assert_eq!(
            config.responder.on_generation_failure,
            GenerationFailurePolicy::Silent
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn camel_case_keys_and_enums_parse() {
        let config: Config = serde_json::from_str(
            r#"{
                "llm": { "backend": "ollama", "chatModel": "qwen3:8b" },
                "retrieval": { "topK": 5, "threshold": 0.7, "indexHost": "idx.example" },
                "responder": { "onGenerationFailure": "fallback", "fallbackMessage": "later" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.llm.backend, LlmBackend::Ollama);
        assert_eq!(config.llm.chat_model, "qwen3:8b");
        assert_eq!(config.llm.embedding_model, "text-embedding-004");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.index_host.as_deref(), Some("idx.example"));
        assert_eq!(
            config.responder.on_generation_failure,
            GenerationFailurePolicy::Fallback
        );
        assert_eq!(config.responder.fallback_message, "later");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.retrieval.threshold = 1.5;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.responder.fallback_message = "   ".to_string();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.channels.zalo.webhook_path = "zalo".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn webhook_signing_needs_app_id() {
        let mut config = Config::default();
        config.channels.zalo.oa_secret_key = Some("secret".to_string());
        assert!(resolve_webhook_signing(&config).is_none());
        config.channels.zalo.app_id = Some("  ".to_string());
        assert!(resolve_webhook_signing(&config).is_none());
    }

    #[test]
    fn loopback_bind_detection() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(!is_loopback_bind("0.0.0.0"));
    }
}
