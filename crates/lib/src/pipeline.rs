//! Auto-response pipeline: embed → retrieve → filter → respond → dispatch.
//!
//! Each stage is one sequential call returning a `Result`; the first failure ends the
//! run. The caller (the gateway's ack boundary) turns the result into the webhook ack.

use crate::channels::{
    dispatch, ChannelHandle, InboundEvent, IntakeError, ReplyMessage, ZaloChannel,
};
use crate::config::{self, Config, GenerationFailurePolicy, LlmBackend};
use crate::llm::{Embedder, GeminiClient, Generator, LlmError, OllamaClient};
use crate::responder::{Responder, ResponderState};
use crate::retrieval::{ContextBlock, PineconeIndex, RetrievalError, VectorIndex};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("webhook signature mismatch")]
    InvalidSignature,
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(#[source] LlmError),
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(#[source] RetrievalError),
    #[error("generation failed: {0}")]
    GenerationFailure(#[source] LlmError),
}

impl From<IntakeError> for PipelineError {
    fn from(e: IntakeError) -> Self {
        match e {
            IntakeError::Malformed(reason) => PipelineError::MalformedPayload(reason),
        }
    }
}

/// How a successfully handled event ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Not a user text message (or blank text); nothing was called.
    Ignored,
    /// A reply was composed and handed to the channel once. `delivered` is false when the send failed.
    Replied {
        reply: ReplyMessage,
        state: ResponderState,
        delivered: bool,
    },
}

/// Answer composed for a question, before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub context: ContextBlock,
    pub state: ResponderState,
    pub text: String,
}

/// Newlines become spaces before embedding.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// The pipeline with its process-wide client handles. Shared by all webhook calls.
pub struct AutoResponder {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    responder: Responder,
    channel: Arc<dyn ChannelHandle>,
    top_k: u32,
    threshold: f32,
}

impl AutoResponder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        responder: Responder,
        channel: Arc<dyn ChannelHandle>,
        top_k: u32,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            responder,
            channel,
            top_k,
            threshold,
        }
    }

    /// Build the clients named by the config. The Pinecone host is looked up once here when
    /// only the index name is configured; a failed lookup leaves queries failing.
    pub async fn from_config(config: &Config) -> Self {
        let llm = &config.llm;
        let (embedder, generator): (Arc<dyn Embedder>, Arc<dyn Generator>) = match llm.backend {
            LlmBackend::Gemini => {
                let client = Arc::new(GeminiClient::new(
                    llm.base_url.clone(),
                    config::resolve_gemini_api_key(config),
                    &llm.embedding_model,
                    &llm.chat_model,
                ));
                (client.clone() as Arc<dyn Embedder>, client as Arc<dyn Generator>)
            }
            LlmBackend::Ollama => {
                let client = Arc::new(OllamaClient::new(
                    llm.base_url.clone(),
                    &llm.embedding_model,
                    &llm.chat_model,
                ));
                (client.clone() as Arc<dyn Embedder>, client as Arc<dyn Generator>)
            }
        };

        let retrieval = &config.retrieval;
        let api_key = config::resolve_pinecone_api_key(config);
        let host = match (&retrieval.index_host, &api_key) {
            (Some(host), _) if !host.trim().is_empty() => Some(host.clone()),
            (_, Some(key)) => {
                match PineconeIndex::describe_host(
                    &retrieval.control_plane_url,
                    &retrieval.index_name,
                    key,
                )
                .await
                {
                    Ok(host) => {
                        log::info!("pinecone index {} resolved to {}", retrieval.index_name, host);
                        Some(host)
                    }
                    Err(e) => {
                        log::warn!("pinecone index {} lookup failed: {}", retrieval.index_name, e);
                        None
                    }
                }
            }
            _ => {
                log::warn!("pinecone api key not configured; retrieval will fail");
                None
            }
        };
        let index = Arc::new(PineconeIndex::new(
            host,
            api_key,
            retrieval.namespace.clone(),
            &retrieval.metadata_text_field,
        ));

        let channel = Arc::new(ZaloChannel::new(
            Some(config.channels.zalo.api_base.clone()),
            config::resolve_zalo_access_token(config),
        ));

        Self::new(
            embedder,
            index,
            Responder::new(generator, config.responder.clone()),
            channel,
            retrieval.top_k,
            retrieval.threshold,
        )
    }

    /// Embed, retrieve, filter, and compose a reply for the question. Nothing is sent.
    pub async fn answer(&self, question: &str) -> Result<Answer, PipelineError> {
        let normalized = normalize_text(question);
        let vector = self
            .embedder
            .embed(&normalized)
            .await
            .map_err(PipelineError::EmbeddingUnavailable)?;
        let matches = self
            .index
            .query(&vector, self.top_k)
            .await
            .map_err(PipelineError::RetrievalUnavailable)?;
        log::debug!("retrieved {} match(es)", matches.len());
        let context = ContextBlock::from_matches(&matches, self.threshold);
        let (state, text) = self
            .responder
            .respond(&context, question)
            .await
            .map_err(PipelineError::GenerationFailure)?;
        Ok(Answer {
            context,
            state,
            text,
        })
    }

    /// Answer one inbound event and send the reply to its sender.
    pub async fn handle(&self, event: &InboundEvent) -> Result<PipelineOutcome, PipelineError> {
        let Some(question) = event.answerable_text() else {
            log::debug!("event {} ignored", event.event_kind.name());
            return Ok(PipelineOutcome::Ignored);
        };
        log::info!("user {} asked: {}", event.sender_id, question);

        let answer = match self.answer(question).await {
            Ok(answer) => answer,
            Err(PipelineError::GenerationFailure(e)) => {
                if self.responder.on_generation_failure() == GenerationFailurePolicy::Fallback {
                    let reply = ReplyMessage {
                        recipient_id: event.sender_id.clone(),
                        text: self.responder.fallback_message().to_string(),
                    };
                    dispatch(self.channel.as_ref(), &reply).await;
                }
                return Err(PipelineError::GenerationFailure(e));
            }
            Err(e) => return Err(e),
        };

        let reply = ReplyMessage {
            recipient_id: event.sender_id.clone(),
            text: answer.text,
        };
        let delivered = dispatch(self.channel.as_ref(), &reply).await;
        Ok(PipelineOutcome::Replied {
            reply,
            state: answer.state,
            delivered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{DispatchError, EventKind};
    use crate::config::ResponderConfig;
    use crate::retrieval::{PineconeError, RetrievalMatch};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Calls {
        embedded: Mutex<Vec<String>>,
        queried: Mutex<u32>,
        prompts: Mutex<Vec<String>>,
        sent: Mutex<Vec<ReplyMessage>>,
    }

    struct Fake {
        calls: Arc<Calls>,
        fail_embed: bool,
        fail_query: bool,
        fail_generate: bool,
        fail_send: bool,
        matches: Vec<RetrievalMatch>,
    }

    #[async_trait]
    impl Embedder for Fake {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            self.calls.embedded.lock().unwrap().push(text.to_string());
            if self.fail_embed {
                return Err(LlmError::Empty("embedding"));
            }
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    #[async_trait]
    impl VectorIndex for Fake {
        async fn query(
            &self,
            _vector: &[f32],
            _top_k: u32,
        ) -> Result<Vec<RetrievalMatch>, RetrievalError> {
            *self.calls.queried.lock().unwrap() += 1;
            if self.fail_query {
                return Err(PineconeError::Api("503 unavailable".to_string()).into());
            }
            Ok(self.matches.clone())
        }
    }

    #[async_trait]
    impl Generator for Fake {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.calls.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail_generate {
                return Err(LlmError::Empty("generated text"));
            }
            Ok("generated".to_string())
        }
    }

    #[async_trait]
    impl ChannelHandle for Fake {
        fn id(&self) -> &str {
            "fake"
        }

        async fn send_message(&self, reply: &ReplyMessage) -> Result<(), DispatchError> {
            self.calls.sent.lock().unwrap().push(reply.clone());
            if self.fail_send {
                return Err(DispatchError::Api("error -216: access token invalid".to_string()));
            }
            Ok(())
        }
    }

    impl Fake {
        fn new(matches: Vec<RetrievalMatch>) -> Self {
            Self {
                calls: Arc::new(Calls::default()),
                fail_embed: false,
                fail_query: false,
                fail_generate: false,
                fail_send: false,
                matches,
            }
        }

        fn into_pipeline(self, settings: ResponderConfig) -> (AutoResponder, Arc<Calls>) {
            let calls = self.calls.clone();
            let fake = Arc::new(self);
            let pipeline = AutoResponder::new(
                fake.clone(),
                fake.clone(),
                Responder::new(fake.clone(), settings),
                fake,
                3,
                0.60,
            );
            (pipeline, calls)
        }
    }

    fn text_event(text: &str) -> InboundEvent {
        InboundEvent {
            event_kind: EventKind::UserSendText,
            sender_id: "u1".to_string(),
            message_text: Some(text.to_string()),
        }
    }

    fn m(score: f32, text: &str) -> RetrievalMatch {
        RetrievalMatch {
            id: text.to_string(),
            score,
            text: text.to_string(),
        }
    }

    #[test]
    fn newlines_become_spaces() {
        assert_eq!(normalize_text("giá\náo\r\nsơ mi"), "giá áo  sơ mi");
    }

    #[tokio::test]
    async fn relevant_match_generates_and_sends() {
        let (pipeline, calls) = Fake::new(vec![m(0.75, "Áo sơ mi giá 250.000đ")])
            .into_pipeline(ResponderConfig::default());
        let outcome = pipeline.handle(&text_event("giá áo\nsơ mi")).await.unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Replied {
                reply: ReplyMessage {
                    recipient_id: "u1".to_string(),
                    text: "generated".to_string(),
                },
                state: ResponderState::HasContext,
                delivered: true,
            }
        );
        assert_eq!(*calls.embedded.lock().unwrap(), vec!["giá áo sơ mi".to_string()]);
        let prompts = calls.prompts.lock().unwrap();
        assert!(prompts[0].contains("Áo sơ mi giá 250.000đ"));
        assert!(prompts[0].contains("giá áo\nsơ mi"));
        assert_eq!(calls.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn irrelevant_matches_send_fallback_verbatim() {
        let (pipeline, calls) =
            Fake::new(vec![m(0.40, "Quần jean")]).into_pipeline(ResponderConfig::default());
        let outcome = pipeline.handle(&text_event("giá áo sơ mi")).await.unwrap();
        let PipelineOutcome::Replied { reply, state, .. } = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(state, ResponderState::NoContext);
        assert_eq!(reply.text, ResponderConfig::default().fallback_message);
        assert!(calls.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_events_touch_nothing() {
        let (pipeline, calls) = Fake::new(vec![]).into_pipeline(ResponderConfig::default());
        let event = InboundEvent {
            event_kind: EventKind::Other("user_seen".to_string()),
            sender_id: "u1".to_string(),
            message_text: None,
        };
        assert_eq!(pipeline.handle(&event).await.unwrap(), PipelineOutcome::Ignored);
        assert!(calls.embedded.lock().unwrap().is_empty());
        assert!(calls.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_stops_before_retrieval() {
        let mut fake = Fake::new(vec![m(0.9, "x")]);
        fake.fail_embed = true;
        let (pipeline, calls) = fake.into_pipeline(ResponderConfig::default());
        let err = pipeline.handle(&text_event("hi")).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingUnavailable(_)));
        assert_eq!(*calls.queried.lock().unwrap(), 0);
        assert!(calls.prompts.lock().unwrap().is_empty());
        assert!(calls.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retrieval_failure_sends_nothing() {
        let mut fake = Fake::new(vec![]);
        fake.fail_query = true;
        let (pipeline, calls) = fake.into_pipeline(ResponderConfig::default());
        let err = pipeline.handle(&text_event("hi")).await.unwrap_err();
        assert!(matches!(err, PipelineError::RetrievalUnavailable(_)));
        assert!(calls.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_is_silent_by_default() {
        let mut fake = Fake::new(vec![m(0.9, "x")]);
        fake.fail_generate = true;
        let (pipeline, calls) = fake.into_pipeline(ResponderConfig::default());
        let err = pipeline.handle(&text_event("hi")).await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailure(_)));
        assert!(calls.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_can_send_fallback() {
        let mut fake = Fake::new(vec![m(0.9, "x")]);
        fake.fail_generate = true;
        let settings = ResponderConfig {
            fallback_message: "a human will follow up".to_string(),
            on_generation_failure: GenerationFailurePolicy::Fallback,
            ..ResponderConfig::default()
        };
        let (pipeline, calls) = fake.into_pipeline(settings);
        assert!(pipeline.handle(&text_event("hi")).await.is_err());
        let sent = calls.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "a human will follow up");
    }

    #[tokio::test]
    async fn dispatch_failure_is_not_an_error() {
        let mut fake = Fake::new(vec![m(0.9, "x")]);
        fake.fail_send = true;
        let (pipeline, calls) = fake.into_pipeline(ResponderConfig::default());
        let outcome = pipeline.handle(&text_event("hi")).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Replied { delivered: false, .. }));
        assert_eq!(calls.sent.lock().unwrap().len(), 1);
    }
}
