//! Responder: generated answer when relevant context exists, fixed fallback otherwise.

use crate::config::{GenerationFailurePolicy, ResponderConfig};
use crate::llm::{Generator, LlmError};
use crate::retrieval::ContextBlock;
use std::sync::Arc;

const QUESTION_LABEL: &str = "Câu hỏi";

/// Which branch produced the reply; chosen only by whether the context is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    HasContext,
    NoContext,
}

impl ResponderState {
    pub fn for_context(context: &ContextBlock) -> Self {
        if context.is_empty() {
            ResponderState::NoContext
        } else {
            ResponderState::HasContext
        }
    }
}

/// Composes reply text. Holds the shared generator handle and the reply settings.
pub struct Responder {
    generator: Arc<dyn Generator>,
    settings: ResponderConfig,
}

impl Responder {
    pub fn new(generator: Arc<dyn Generator>, settings: ResponderConfig) -> Self {
        Self {
            generator,
            settings,
        }
    }

    pub fn fallback_message(&self) -> &str {
        &self.settings.fallback_message
    }

    pub fn on_generation_failure(&self) -> GenerationFailurePolicy {
        self.settings.on_generation_failure
    }

    /// Persona, the context, the user's question verbatim, then the style instruction.
    pub fn build_prompt(&self, context: &ContextBlock, question: &str) -> String {
        format!(
            "{}\n{}\n\n{}: \"{}\"\n{}",
            self.settings.persona.trim(),
            context.as_str(),
            QUESTION_LABEL,
            question,
            self.settings.style.trim()
        )
    }

    /// Reply text for the question. `NoContext` never calls the generator.
    pub async fn respond(
        &self,
        context: &ContextBlock,
        question: &str,
    ) -> Result<(ResponderState, String), LlmError> {
        match ResponderState::for_context(context) {
            ResponderState::NoContext => Ok((
                ResponderState::NoContext,
                self.settings.fallback_message.clone(),
            )),
            ResponderState::HasContext => {
                let prompt = self.build_prompt(context, question);
                let text = self.generator.generate(&prompt).await?;
                Ok((ResponderState::HasContext, text))
            }
        }
    }
}
