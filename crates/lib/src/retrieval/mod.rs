//! Knowledge retrieval: similarity index queries and relevance filtering.

mod pinecone;
mod relevance;

pub use pinecone::{PineconeError, PineconeIndex};
pub use relevance::{ContextBlock, CONTEXT_SEPARATOR};

use async_trait::async_trait;

/// One candidate chunk returned by the index, in the index's order.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalMatch {
    pub id: String,
    /// Similarity in [0, 1]; higher is closer.
    pub score: f32,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Pinecone(#[from] PineconeError),
}

/// Nearest-neighbour lookup over the knowledge base.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `top_k` matches for the vector, ordered by descending score.
    async fn query(&self, vector: &[f32], top_k: u32)
        -> Result<Vec<RetrievalMatch>, RetrievalError>;
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: u32,
    ) -> Result<Vec<RetrievalMatch>, RetrievalError> {
        Ok(PineconeIndex::query(self, vector, top_k).await?)
    }
}
