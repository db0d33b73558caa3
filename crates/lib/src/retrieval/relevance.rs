//! Relevance gate: keep matches strictly above the threshold and join their texts.

use crate::retrieval::RetrievalMatch;

/// Placed between chunk texts in the context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Texts of the relevant matches, in index order. Empty means nothing relevant was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBlock(String);

impl ContextBlock {
    /// Hard cutoff at `score > threshold`; no re-ranking or sorting.
    pub fn from_matches(matches: &[RetrievalMatch], threshold: f32) -> Self {
        let texts: Vec<&str> = matches
            .iter()
            .filter(|m| m.score > threshold)
            .map(|m| m.text.as_str())
            .collect();
        ContextBlock(texts.join(CONTEXT_SEPARATOR))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(score: f32, text: &str) -> RetrievalMatch {
        RetrievalMatch {
            id: text.to_string(),
            score,
            text: text.to_string(),
        }
    }

    #[test]
    fn single_match_above_threshold() {
        let ctx = ContextBlock::from_matches(&[m(0.75, "Áo sơ mi giá 250.000đ")], 0.60);
        assert_eq!(ctx.as_str(), "Áo sơ mi giá 250.000đ");
    }

    #[test]
    fn cutoff_is_strict_and_not_a_rerank() {
        assert!(ContextBlock::from_matches(&[m(0.59, "best")], 0.60).is_empty());
        assert!(ContextBlock::from_matches(&[m(0.60, "equal")], 0.60).is_empty());
        assert!(ContextBlock::from_matches(&[], 0.60).is_empty());
    }

    #[test]
    fn survivors_keep_index_order() {
        let matches = [m(0.91, "a"), m(0.40, "b"), m(0.65, "c"), m(0.61, "d")];
        let ctx = ContextBlock::from_matches(&matches, 0.60);
        assert_eq!(ctx.as_str(), "a\n\n---\n\nc\n\n---\n\nd");
    }
}
