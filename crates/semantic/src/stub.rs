use async_trait::async_trait;
use fxhash::hash64;

use crate::normalize::l2_normalize_in_place;
use crate::{Embedding, EmbeddingProvider, SemanticError};

/// Deterministic provider for demos and tests. Generates sinusoid values derived from a hash of
/// the input text, so equal inputs always give equal unit vectors.
#[derive(Debug, Clone)]
pub struct StubProvider {
    dimension: usize,
}

impl StubProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub(crate) fn vector_for(&self, text: &str) -> Vec<f32> {
        let h = hash64(text.as_bytes());
        let mut v: Vec<f32> = (0..self.dimension)
            .map(|idx| {
                let shifted = h.rotate_right((idx % 64) as u32);
                ((shifted % 10_007) as f32 * 0.001 + idx as f32 * 0.37).sin()
            })
            .collect();
        l2_normalize_in_place(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding, SemanticError> {
        Ok(Embedding {
            vector: self.vector_for(text),
            model_name: "stub".into(),
            provider: "stub".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_same_vector() {
        let stub = StubProvider::new(384);
        let a = stub.embed("occupational therapy").await.unwrap();
        let b = stub.embed("occupational therapy").await.unwrap();
        assert_eq!(a.vector, b.vector);
        assert_eq!(a.dimension(), 384);
        assert_eq!(a.provider, "stub");
    }

    #[tokio::test]
    async fn different_text_different_vector() {
        let stub = StubProvider::new(32);
        let a = stub.embed("splinting").await.unwrap();
        let b = stub.embed("feeding").await.unwrap();
        assert_ne!(a.vector, b.vector);
    }

    #[test]
    fn vectors_are_unit_length() {
        let v = StubProvider::new(64).vector_for("hand therapy");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_dimension_is_clamped() {
        assert_eq!(StubProvider::new(0).dimension(), 1);
    }
}
