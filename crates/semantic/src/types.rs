use serde::{Deserialize, Serialize};

/// A vector produced by one of the providers, tagged with where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    /// Embedding values.
    pub vector: Vec<f32>,
    /// Model that produced the vector (`text-embedding-3-small`, `all-MiniLM-L6-v2`, ...).
    pub model_name: String,
    /// Name of the provider that answered (`hosted`, `local`, `stub`).
    pub provider: String,
}

impl Embedding {
    /// Dimension of [`vector`](Self::vector).
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    /// Consumes the embedding, keeping only the raw vector.
    pub fn into_vector(self) -> Vec<f32> {
        self.vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_tracks_vector_length() {
        let embedding = Embedding {
            vector: vec![0.1, 0.2, 0.3],
            model_name: "all-MiniLM-L6-v2".into(),
            provider: "local".into(),
        };
        assert_eq!(embedding.dimension(), 3);
        assert_eq!(embedding.into_vector(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn serde_roundtrip_keeps_provenance() {
        let embedding = Embedding {
            vector: vec![1.0, 0.0],
            model_name: "text-embedding-3-small".into(),
            provider: "hosted".into(),
        };
        let json = serde_json::to_string(&embedding).unwrap();
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, embedding);
    }
}
