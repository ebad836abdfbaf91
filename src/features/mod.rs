//! Extração de features para comparação por similaridade.
//!
//! Transforma um [`Input`] em um vetor de tamanho fixo:
//!
//! - **Texto**: qualquer [`TextEmbedder`]; [`HashingEmbedder`] por padrão
//! - **Imagem**: [`ImageFeatureExtractor`], histogramas HSV mais um histograma de bordas Canny
//!
//! Entradas ilegíveis produzem [`MeshCacheError::InputUnreadable`], nunca um
//! vetor zero.

mod edges;
mod visual;
mod text;

use std::sync::Arc;

pub use visual::{ImageFeatureExtractor, CANONICAL_SIZE, IMAGE_FEATURE_LEN};
pub use edges::canny;
pub use text::{HashingEmbedder, TextEmbedder};

use crate::types::{Input, Modality};
use crate::{MeshCacheError, MeshCacheResult};

/// Similaridade de cosseno entre dois vetores.
///
/// Retorna `None` quando os tamanhos diferem. Um vetor zero tem similaridade 0
/// com qualquer outro.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

/// Divide `vector` por `‖vector‖ + epsilon`.
pub fn l2_normalize(vector: &mut [f32], epsilon: f32) {
    let norm = vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt() as f32;
    let denom = norm + epsilon;
    if denom > 0.0 {
        for v in vector.iter_mut() {
            *v /= denom;
        }
    }
}

/// Encaminha entradas para o extrator da sua modalidade.
#[derive(Clone)]
pub struct FeatureExtractor {
    text: Arc<dyn TextEmbedder>,
    image: ImageFeatureExtractor,
}

impl FeatureExtractor {
    /// Usa o embedder por hashing com a dimensão de texto informada.
    pub fn new(text_dimension: usize) -> Self {
        Self::with_text_embedder(Arc::new(HashingEmbedder::new(text_dimension)))
    }

    pub fn with_text_embedder(text: Arc<dyn TextEmbedder>) -> Self {
        Self {
            text,
            image: ImageFeatureExtractor::new(),
        }
    }

    pub fn embed_text(&self, text: &str) -> MeshCacheResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(MeshCacheError::unreadable("empty text"));
        }
        let vector = self.text.embed(text)?;
        if vector.len() != self.text.dimension() {
            return Err(MeshCacheError::DimensionMismatch {
                expected: self.text.dimension(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    pub fn embed_image(&self, bytes: &[u8]) -> MeshCacheResult<Vec<f32>> {
        if bytes.is_empty() {
            return Err(MeshCacheError::unreadable("empty image payload"));
        }
        self.image.extract(bytes)
    }

    /// Calcula o vetor de qualquer entrada.
    pub fn embed(&self, input: &Input) -> MeshCacheResult<Vec<f32>> {
        match input {
            Input::Text(text) => self.embed_text(text),
            Input::Image(image) => self.embed_image(image.bytes()),
        }
    }

    /// Identificador do modelo registrado pelo índice para `modality`.
    pub fn model_id(&self, modality: Modality) -> String {
        match modality {
            Modality::Text => self.text.model_id().to_string(),
            Modality::Image => self.image.model_id().to_string(),
        }
    }

    pub fn dimension(&self, modality: Modality) -> usize {
        match modality {
            Modality::Text => self.text.dimension(),
            Modality::Image => self.image.dimension(),
        }
    }
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("text_model", &self.text.model_id())
            .field("image_model", &self.image.model_id())
            .finish()
    }
}
