//! Embeddings de texto.

use crate::{MeshCacheError, MeshCacheResult};

use super::l2_normalize;

/// Mapeia texto para um vetor de tamanho fixo para comparação por similaridade.
///
/// Implementações devem ser determinísticas: o mesmo texto sempre gera o mesmo
/// vetor. Trocar o modelo muda [`TextEmbedder::model_id`], e o índice descarta
/// todo vetor de texto gravado sob outro id.
pub trait TextEmbedder: Send + Sync {
    /// Identificador do modelo e da sua configuração.
    fn model_id(&self) -> &str;

    /// Tamanho de todo vetor retornado por [`TextEmbedder::embed`].
    fn dimension(&self) -> usize;

    /// Gera o embedding de um texto. Entrada vazia é erro, nunca vetor zero.
    fn embed(&self, text: &str) -> MeshCacheResult<Vec<f32>>;
}

const UNIGRAM_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.25;

/// Embedder por feature hashing sobre unigramas de palavras e trigramas de caracteres.
///
/// Textos que compartilham a maior parte das palavras ficam próximos no espaço de
/// cosseno, o que basta para reconhecer prompts reescritos. Sem arquivos de modelo,
/// sem rede, reproduzível bit a bit entre execuções.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hashing-v1-{}", dimension),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl TextEmbedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> MeshCacheResult<Vec<f32>> {
        let tokens = Self::tokens(text);
        if tokens.is_empty() {
            return Err(MeshCacheError::unreadable(
                "text contains no embeddable words",
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.add_feature(&mut vector, &format!("w:{}", token), UNIGRAM_WEIGHT);

            let padded: Vec<char> = format!(" {} ", token).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, &format!("c:{}", trigram), TRIGRAM_WEIGHT);
            }
        }

        // Colisões de sinais opostos podem anular por completo uma entrada pequena.
        if vector.iter().all(|v| *v == 0.0) {
            return Err(MeshCacheError::unreadable("text embedding is degenerate"));
        }

        l2_normalize(&mut vector, 0.0);
        Ok(vector)
    }
}

/// FNV-1a de 64 bits.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
