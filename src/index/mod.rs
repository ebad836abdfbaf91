//! Índice de similaridade: registros do cache por modalidade com busca exata e por vizinho mais próximo.
//!
//! ## Backends
//!
//! - [`SqliteIndex`]: persistente, uma tabela por modalidade
//! - [`MemoryIndex`]: local ao processo, usado em testes e caches efêmeros
//!
//! Ambos percorrem todos os registros de uma modalidade em [`SimilarityIndex::nearest`]
//! e compartilham [`select_nearest`], então limiar e desempate são idênticos:
//! vence a maior similaridade, similaridade igual ao limiar conta, e em empate
//! vence o registro criado primeiro.

mod memory;
mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use crate::features::cosine_similarity;
use crate::types::config::{CacheConfig, IndexBackend};
use crate::types::{CacheRecord, Modality, NewCacheRecord, SimilarMatch};
use crate::MeshCacheResult;

/// Contagem de entradas por modalidade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalityStats {
    pub entries: usize,
    pub avg_access_count: f64,
    pub model_id: Option<String>,
}

/// Armazenamento de [`CacheRecord`]s.
///
/// Toda chamada que altera dados é atômica para o registro (ou lote) afetado.
/// Implementações não seguram lock entre chamadas.
pub trait SimilarityIndex: Send + Sync {
    /// Registra o modelo de features de `modality`. Se outro modelo estava
    /// registrado, todos os registros dessa modalidade são descartados e retorna
    /// `true`.
    fn ensure_model(&self, modality: Modality, model_id: &str, dimension: usize)
        -> MeshCacheResult<bool>;

    /// Registro cuja impressão digital da entrada é igual a `fingerprint`.
    fn exact_lookup(&self, modality: Modality, fingerprint: &str)
        -> MeshCacheResult<Option<CacheRecord>>;

    /// Registro mais similar com similaridade `>= threshold`.
    fn nearest(
        &self,
        modality: Modality,
        vector: &[f32],
        threshold: f32,
    ) -> MeshCacheResult<Option<SimilarMatch>>;

    /// Upsert por impressão digital. Um registro substituído recomeça com
    /// `access_count = 1` e timestamps novos.
    fn insert_or_replace(&self, modality: Modality, record: NewCacheRecord)
        -> MeshCacheResult<CacheRecord>;

    /// Incrementa `access_count` e avança `last_accessed_at`.
    /// Retorna o registro atualizado, ou `None` se ele não existe mais.
    fn touch(&self, modality: Modality, fingerprint: &str) -> MeshCacheResult<Option<CacheRecord>>;

    /// Remove um registro.
    fn remove(&self, modality: Modality, fingerprint: &str) -> MeshCacheResult<bool>;

    /// Remove todo registro acessado pela última vez antes de `cutoff`.
    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> MeshCacheResult<usize>;

    /// Todos os registros de todas as modalidades, menos usados recentemente primeiro.
    fn records_by_recency(&self) -> MeshCacheResult<Vec<CacheRecord>>;

    /// Contagem de entradas por modalidade.
    fn stats(&self, modality: Modality) -> MeshCacheResult<ModalityStats>;
}

/// Escolhe a melhor correspondência entre `candidates`, que devem estar em ordem
/// de criação (mais antigo primeiro).
///
/// Registros com tamanho de vetor diferente da consulta são ignorados.
pub fn select_nearest<I>(candidates: I, vector: &[f32], threshold: f32) -> Option<SimilarMatch>
where
    I: IntoIterator<Item = CacheRecord>,
{
    let mut best: Option<SimilarMatch> = None;

    for record in candidates {
        let Some(similarity) = cosine_similarity(vector, &record.feature_vector) else {
            tracing::warn!(
                fingerprint = %record.input_fingerprint,
                stored = record.feature_vector.len(),
                query = vector.len(),
                "Skipping record with mismatched vector length"
            );
            continue;
        };

        if similarity < threshold || similarity.is_nan() {
            continue;
        }

        // Estritamente maior: em empate fica o registro anterior.
        let better = best.as_ref().map_or(true, |b| similarity > b.similarity);
        if better {
            best = Some(SimilarMatch { record, similarity });
        }
    }

    best
}

/// Ordena registros por criação.
pub(crate) fn sort_by_creation(records: &mut [CacheRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// Ordena registros do menos usado recentemente para o mais.
pub(crate) fn sort_by_recency(records: &mut [CacheRecord]) {
    records.sort_by(|a, b| {
        a.last_accessed_at
            .cmp(&b.last_accessed_at)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// Abre o backend selecionado em `config`.
pub fn open_index(config: &CacheConfig) -> MeshCacheResult<Arc<dyn SimilarityIndex>> {
    match config.backend {
        IndexBackend::Sqlite => Ok(Arc::new(SqliteIndex::open(&config.db_path())?)),
        IndexBackend::Memory => Ok(Arc::new(MemoryIndex::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, vector: Vec<f32>) -> CacheRecord {
        let now = Utc::now();
        CacheRecord {
            id,
            modality: Modality::Text,
            input_fingerprint: format!("fp-{}", id),
            input_label: String::new(),
            feature_vector: vector,
            artifact_reference: format!("m{}.obj", id),
            quality_score: 0.0,
            generation_cost: 0.0,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
        }
    }

    #[test]
    fn test_select_nearest_empty() {
        assert!(select_nearest(Vec::new(), &[1.0, 0.0], 0.5).is_none());
    }

    #[test]
    fn test_select_nearest_highest_wins() {
        let candidates = vec![record(1, vec![0.9, 0.1]), record(2, vec![1.0, 0.0])];
        let best = select_nearest(candidates, &[1.0, 0.0], 0.5).unwrap();
        assert_eq!(best.record.id, 2);
    }

    #[test]
    fn test_select_nearest_threshold_inclusive() {
        let candidates = vec![record(1, vec![1.0, 0.0])];
        assert!(select_nearest(candidates.clone(), &[1.0, 0.0], 1.0).is_some());

        let candidates = vec![record(1, vec![0.0, 1.0])];
        assert!(select_nearest(candidates, &[1.0, 0.0], 0.01).is_none());
    }

    #[test]
    fn test_select_nearest_tie_keeps_first() {
        let candidates = vec![record(1, vec![1.0, 0.0]), record(2, vec![2.0, 0.0])];
        let best = select_nearest(candidates, &[1.0, 0.0], 0.5).unwrap();
        assert_eq!(best.record.id, 1);
    }

    #[test]
    fn test_select_nearest_skips_mismatched_lengths() {
        let candidates = vec![record(1, vec![1.0, 0.0, 0.0]), record(2, vec![0.8, 0.6])];
        let best = select_nearest(candidates, &[1.0, 0.0], 0.5).unwrap();
        assert_eq!(best.record.id, 2);
    }
}
