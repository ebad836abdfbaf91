//! Índice de similaridade em memória.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::types::{CacheRecord, Modality, NewCacheRecord, SimilarMatch};
use crate::{MeshCacheError, MeshCacheResult};

use super::{select_nearest, sort_by_creation, sort_by_recency, ModalityStats, SimilarityIndex};

#[derive(Default)]
struct State {
    next_id: i64,
    records: HashMap<Modality, HashMap<String, CacheRecord>>,
    models: HashMap<Modality, (String, usize)>,
}

/// Índice local ao processo. O conteúdo se perde quando ele é descartado.
#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<State>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> MeshCacheResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| MeshCacheError::StorageUnavailable("index lock poisoned".to_string()))
    }

    fn write(&self) -> MeshCacheResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| MeshCacheError::StorageUnavailable("index lock poisoned".to_string()))
    }
}

impl SimilarityIndex for MemoryIndex {
    fn ensure_model(
        &self,
        modality: Modality,
        model_id: &str,
        dimension: usize,
    ) -> MeshCacheResult<bool> {
        let mut state = self.write()?;
        let wiped = match state.models.get(&modality) {
            Some((id, dim)) if id == model_id && *dim == dimension => return Ok(false),
            Some((previous, _)) => {
                tracing::warn!(
                    modality = %modality,
                    previous = %previous,
                    current = %model_id,
                    "Feature model changed, dropping stored vectors"
                );
                true
            }
            None => false,
        };
        if wiped {
            state.records.remove(&modality);
        }
        state
            .models
            .insert(modality, (model_id.to_string(), dimension));
        Ok(wiped)
    }

    fn exact_lookup(
        &self,
        modality: Modality,
        fingerprint: &str,
    ) -> MeshCacheResult<Option<CacheRecord>> {
        let state = self.read()?;
        Ok(state
            .records
            .get(&modality)
            .and_then(|table| table.get(fingerprint))
            .cloned())
    }

    fn nearest(
        &self,
        modality: Modality,
        vector: &[f32],
        threshold: f32,
    ) -> MeshCacheResult<Option<SimilarMatch>> {
        let mut records: Vec<CacheRecord> = {
            let state = self.read()?;
            state
                .records
                .get(&modality)
                .map(|table| table.values().cloned().collect())
                .unwrap_or_default()
        };
        sort_by_creation(&mut records);
        Ok(select_nearest(records, vector, threshold))
    }

    fn insert_or_replace(
        &self,
        modality: Modality,
        record: NewCacheRecord,
    ) -> MeshCacheResult<CacheRecord> {
        let mut state = self.write()?;
        state.next_id += 1;
        let now = Utc::now();

        let stored = CacheRecord {
            id: state.next_id,
            modality,
            input_fingerprint: record.input_fingerprint,
            input_label: record.input_label,
            feature_vector: record.feature_vector,
            artifact_reference: record.artifact_reference,
            quality_score: record.quality_score,
            generation_cost: record.generation_cost,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
        };
        state
            .records
            .entry(modality)
            .or_default()
            .insert(stored.input_fingerprint.clone(), stored.clone());
        Ok(stored)
    }

    fn touch(&self, modality: Modality, fingerprint: &str) -> MeshCacheResult<Option<CacheRecord>> {
        let mut state = self.write()?;
        let now = Utc::now();
        Ok(state
            .records
            .get_mut(&modality)
            .and_then(|table| table.get_mut(fingerprint))
            .map(|record| {
                record.access_count += 1;
                record.last_accessed_at = record.last_accessed_at.max(now);
                record.clone()
            }))
    }

    fn remove(&self, modality: Modality, fingerprint: &str) -> MeshCacheResult<bool> {
        let mut state = self.write()?;
        Ok(state
            .records
            .get_mut(&modality)
            .map(|table| table.remove(fingerprint).is_some())
            .unwrap_or(false))
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> MeshCacheResult<usize> {
        let mut state = self.write()?;
        let mut removed = 0;
        for table in state.records.values_mut() {
            let before = table.len();
            table.retain(|_, record| record.last_accessed_at >= cutoff);
            removed += before - table.len();
        }
        Ok(removed)
    }

    fn records_by_recency(&self) -> MeshCacheResult<Vec<CacheRecord>> {
        let mut records: Vec<CacheRecord> = {
            let state = self.read()?;
            state
                .records
                .values()
                .flat_map(|table| table.values().cloned())
                .collect()
        };
        sort_by_recency(&mut records);
        Ok(records)
    }

    fn stats(&self, modality: Modality) -> MeshCacheResult<ModalityStats> {
        let state = self.read()?;
        let (entries, total_access) = state
            .records
            .get(&modality)
            .map(|table| {
                (
                    table.len(),
                    table.values().map(|r| r.access_count).sum::<u64>(),
                )
            })
            .unwrap_or((0, 0));

        Ok(ModalityStats {
            entries,
            avg_access_count: if entries == 0 {
                0.0
            } else {
                total_access as f64 / entries as f64
            },
            model_id: state.models.get(&modality).map(|(id, _)| id.clone()),
        })
    }
}
