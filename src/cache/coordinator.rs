//! Coordenador do cache: consulta exata e depois similar, gravação e remoção.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::features::FeatureExtractor;
use crate::index::{open_index, MemoryIndex, ModalityStats, SimilarityIndex};
use crate::types::config::CacheConfig;
use crate::types::{CacheRecord, Input, Modality, NewCacheRecord};
use crate::MeshCacheResult;

use super::fingerprint::fingerprint;

/// Artefato em cache retornado por uma consulta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHit {
    /// O registro depois de contabilizado o hit.
    pub record: CacheRecord,
}

impl CacheHit {
    pub fn artifact_reference(&self) -> &str {
        &self.record.artifact_reference
    }

    pub fn quality_score(&self) -> f64 {
        self.record.quality_score
    }
}

/// Por que uma consulta errou.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// Nenhum registro bateu exatamente ou passou do limiar.
    NotFound,
    /// A entrada não pôde virar um vetor de features.
    NoVector,
    /// O cache está desligado.
    Disabled,
    /// O índice não pôde ser lido.
    StorageUnavailable,
}

impl MissReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissReason::NotFound => "not_found",
            MissReason::NoVector => "no_vector",
            MissReason::Disabled => "disabled",
            MissReason::StorageUnavailable => "storage_unavailable",
        }
    }
}

/// Resultado de [`CacheCoordinator::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult {
    HitExact(CacheHit),
    HitSimilar { hit: CacheHit, similarity: f32 },
    Miss(MissReason),
}

impl CacheResult {
    pub fn is_hit(&self) -> bool {
        !matches!(self, CacheResult::Miss(_))
    }

    pub fn hit(&self) -> Option<&CacheHit> {
        match self {
            CacheResult::HitExact(hit) | CacheResult::HitSimilar { hit, .. } => Some(hit),
            CacheResult::Miss(_) => None,
        }
    }

    pub fn artifact_reference(&self) -> Option<&str> {
        self.hit().map(CacheHit::artifact_reference)
    }

    /// 1.0 para hits exatos.
    pub fn similarity(&self) -> Option<f32> {
        match self {
            CacheResult::HitExact(_) => Some(1.0),
            CacheResult::HitSimilar { similarity, .. } => Some(*similarity),
            CacheResult::Miss(_) => None,
        }
    }

    /// `hit_exact`, `hit_similar` ou `miss`.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheResult::HitExact(_) => "hit_exact",
            CacheResult::HitSimilar { .. } => "hit_similar",
            CacheResult::Miss(_) => "miss",
        }
    }
}

/// Estatísticas do cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub enabled: bool,
    pub similarity_threshold: f32,

    /// Hits exatos desde a criação do coordenador.
    pub exact_hits: u64,

    /// Hits similares desde a criação do coordenador.
    pub similar_hits: u64,

    pub misses: u64,
    pub store_failures: u64,

    pub text: ModalityStats,
    pub image: ModalityStats,

    /// Tamanho dos arquivos de artefato distintos que ainda existem em disco.
    pub total_artifact_bytes: u64,
}

impl CacheStatistics {
    pub fn hits(&self) -> u64 {
        self.exact_hits + self.similar_hits
    }

    /// Hits sobre consultas.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    pub fn total_entries(&self) -> usize {
        self.text.entries + self.image.entries
    }
}

/// O que uma varredura de remoção retirou.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    /// Registros removidos por não serem acessados dentro do limite de idade.
    pub expired: usize,

    /// Registros removidos, do menos usado recentemente, para caber no orçamento.
    pub over_budget: usize,

    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl EvictionReport {
    pub fn removed(&self) -> usize {
        self.expired + self.over_budget
    }
}

#[derive(Debug, Default)]
struct Counters {
    exact_hits: AtomicU64,
    similar_hits: AtomicU64,
    misses: AtomicU64,
    store_failures: AtomicU64,
}

/// Ponto de entrada público do cache por similaridade.
///
/// Não segura lock entre chamadas, então uma geração lenta entre
/// [`lookup`](Self::lookup) e [`store`](Self::store) não bloqueia ninguém.
/// Erros de armazenamento nunca chegam a quem chama `lookup` ou `store`: são
/// registrados no log e o cache se comporta como pass-through.
pub struct CacheCoordinator {
    index: Arc<dyn SimilarityIndex>,
    extractor: FeatureExtractor,
    config: CacheConfig,
    counters: Counters,
}

impl CacheCoordinator {
    /// Abre o índice configurado e os extratores padrão.
    pub fn open(config: CacheConfig) -> MeshCacheResult<Self> {
        let index = open_index(&config)?;
        let extractor = FeatureExtractor::new(config.text_dimension);
        Ok(Self::with_parts(config, index, extractor))
    }

    /// Coordenador que sempre erra. Usado quando o índice não pode ser aberto.
    pub fn pass_through(mut config: CacheConfig) -> Self {
        config.enabled = false;
        let extractor = FeatureExtractor::new(config.text_dimension);
        Self::with_parts(config, Arc::new(MemoryIndex::new()), extractor)
    }

    /// Monta um coordenador a partir de partes explícitas e registra os modelos
    /// de features no índice, apagando vetores de um modelo anterior.
    pub fn with_parts(
        config: CacheConfig,
        index: Arc<dyn SimilarityIndex>,
        extractor: FeatureExtractor,
    ) -> Self {
        for modality in Modality::ALL {
            let model_id = extractor.model_id(modality);
            if let Err(e) = index.ensure_model(modality, &model_id, extractor.dimension(modality)) {
                tracing::warn!(modality = %modality, error = %e, "Failed to record feature model");
            }
        }

        Self {
            index,
            extractor,
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Consulta
    // ═══════════════════════════════════════════════════════════════════════

    /// Fase exata: correspondência por impressão digital, contada como hit.
    pub fn lookup_exact(&self, input: &Input) -> MeshCacheResult<Option<CacheHit>> {
        let modality = input.modality();
        let fingerprint = fingerprint(input);

        match self.index.exact_lookup(modality, &fingerprint)? {
            Some(record) => Ok(Some(self.record_hit(modality, record)?)),
            None => Ok(None),
        }
    }

    /// Fase similar: registro mais próximo no limiar ou acima.
    ///
    /// Falha com `InputUnreadable` quando nenhum vetor pode ser calculado.
    pub fn lookup_similar(&self, input: &Input) -> MeshCacheResult<Option<(CacheHit, f32)>> {
        let vector = self.extractor.embed(input)?;
        self.lookup_similar_vector(input.modality(), &vector)
    }

    fn lookup_similar_vector(
        &self,
        modality: Modality,
        vector: &[f32],
    ) -> MeshCacheResult<Option<(CacheHit, f32)>> {
        let threshold = self.config.similarity_threshold;
        match self.index.nearest(modality, vector, threshold)? {
            Some(found) => {
                let hit = self.record_hit(modality, found.record)?;
                Ok(Some((hit, found.similarity)))
            }
            None => Ok(None),
        }
    }

    fn record_hit(&self, modality: Modality, record: CacheRecord) -> MeshCacheResult<CacheHit> {
        // Uma remoção pode ter apagado o registro entre a consulta e o touch;
        // o chamador ainda recebe o artefato que ia usar.
        let record = self
            .index
            .touch(modality, &record.input_fingerprint)?
            .unwrap_or(record);
        Ok(CacheHit { record })
    }

    /// Fase exata, depois fase similar. Nunca falha.
    pub fn lookup(&self, input: &Input) -> CacheResult {
        let result = self.lookup_inner(input);

        match &result {
            CacheResult::HitExact(hit) => {
                self.counters.exact_hits.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    modality = %input.modality(),
                    artifact = %hit.artifact_reference(),
                    "Cache hit (exact)"
                );
            }
            CacheResult::HitSimilar { hit, similarity } => {
                self.counters.similar_hits.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    modality = %input.modality(),
                    artifact = %hit.artifact_reference(),
                    similarity = %format!("{:.3}", similarity),
                    "Cache hit (similar)"
                );
            }
            CacheResult::Miss(reason) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    modality = %input.modality(),
                    reason = reason.as_str(),
                    input = %input.preview(),
                    "Cache miss"
                );
            }
        }

        result
    }

    fn lookup_inner(&self, input: &Input) -> CacheResult {
        if !self.config.enabled {
            return CacheResult::Miss(MissReason::Disabled);
        }

        match self.lookup_exact(input) {
            Ok(Some(hit)) => return CacheResult::HitExact(hit),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Cache index unavailable, treating as miss");
                return CacheResult::Miss(MissReason::StorageUnavailable);
            }
        }

        let vector = match self.extractor.embed(input) {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(
                    modality = %input.modality(),
                    error = %e,
                    "No feature vector for input"
                );
                return CacheResult::Miss(MissReason::NoVector);
            }
        };

        match self.lookup_similar_vector(input.modality(), &vector) {
            Ok(Some((hit, similarity))) => CacheResult::HitSimilar { hit, similarity },
            Ok(None) => CacheResult::Miss(MissReason::NotFound),
            Err(e) => {
                tracing::warn!(error = %e, "Cache index unavailable, treating as miss");
                CacheResult::Miss(MissReason::StorageUnavailable)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Gravação
    // ═══════════════════════════════════════════════════════════════════════

    /// Registra um artefato gerado. Retorna `None` quando o cache está desligado.
    ///
    /// Impressão digital e vetor são recalculados a partir de `input`; nada vem
    /// de uma consulta anterior.
    pub fn try_store(
        &self,
        input: &Input,
        artifact_reference: &str,
        quality_score: f64,
        generation_cost: f64,
    ) -> MeshCacheResult<Option<CacheRecord>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let vector = self.extractor.embed(input)?;
        let record = NewCacheRecord {
            input_fingerprint: fingerprint(input),
            input_label: input.label(),
            feature_vector: vector,
            artifact_reference: artifact_reference.to_string(),
            quality_score,
            generation_cost,
        };

        let stored = self.index.insert_or_replace(input.modality(), record)?;
        tracing::info!(
            modality = %input.modality(),
            artifact = %artifact_reference,
            quality_score,
            "Stored cache record"
        );
        Ok(Some(stored))
    }

    /// [`try_store`](Self::try_store) em melhor esforço: falhas vão para o log.
    pub fn store(
        &self,
        input: &Input,
        artifact_reference: &str,
        quality_score: f64,
        generation_cost: f64,
    ) {
        if let Err(e) = self.try_store(input, artifact_reference, quality_score, generation_cost) {
            self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                modality = %input.modality(),
                artifact = %artifact_reference,
                error = %e,
                "Failed to store cache record"
            );
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Manutenção
    // ═══════════════════════════════════════════════════════════════════════

    /// Remove registros ociosos há mais de `max_age`, depois os menos usados
    /// recentemente até os artefatos referenciados caberem em `max_total_bytes`.
    ///
    /// Só registros do índice são removidos; os arquivos ficam no lugar.
    pub fn evict(&self, max_age: Duration, max_total_bytes: u64) -> MeshCacheResult<EvictionReport> {
        let mut report = EvictionReport::default();

        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        if let Some(cutoff) = cutoff {
            report.expired = self.index.evict_older_than(cutoff)?;
        }

        let records = self.index.records_by_recency()?;
        let mut references: HashMap<&str, usize> = HashMap::new();
        for record in &records {
            *references.entry(record.artifact_reference.as_str()).or_default() += 1;
        }
        let sizes: HashMap<&str, u64> = references
            .keys()
            .map(|path| (*path, artifact_size(path)))
            .collect();

        let mut total: u64 = sizes.values().sum();
        report.bytes_before = total;

        for record in &records {
            if total <= max_total_bytes {
                break;
            }
            if !self.index.remove(record.modality, &record.input_fingerprint)? {
                continue;
            }
            report.over_budget += 1;

            let artifact = record.artifact_reference.as_str();
            if let Some(count) = references.get_mut(artifact) {
                *count -= 1;
                if *count == 0 {
                    total -= sizes.get(artifact).copied().unwrap_or(0);
                }
            }
        }
        report.bytes_after = total;

        tracing::info!(
            expired = report.expired,
            over_budget = report.over_budget,
            bytes_after = report.bytes_after,
            "Cache eviction complete"
        );
        Ok(report)
    }

    /// [`evict`](Self::evict) com os limites configurados.
    pub fn evict_configured(&self) -> MeshCacheResult<EvictionReport> {
        let max_age = Duration::from_secs(self.config.max_age_days.saturating_mul(24 * 60 * 60));
        self.evict(max_age, self.config.max_total_bytes())
    }

    /// Contadores mais estatísticas do índice por modalidade.
    pub fn stats(&self) -> CacheStatistics {
        let modality_stats = |modality: Modality| {
            self.index.stats(modality).unwrap_or_else(|e| {
                tracing::warn!(modality = %modality, error = %e, "Failed to read index stats");
                ModalityStats::default()
            })
        };

        let total_artifact_bytes = match self.index.records_by_recency() {
            Ok(records) => {
                let mut seen = std::collections::HashSet::new();
                records
                    .iter()
                    .filter(|r| seen.insert(r.artifact_reference.as_str()))
                    .map(|r| artifact_size(&r.artifact_reference))
                    .sum()
            }
            Err(_) => 0,
        };

        CacheStatistics {
            enabled: self.config.enabled,
            similarity_threshold: self.config.similarity_threshold,
            exact_hits: self.counters.exact_hits.load(Ordering::Relaxed),
            similar_hits: self.counters.similar_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
            text: modality_stats(Modality::Text),
            image: modality_stats(Modality::Image),
            total_artifact_bytes,
        }
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("config", &self.config)
            .field("extractor", &self.extractor)
            .finish()
    }
}

/// Tamanho de um arquivo de artefato; 0 quando ele não existe mais.
fn artifact_size(path: &str) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
