//! Pipeline de requisições: consulta ao cache, geração, avaliação, gravação.
//!
//! Cada [`GenerationPipeline::submit`] dispara uma task e retorna um
//! [`GenerationHandle`]. A task roda o cache e o avaliador no pool
//! bloqueante e aguarda o gerador com timeout, então nenhum lock fica
//! preso enquanto um modelo é produzido.

mod generator;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

pub use generator::{to_obj, GeneratedModel, ModelGenerator, ProceduralGenerator, Shape};

use crate::cache::{CacheCoordinator, CacheResult};
use crate::evaluation::{QualityEvaluator, QualityReport};
use crate::types::config::{Config, GenerationConfig};
use crate::types::{EvaluationRecord, Input};
use crate::{MeshCacheError, MeshCacheResult};

/// Qual fase do cache atendeu a requisição.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Exact,
    Similar,
}

/// De onde veio um artefato.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeSource {
    Cached {
        kind: CacheKind,
        similarity: f32,
        quality_score: f64,
    },
    Generated {
        quality_score: f64,
        generation_secs: f64,
    },
}

/// Resultado de uma requisição.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub request_id: String,
    pub artifact: String,
    pub source: OutcomeSource,

    /// Presente em artefatos gerados.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationRecord>,
}

impl GenerationOutcome {
    pub fn is_cached(&self) -> bool {
        matches!(self.source, OutcomeSource::Cached { .. })
    }

    pub fn quality_score(&self) -> f64 {
        match self.source {
            OutcomeSource::Cached { quality_score, .. }
            | OutcomeSource::Generated { quality_score, .. } => quality_score,
        }
    }
}

/// Handle de uma requisição submetida.
pub struct GenerationHandle {
    request_id: String,
    task: JoinHandle<MeshCacheResult<GenerationOutcome>>,
}

impl GenerationHandle {
    /// Identificador usado nos registros de avaliação e no feedback.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Aguarda a requisição terminar.
    pub async fn wait(self) -> MeshCacheResult<GenerationOutcome> {
        self.task
            .await
            .map_err(|e| MeshCacheError::Generation(format!("request task failed: {}", e)))?
    }
}

struct Inner {
    cache: CacheCoordinator,
    evaluator: QualityEvaluator,
    generator: Arc<dyn ModelGenerator>,
    config: GenerationConfig,
}

/// Orquestra cache, gerador e avaliador em cada requisição.
#[derive(Clone)]
pub struct GenerationPipeline {
    inner: Arc<Inner>,
}

impl GenerationPipeline {
    pub fn new(
        cache: CacheCoordinator,
        evaluator: QualityEvaluator,
        generator: Arc<dyn ModelGenerator>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                evaluator,
                generator,
                config,
            }),
        }
    }

    /// Monta o pipeline a partir da configuração com o backend procedural.
    ///
    /// Um índice que não abre deixa o cache como pass-through.
    pub fn from_config(config: &Config) -> Self {
        let cache = CacheCoordinator::open(config.cache.clone()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Cache index unavailable, caching disabled");
            CacheCoordinator::pass_through(config.cache.clone())
        });
        let evaluator = QualityEvaluator::from_config(&config.evaluation);

        Self::new(
            cache,
            evaluator,
            Arc::new(ProceduralGenerator::new()),
            config.generation.clone(),
        )
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.inner.cache
    }

    pub fn evaluator(&self) -> &QualityEvaluator {
        &self.inner.evaluator
    }

    /// Inicia uma requisição e retorna na hora.
    pub fn submit(&self, input: Input) -> GenerationHandle {
        let request_id = uuid::Uuid::new_v4().to_string();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(run_request(inner, request_id.clone(), input));

        GenerationHandle { request_id, task }
    }

    /// Submete e aguarda.
    pub async fn run(&self, input: Input) -> MeshCacheResult<GenerationOutcome> {
        self.submit(input).wait().await
    }

    /// Grava uma nota de 1-5 para uma requisição concluída.
    pub fn record_user_feedback(&self, request_id: &str, rating: i64) -> MeshCacheResult<()> {
        self.record_user_feedback_with(request_id, rating, "", &[])
    }

    pub fn record_user_feedback_with(
        &self,
        request_id: &str,
        rating: i64,
        text: &str,
        categories: &[String],
    ) -> MeshCacheResult<()> {
        self.inner
            .evaluator
            .record_feedback(request_id, rating, text, categories)
            .inspect_err(|e| {
                tracing::warn!(request_id = %request_id, error = %e, "Feedback not recorded");
            })
    }

    pub fn report(&self) -> MeshCacheResult<QualityReport> {
        self.inner.evaluator.report()
    }
}

async fn run_request(
    inner: Arc<Inner>,
    request_id: String,
    input: Input,
) -> MeshCacheResult<GenerationOutcome> {
    let span_id = request_id.clone();
    tracing::info!(request_id = %span_id, input = %input.preview(), "Request started");

    // A consulta roda no pool bloqueante: pode ir ao SQLite e decodificar imagens.
    let (input, lookup) = {
        let inner = Arc::clone(&inner);
        tokio::task::spawn_blocking(move || {
            let result = inner.cache.lookup(&input);
            (input, result)
        })
        .await
        .map_err(|e| MeshCacheError::Generation(format!("lookup task failed: {}", e)))?
    };

    let cached = match &lookup {
        CacheResult::HitExact(hit) => Some((CacheKind::Exact, 1.0, hit)),
        CacheResult::HitSimilar { hit, similarity } => Some((CacheKind::Similar, *similarity, hit)),
        CacheResult::Miss(_) => None,
    };
    if let Some((kind, similarity, hit)) = cached {
        return Ok(GenerationOutcome {
            request_id,
            artifact: hit.artifact_reference().to_string(),
            source: OutcomeSource::Cached {
                kind,
                similarity,
                quality_score: hit.quality_score(),
            },
            evaluation: None,
        });
    }

    let started = Instant::now();
    let timeout = Duration::from_secs(inner.config.timeout_secs);
    let model = match tokio::time::timeout(
        timeout,
        inner.generator.generate(&input, &inner.config.output_dir),
    )
    .await
    {
        Ok(Ok(model)) => model,
        Ok(Err(e)) => {
            tracing::error!(request_id = %span_id, generator = inner.generator.name(), error = %e, "Generation failed");
            return Err(MeshCacheError::Generation(format!("{:#}", e)));
        }
        Err(_) => {
            tracing::error!(request_id = %span_id, timeout_secs = inner.config.timeout_secs, "Generation timed out");
            return Err(MeshCacheError::Generation(format!(
                "timed out after {}s",
                inner.config.timeout_secs
            )));
        }
    };
    let generation_secs = started.elapsed().as_secs_f64();

    let artifact = model.path.display().to_string();
    let evaluation = {
        let inner = Arc::clone(&inner);
        let request_id = request_id.clone();
        let artifact = artifact.clone();
        tokio::task::spawn_blocking(move || {
            let record = inner
                .evaluator
                .evaluate_request(&model.path, &input, Some(&request_id));
            inner
                .cache
                .store(&input, &artifact, record.scores.overall, generation_secs);
            record
        })
        .await
        .map_err(|e| MeshCacheError::Generation(format!("evaluation task failed: {}", e)))?
    };

    tracing::info!(
        request_id = %span_id,
        artifact = %artifact,
        quality = %format!("{:.3}", evaluation.scores.overall),
        generation_secs = %format!("{:.2}", generation_secs),
        "Request completed"
    );

    Ok(GenerationOutcome {
        request_id,
        artifact,
        source: OutcomeSource::Generated {
            quality_score: evaluation.scores.overall,
            generation_secs,
        },
        evaluation: Some(evaluation),
    })
}
