//! Testes de integração do pipeline de geração.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshcache::cache::CacheCoordinator;
use meshcache::evaluation::QualityEvaluator;
use meshcache::pipeline::{
    CacheKind, GeneratedModel, GenerationPipeline, ModelGenerator, OutcomeSource,
    ProceduralGenerator,
};
use meshcache::types::config::{CacheConfig, Config, GenerationConfig};
use meshcache::{Input, MeshCacheError};
use tempfile::TempDir;

fn config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.cache = CacheConfig::default()
        .with_dir(dir.path().join("cache"))
        .with_similarity_threshold(0.8);
    config.evaluation.db_path = dir.path().join("evaluation.db");
    config.generation.output_dir = dir.path().join("models");
    config
}

/// Conta chamadas e delega para o backend procedural.
struct CountingGenerator {
    calls: AtomicUsize,
    inner: ProceduralGenerator,
}

#[async_trait]
impl ModelGenerator for CountingGenerator {
    fn name(&self) -> &str {
        "counting"
    }

    async fn generate(&self, input: &Input, output_dir: &Path) -> anyhow::Result<GeneratedModel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate(input, output_dir).await
    }
}

struct FailingGenerator;

#[async_trait]
impl ModelGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _input: &Input, _output_dir: &Path) -> anyhow::Result<GeneratedModel> {
        anyhow::bail!("backend offline")
    }
}

struct SlowGenerator;

#[async_trait]
impl ModelGenerator for SlowGenerator {
    fn name(&self) -> &str {
        "slow"
    }

    async fn generate(&self, input: &Input, output_dir: &Path) -> anyhow::Result<GeneratedModel> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        ProceduralGenerator::new().generate(input, output_dir).await
    }
}

fn pipeline_with(
    dir: &TempDir,
    generator: Arc<dyn ModelGenerator>,
    generation: GenerationConfig,
) -> GenerationPipeline {
    let config = config(dir);
    GenerationPipeline::new(
        CacheCoordinator::open(config.cache.clone()).unwrap(),
        QualityEvaluator::from_config(&config.evaluation),
        generator,
        generation,
    )
}

#[tokio::test]
async fn test_generate_then_serve_from_cache() {
    let dir = TempDir::new().unwrap();
    let generator = Arc::new(CountingGenerator {
        calls: AtomicUsize::new(0),
        inner: ProceduralGenerator::new(),
    });
    let pipeline = pipeline_with(&dir, generator.clone(), config(&dir).generation);

    let first = pipeline.run(Input::text("a red cube")).await.unwrap();
    match first.source {
        OutcomeSource::Generated { quality_score, .. } => {
            assert!(quality_score > 0.0 && quality_score <= 1.0);
        }
        ref other => panic!("expected generation, got {:?}", other),
    }
    assert!(Path::new(&first.artifact).exists());
    let evaluation = first.evaluation.as_ref().unwrap();
    assert_eq!(evaluation.request_id.as_deref(), Some(first.request_id.as_str()));

    let exact = pipeline.run(Input::text("a red cube")).await.unwrap();
    assert_eq!(exact.artifact, first.artifact);
    match exact.source {
        OutcomeSource::Cached {
            kind, similarity, ..
        } => {
            assert_eq!(kind, CacheKind::Exact);
            assert_eq!(similarity, 1.0);
        }
        ref other => panic!("expected exact hit, got {:?}", other),
    }

    let similar = pipeline.run(Input::text("a small red cube")).await.unwrap();
    assert_eq!(similar.artifact, first.artifact);
    assert!(matches!(
        similar.source,
        OutcomeSource::Cached {
            kind: CacheKind::Similar,
            ..
        }
    ));
    assert!(similar.evaluation.is_none());

    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let stats = pipeline.cache().stats();
    assert_eq!(stats.exact_hits, 1);
    assert_eq!(stats.similar_hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_concurrent_requests_have_distinct_ids() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline_with(
        &dir,
        Arc::new(ProceduralGenerator::new()),
        config(&dir).generation,
    );

    let handles: Vec<_> = ["a sphere", "a copper pipe", "a pyramid", "a dragon"]
        .into_iter()
        .map(|prompt| pipeline.submit(Input::text(prompt)))
        .collect();

    let mut ids: Vec<String> = handles.iter().map(|h| h.request_id().to_string()).collect();
    for handle in handles {
        let outcome = handle.wait().await.unwrap();
        assert!(!outcome.is_cached());
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(pipeline.cache().stats().text.entries, 4);
}

#[tokio::test]
async fn test_generator_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline_with(&dir, Arc::new(FailingGenerator), config(&dir).generation);

    let err = pipeline.run(Input::text("a chair")).await.unwrap_err();
    match err {
        MeshCacheError::Generation(message) => assert!(message.contains("backend offline")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(pipeline.cache().stats().text.entries, 0);
}

#[tokio::test]
async fn test_generation_timeout() {
    let dir = TempDir::new().unwrap();
    let generation = GenerationConfig {
        timeout_secs: 1,
        ..config(&dir).generation
    };
    let pipeline = pipeline_with(&dir, Arc::new(SlowGenerator), generation);

    let err = pipeline.run(Input::text("a chair")).await.unwrap_err();
    assert!(matches!(err, MeshCacheError::Generation(ref m) if m.contains("timed out")));
}

#[tokio::test]
async fn test_feedback_flows_into_report() {
    let dir = TempDir::new().unwrap();
    let pipeline = GenerationPipeline::from_config(&config(&dir));

    let outcome = pipeline.run(Input::text("a tall tower")).await.unwrap();
    pipeline
        .record_user_feedback(&outcome.request_id, 5)
        .unwrap();
    assert!(pipeline.record_user_feedback(&outcome.request_id, 9).is_err());

    let report = pipeline.report().unwrap();
    assert_eq!(report.statistics.total_evaluations, 1);
    assert_eq!(report.statistics.avg_user_rating, Some(5.0));
}
