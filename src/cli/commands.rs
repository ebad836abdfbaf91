//! Implementação dos comandos da CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::cache::{CacheCoordinator, CacheResult};
use crate::evaluation::{QualityEvaluator, QualityReport};
use crate::pipeline::{GenerationOutcome, GenerationPipeline, OutcomeSource};
use crate::types::config::{Config, CONFIG_FILE_NAME};
use crate::types::{EvaluationRecord, EvaluationStatus};
use crate::MeshCacheResult;

use super::InputArgs;

fn print_json<T: Serialize + ?Sized>(value: &T) -> MeshCacheResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_cache(config: &Config) -> MeshCacheResult<CacheCoordinator> {
    CacheCoordinator::open(config.cache.clone())
}

/// Inicializa configuração no diretório especificado.
pub fn init(path: Option<PathBuf>) -> MeshCacheResult<()> {
    let target_dir = path.unwrap_or_else(|| PathBuf::from("."));

    if !target_dir.exists() {
        std::fs::create_dir_all(&target_dir)?;
        tracing::info!(path = %target_dir.display(), "Directory created");
    }

    let config_path = target_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        println!("Configuration already exists at: {}", config_path.display());
        return Ok(());
    }

    let config = Config::default_config();
    std::fs::create_dir_all(target_dir.join(&config.cache.dir))?;
    update_gitignore(&target_dir, &config.cache.dir)?;
    config.save(&config_path)?;

    println!("meshcache initialized");
    println!("Configuration: {}", config_path.display());
    println!("Data directory: {}", config.cache.dir.display());
    Ok(())
}

/// Adiciona o diretório de dados ao `.gitignore`, criando o arquivo se preciso.
fn update_gitignore(target_dir: &Path, data_dir: &Path) -> MeshCacheResult<()> {
    let gitignore_path = target_dir.join(".gitignore");
    let entry = format!("{}/", data_dir.display());
    let comment = "# meshcache - local index, evaluations and models";

    if gitignore_path.exists() {
        let content = std::fs::read_to_string(&gitignore_path)?;
        let bare = entry.trim_end_matches('/');
        if content
            .lines()
            .any(|line| line.trim() == entry || line.trim() == bare)
        {
            tracing::debug!("gitignore already lists the data directory");
            return Ok(());
        }

        let mut new_content = content.trim_end().to_string();
        if !new_content.is_empty() {
            new_content.push_str("\n\n");
        }
        new_content.push_str(comment);
        new_content.push('\n');
        new_content.push_str(&entry);
        new_content.push('\n');
        std::fs::write(&gitignore_path, new_content)?;
    } else {
        std::fs::write(&gitignore_path, format!("{}\n{}\n", comment, entry))?;
    }
    Ok(())
}

/// Passa uma requisição pelo pipeline.
pub async fn generate(
    input: &InputArgs,
    output_dir: Option<PathBuf>,
    config: &Config,
    json: bool,
) -> MeshCacheResult<()> {
    let input = input.to_input()?;
    let mut config = config.clone();
    if let Some(dir) = output_dir {
        config.generation.output_dir = dir;
    }

    let pipeline = GenerationPipeline::from_config(&config);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Generating {}", input.preview()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = pipeline.run(input).await;
    spinner.finish_and_clear();
    let outcome = result?;

    if json {
        return print_json(&outcome);
    }
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &GenerationOutcome) {
    println!("Request: {}", outcome.request_id);
    println!("Artifact: {}", outcome.artifact);
    match &outcome.source {
        OutcomeSource::Cached {
            kind,
            similarity,
            quality_score,
        } => {
            println!(
                "Source: cache ({:?}, similarity {:.3})",
                kind, similarity
            );
            println!("Quality: {:.3}", quality_score);
        }
        OutcomeSource::Generated {
            quality_score,
            generation_secs,
        } => {
            println!("Source: generated in {:.2}s", generation_secs);
            println!("Quality: {:.3}", quality_score);
        }
    }
}

/// Consulta uma entrada sem gerar.
pub fn lookup(input: &InputArgs, config: &Config, json: bool) -> MeshCacheResult<()> {
    let input = input.to_input()?;
    let cache = open_cache(config)?;
    let result = cache.lookup(&input);

    if json {
        let mut value = serde_json::json!({
            "result": result.kind(),
            "artifact": result.artifact_reference(),
            "similarity": result.similarity(),
            "quality_score": result.hit().map(|hit| hit.quality_score()),
        });
        if let CacheResult::Miss(reason) = &result {
            value["reason"] = serde_json::json!(reason.as_str());
        }
        return print_json(&value);
    }

    match &result {
        CacheResult::HitExact(hit) => {
            println!(
                "exact hit: {} (quality {:.3})",
                hit.artifact_reference(),
                hit.quality_score()
            );
        }
        CacheResult::HitSimilar { hit, similarity } => {
            println!(
                "similar hit: {} (similarity {:.3}, quality {:.3})",
                hit.artifact_reference(),
                similarity,
                hit.quality_score()
            );
        }
        CacheResult::Miss(reason) => println!("miss ({})", reason.as_str()),
    }
    Ok(())
}

/// Registra um artefato existente. Sem `--quality` o artefato é avaliado
/// antes.
pub fn store(
    input: &InputArgs,
    artifact: &Path,
    quality: Option<f64>,
    cost: f64,
    config: &Config,
    json: bool,
) -> MeshCacheResult<()> {
    let input = input.to_input()?;
    let quality = match quality {
        Some(quality) => quality.clamp(0.0, 1.0),
        None => {
            QualityEvaluator::from_config(&config.evaluation)
                .evaluate(artifact, &input)
                .scores
                .overall
        }
    };

    let cache = open_cache(config)?;
    let stored = cache.try_store(&input, &artifact.display().to_string(), quality, cost)?;

    if json {
        return print_json(&serde_json::json!({
            "stored": stored.is_some(),
            "fingerprint": stored.as_ref().map(|r| r.input_fingerprint.as_str()),
            "quality_score": quality,
        }));
    }
    match stored {
        Some(record) => println!(
            "Stored {} (quality {:.3}, fingerprint {})",
            record.artifact_reference,
            record.quality_score,
            &record.input_fingerprint[..12.min(record.input_fingerprint.len())]
        ),
        None => println!("Cache is disabled, nothing stored"),
    }
    Ok(())
}

/// Pontua um arquivo de modelo.
pub fn evaluate(
    artifact: &Path,
    input: &InputArgs,
    request_id: Option<&str>,
    config: &Config,
    json: bool,
) -> MeshCacheResult<()> {
    let input = input.to_input()?;
    let evaluator = QualityEvaluator::from_config(&config.evaluation);
    let record = evaluator.evaluate_request(artifact, &input, request_id);

    if json {
        return print_json(&record);
    }
    print_evaluation(&record);
    Ok(())
}

fn print_evaluation(record: &EvaluationRecord) {
    if record.status == EvaluationStatus::Unloadable {
        println!("Model: {} (unloadable)", record.model_path);
        println!("Overall: {:.3}", record.scores.overall);
        return;
    }

    println!("Model: {}", record.model_path);
    println!(
        "Vertices: {}  Faces: {}",
        record.vertex_count, record.face_count
    );
    println!("Geometry:    {:.3}", record.scores.geometry);
    println!("Texture:     {:.3}", record.scores.texture);
    if record.fidelity_estimated {
        println!("Fidelity:    {:.3} (estimated)", record.scores.fidelity);
    } else {
        println!("Fidelity:    {:.3}", record.scores.fidelity);
    }
    println!("Performance: {:.3}", record.scores.performance);
    println!("Overall:     {:.3}", record.scores.overall);
}

/// Registra a nota de um usuário.
pub fn feedback(
    request_id: &str,
    rating: i64,
    text: &str,
    categories: &[String],
    config: &Config,
) -> MeshCacheResult<()> {
    let evaluator = QualityEvaluator::from_config(&config.evaluation);
    evaluator.record_feedback(request_id, rating, text, categories)?;
    println!("Feedback recorded for {}", request_id);
    Ok(())
}

/// Mostra estatísticas do cache e da avaliação.
pub fn stats(config: &Config, json: bool) -> MeshCacheResult<()> {
    let cache = open_cache(config)?.stats();
    let evaluation = QualityEvaluator::from_config(&config.evaluation)
        .statistics()
        .inspect_err(|e| tracing::warn!(error = %e, "Evaluation statistics unavailable"))
        .ok();

    if json {
        return print_json(&serde_json::json!({
            "cache": cache,
            "evaluation": evaluation,
        }));
    }

    println!("Cache");
    println!("  enabled:              {}", cache.enabled);
    println!("  similarity threshold: {:.2}", cache.similarity_threshold);
    println!(
        "  text entries:         {} (avg access {:.1})",
        cache.text.entries, cache.text.avg_access_count
    );
    println!(
        "  image entries:        {} (avg access {:.1})",
        cache.image.entries, cache.image.avg_access_count
    );
    println!("  artifact bytes:       {}", cache.total_artifact_bytes);

    if let Some(stats) = evaluation {
        println!();
        println!("Evaluation");
        println!("  evaluations:   {}", stats.total_evaluations);
        println!("  unloadable:    {}", stats.unloadable_evaluations);
        println!("  avg overall:   {:.3}", stats.avg_overall_score);
        println!("  feedback:      {}", stats.total_user_feedback);
        if let Some(rating) = stats.avg_user_rating {
            println!("  avg rating:    {:.2}", rating);
        }
    }
    Ok(())
}

/// Mostra o relatório de qualidade.
pub fn report(config: &Config, json: bool) -> MeshCacheResult<()> {
    let report: QualityReport = QualityEvaluator::from_config(&config.evaluation).report()?;

    if json {
        return print_json(&report);
    }

    println!("Quality report ({})", report.generated_at.format("%Y-%m-%d %H:%M UTC"));
    println!(
        "Level: {} (average {:.3})",
        report.quality_level, report.overall_score
    );
    println!("Trend: {}", report.quality_trend.as_str());
    println!("Evaluations: {}", report.statistics.total_evaluations);
    if report.recommendations.is_empty() {
        println!("No recommendations");
    } else {
        println!("Recommendations:");
        for recommendation in &report.recommendations {
            println!("  - {}", recommendation);
        }
    }
    Ok(())
}

/// Remove registros ociosos e depois aplica o orçamento de tamanho.
pub fn evict(
    max_age_days: Option<u64>,
    max_size_gb: Option<f64>,
    config: &Config,
    json: bool,
) -> MeshCacheResult<()> {
    let mut cache_config = config.cache.clone();
    if let Some(days) = max_age_days {
        cache_config.max_age_days = days;
    }
    if let Some(size) = max_size_gb {
        cache_config.max_size_gb = size;
    }

    let cache = open_cache(&Config {
        cache: cache_config,
        ..config.clone()
    })?;
    let report = cache.evict_configured()?;

    if json {
        return print_json(&report);
    }
    println!(
        "Evicted {} records ({} idle, {} over budget)",
        report.removed(),
        report.expired,
        report.over_budget
    );
    println!(
        "Artifact bytes: {} -> {}",
        report.bytes_before, report.bytes_after
    );
    Ok(())
}

/// Mostra versão.
pub fn version() {
    println!("meshcache {}", env!("CARGO_PKG_VERSION"));
}
