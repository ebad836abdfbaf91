//! Avaliador de qualidade: carrega, pontua, persiste.

use std::path::Path;
use std::time::Instant;

use chrono::Utc;

use crate::types::config::{EvaluationConfig, QualityWeights};
use crate::types::{EvaluationRecord, EvaluationStatus, Input, ScoreBreakdown};
use crate::{MeshCacheError, MeshCacheResult};

use super::loader::MeshLoader;
use super::mesh::Mesh;
use super::metrics::{fidelity_score, geometry_score, performance_score, texture_score, Fidelity};
use super::report::QualityReport;
use super::store::{EvaluationStatistics, EvaluationStore};

/// Sub-nota usada quando uma métrica falha.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Pontua artefatos de malha e registra toda avaliação.
pub struct QualityEvaluator {
    weights: QualityWeights,
    store: Option<EvaluationStore>,
}

impl QualityEvaluator {
    /// Avaliador sem persistência.
    pub fn new(weights: QualityWeights) -> Self {
        Self {
            weights,
            store: None,
        }
    }

    pub fn with_store(weights: QualityWeights, store: EvaluationStore) -> Self {
        Self {
            weights,
            store: Some(store),
        }
    }

    /// Monta um avaliador a partir da configuração. Um armazenamento que não
    /// abre vai para o log e a avaliação roda sem persistência.
    pub fn from_config(config: &EvaluationConfig) -> Self {
        if !config.persist {
            return Self::new(config.weights);
        }
        match EvaluationStore::open(&config.db_path) {
            Ok(store) => Self::with_store(config.weights, store),
            Err(e) => {
                tracing::warn!(
                    path = %config.db_path.display(),
                    error = %e,
                    "Evaluation store unavailable, results will not be persisted"
                );
                Self::new(config.weights)
            }
        }
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    pub fn store(&self) -> Option<&EvaluationStore> {
        self.store.as_ref()
    }

    /// Pontua `artifact` para `input` e persiste o resultado.
    ///
    /// Sempre retorna um registro: um artefato não carregável recebe 0.0 com status
    /// [`EvaluationStatus::Unloadable`].
    pub fn evaluate(&self, artifact: &Path, input: &Input) -> EvaluationRecord {
        self.evaluate_request(artifact, input, None)
    }

    /// [`evaluate`](Self::evaluate) marcado com a requisição de origem.
    pub fn evaluate_request(
        &self,
        artifact: &Path,
        input: &Input,
        request_id: Option<&str>,
    ) -> EvaluationRecord {
        let started = Instant::now();

        let mut record = EvaluationRecord {
            id: None,
            request_id: request_id.map(str::to_string),
            model_path: artifact.display().to_string(),
            input_data: input.label(),
            input_type: input.modality(),
            scores: ScoreBreakdown::zero(),
            vertex_count: 0,
            face_count: 0,
            status: EvaluationStatus::Unloadable,
            fidelity_estimated: false,
            evaluation_ms: 0,
            created_at: Utc::now(),
        };

        match MeshLoader::load(artifact) {
            Ok(mesh) => {
                let (scores, fidelity_estimated) = self.score(&mesh, artifact, input);
                record.scores = scores;
                record.fidelity_estimated = fidelity_estimated;
                record.vertex_count = mesh.vertex_count() as u64;
                record.face_count = mesh.face_count() as u64;
                record.status = EvaluationStatus::Scored;
            }
            Err(e) => {
                tracing::warn!(
                    path = %artifact.display(),
                    error = %e,
                    "Artifact unloadable, scoring 0.0"
                );
            }
        }
        record.evaluation_ms = started.elapsed().as_millis() as u64;

        if record.status == EvaluationStatus::Scored {
            tracing::info!(
                path = %artifact.display(),
                overall = %format!("{:.3}", record.scores.overall),
                geometry = %format!("{:.2}", record.scores.geometry),
                texture = %format!("{:.2}", record.scores.texture),
                fidelity = %format!("{:.2}", record.scores.fidelity),
                performance = %format!("{:.2}", record.scores.performance),
                "Model evaluation completed"
            );
        }

        self.persist(&mut record);
        record
    }

    /// Roda as quatro métricas sobre uma malha carregada. Uma métrica que falha
    /// recebe [`NEUTRAL_SCORE`] e não afeta as outras.
    pub fn score(&self, mesh: &Mesh, path: &Path, input: &Input) -> (ScoreBreakdown, bool) {
        let geometry = neutral_on_failure(geometry_score(mesh));
        let texture = neutral_on_failure(texture_score(mesh, path));
        let fidelity = match fidelity_score(mesh, input) {
            Ok(fidelity) => fidelity,
            Err(e) => {
                log_metric_failure(&e);
                Fidelity {
                    score: NEUTRAL_SCORE,
                    estimated: false,
                }
            }
        };
        let performance = neutral_on_failure(performance_score(mesh));

        let overall = self.overall(geometry, texture, fidelity.score, performance);
        (
            ScoreBreakdown {
                geometry,
                texture,
                fidelity: fidelity.score,
                performance,
                overall,
            },
            fidelity.estimated,
        )
    }

    /// Soma ponderada, limitada a [0, 1].
    pub fn overall(&self, geometry: f64, texture: f64, fidelity: f64, performance: f64) -> f64 {
        let w = &self.weights;
        let sum = geometry * w.geometry
            + texture * w.texture
            + fidelity * w.fidelity
            + performance * w.performance;
        sum.clamp(0.0, 1.0)
    }

    fn persist(&self, record: &mut EvaluationRecord) {
        let Some(store) = &self.store else {
            return;
        };
        match store.insert(record) {
            Ok(id) => record.id = Some(id),
            Err(e) => tracing::warn!(error = %e, "Failed to persist evaluation"),
        }
    }

    /// Grava a nota de um usuário. Falha com notas fora de 1-5 ou quando não há
    /// armazenamento configurado.
    pub fn record_feedback(
        &self,
        request_id: &str,
        rating: i64,
        text: &str,
        categories: &[String],
    ) -> MeshCacheResult<()> {
        let store = self.require_store()?;
        store.record_feedback(request_id, rating, text, categories)?;
        tracing::info!(request_id = %request_id, rating, "User feedback recorded");
        Ok(())
    }

    pub fn statistics(&self) -> MeshCacheResult<EvaluationStatistics> {
        self.require_store()?.statistics()
    }

    pub fn report(&self) -> MeshCacheResult<QualityReport> {
        Ok(QualityReport::from_statistics(self.statistics()?))
    }

    fn require_store(&self) -> MeshCacheResult<&EvaluationStore> {
        self.store.as_ref().ok_or_else(|| {
            MeshCacheError::StorageUnavailable("evaluation persistence is disabled".to_string())
        })
    }
}

fn neutral_on_failure(result: MeshCacheResult<f64>) -> f64 {
    result.unwrap_or_else(|e| {
        log_metric_failure(&e);
        NEUTRAL_SCORE
    })
}

fn log_metric_failure(error: &MeshCacheError) {
    tracing::warn!(error = %error, "Metric failed, using neutral score");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::mesh::tests::cube;
    use tempfile::TempDir;

    const CUBE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 0 0 1\nv 1 0 1\nv 1 1 1\nv 0 1 1\n\
                            f 1 4 3 2\nf 5 6 7 8\nf 1 2 6 5\nf 3 4 8 7\nf 2 3 7 6\nf 1 5 8 4\n";

    #[test]
    fn test_cube_scores() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cube.obj");
        std::fs::write(&path, CUBE_OBJ).unwrap();

        let evaluator = QualityEvaluator::new(QualityWeights::default());
        let record = evaluator.evaluate(&path, &Input::text("a red cube"));

        assert_eq!(record.status, EvaluationStatus::Scored);
        assert_eq!(record.vertex_count, 8);
        assert_eq!(record.face_count, 6);
        assert!((record.scores.geometry - 0.6).abs() < 1e-9);
        assert!((record.scores.texture - 0.5).abs() < 1e-9);
        assert!((record.scores.fidelity - 1.0).abs() < 1e-9);
        assert!((record.scores.performance - 1.0).abs() < 1e-9);

        let expected = 0.6 * 0.3 + 0.5 * 0.2 + 1.0 * 0.3 + 1.0 * 0.2;
        assert!((record.scores.overall - expected).abs() < 1e-9);
        assert!(record.id.is_none());
    }

    #[test]
    fn test_missing_artifact_scores_zero() {
        let evaluator = QualityEvaluator::new(QualityWeights::default());
        let record = evaluator.evaluate(Path::new("/no/such/model.obj"), &Input::text("x"));
        assert_eq!(record.status, EvaluationStatus::Unloadable);
        assert_eq!(record.scores, ScoreBreakdown::zero());
    }

    #[test]
    fn test_failing_metric_is_neutral() {
        let mut mesh = cube();
        mesh.vertices[0] = [f64::INFINITY, 0.0, 0.0];

        let evaluator = QualityEvaluator::new(QualityWeights::default());
        let (scores, _) = evaluator.score(&mesh, Path::new("x.obj"), &Input::text("a chair"));
        assert_eq!(scores.geometry, NEUTRAL_SCORE);
        assert_eq!(scores.fidelity, NEUTRAL_SCORE);
        assert!((scores.texture - 0.5).abs() < 1e-9);
        assert!(scores.overall >= 0.0 && scores.overall <= 1.0);
    }

    #[test]
    fn test_overall_respects_weights_and_clamps() {
        let weights = QualityWeights {
            geometry: 1.0,
            texture: 1.0,
            fidelity: 0.0,
            performance: 0.0,
        };
        let evaluator = QualityEvaluator::new(weights);
        assert_eq!(evaluator.overall(0.9, 0.9, 0.0, 0.0), 1.0);
        assert!((evaluator.overall(0.3, 0.2, 1.0, 1.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_persists_unloadable_and_scored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cube.obj");
        std::fs::write(&path, CUBE_OBJ).unwrap();

        let store = EvaluationStore::open_in_memory().unwrap();
        let evaluator = QualityEvaluator::with_store(QualityWeights::default(), store);

        let scored = evaluator.evaluate_request(&path, &Input::text("a cube"), Some("r1"));
        let missing =
            evaluator.evaluate_request(&dir.path().join("gone.obj"), &Input::text("a cube"), Some("r1"));
        assert!(scored.id.is_some());
        assert!(missing.id.is_some());

        let stats = evaluator.statistics().unwrap();
        assert_eq!(stats.total_evaluations, 2);
        assert_eq!(stats.unloadable_evaluations, 1);
    }

    #[test]
    fn test_feedback_without_store_fails() {
        let evaluator = QualityEvaluator::new(QualityWeights::default());
        assert!(matches!(
            evaluator.record_feedback("r1", 4, "", &[]),
            Err(MeshCacheError::StorageUnavailable(_))
        ));
    }
}
