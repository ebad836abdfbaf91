//! Registros persistentes: entradas do cache e resultados de avaliação.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::input::Modality;

/// Uma geração em cache, indexada pela impressão digital da entrada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Sequência de inserção; inserções posteriores recebem ids maiores.
    pub id: i64,
    pub modality: Modality,
    pub input_fingerprint: String,
    /// Prompt de texto ou origem da imagem, apenas para relatórios.
    pub input_label: String,
    pub feature_vector: Vec<f32>,
    pub artifact_reference: String,
    pub quality_score: f64,
    pub generation_cost: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
}

/// Valores para inserir ou substituir um registro do cache.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCacheRecord {
    pub input_fingerprint: String,
    pub input_label: String,
    pub feature_vector: Vec<f32>,
    pub artifact_reference: String,
    pub quality_score: f64,
    pub generation_cost: f64,
}

/// Resultado de uma busca pelo vizinho mais próximo.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarMatch {
    pub record: CacheRecord,
    pub similarity: f32,
}

/// As quatro sub-notas e a nota geral ponderada, todas em [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub geometry: f64,
    pub texture: f64,
    pub fidelity: f64,
    pub performance: f64,
    pub overall: f64,
}

impl ScoreBreakdown {
    /// Tudo zero, usado quando o artefato não pôde ser carregado.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Classe do resultado de uma avaliação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// A malha carregou e todas as métricas rodaram (talvez com fallback neutro).
    Scored,
    /// O artefato estava ausente ou inválido; todas as notas são zero.
    Unloadable,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Scored => "scored",
            EvaluationStatus::Unloadable => "unloadable",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "unloadable" => EvaluationStatus::Unloadable,
            _ => EvaluationStatus::Scored,
        }
    }
}

/// Uma chamada de avaliação. Nunca é alterada depois de gravada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Atribuído pelo armazenamento; `None` até ser persistido.
    pub id: Option<i64>,
    pub request_id: Option<String>,
    pub model_path: String,
    pub input_data: String,
    pub input_type: Modality,
    pub scores: ScoreBreakdown,
    pub vertex_count: u64,
    pub face_count: u64,
    pub status: EvaluationStatus,
    /// A fidelidade é um valor fixo provisório, não uma medida.
    pub fidelity_estimated: bool,
    pub evaluation_ms: u64,
    pub created_at: DateTime<Utc>,
}
