//! Avaliação de qualidade de malhas com múltiplas métricas.
//!
//! [`QualityEvaluator`] carrega um artefato com [`MeshLoader`] e calcula
//! quatro sub-notas independentes:
//!
//! | Métrica     | Início | Sinais                                              |
//! |-------------|--------|-----------------------------------------------------|
//! | geometry    | 1.0    | fechada, auto-interseção, razão face/vértice, faces degeneradas, densidade |
//! | texture     | 0.5    | UVs, cores por vértice, material, `.mtl` irmão      |
//! | fidelity    | 0.7    | vocabulário do prompt vs. tamanho, proporções; imagens: provisório |
//! | performance | 1.0    | limites de vértices/faces, faixa de complexidade, volume fechado |
//!
//! A nota geral é a soma ponderada delas. Avaliações e feedback dos usuários
//! ficam em um [`EvaluationStore`], a partir do qual os [`QualityReport`]s
//! são montados.

mod evaluator;
mod loader;
mod mesh;
mod metrics;
mod report;
mod store;

pub use evaluator::{QualityEvaluator, NEUTRAL_SCORE};
pub use loader::{parse_obj, MeshLoader};
pub use mesh::{Bounds, Mesh, DEGENERATE_AREA};
pub use metrics::{fidelity_score, geometry_score, performance_score, texture_score, Fidelity};
pub use report::{QualityLevel, QualityReport, QualityTrend};
pub use store::{DailyTrend, EvaluationStatistics, EvaluationStore, TREND_DAYS};
