//! Relatório de qualidade derivado das estatísticas de avaliação.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::{DailyTrend, EvaluationStatistics};

/// Médias diárias precisam variar mais que isso para contar como tendência.
const TREND_MARGIN: f64 = 0.05;

/// Rótulo categórico para uma nota geral média.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            QualityLevel::Excellent
        } else if score >= 0.7 {
            QualityLevel::Good
        } else if score >= 0.6 {
            QualityLevel::Fair
        } else {
            QualityLevel::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Excellent => "Excellent",
            QualityLevel::Good => "Good",
            QualityLevel::Fair => "Fair",
            QualityLevel::Poor => "Poor",
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direção da média diária dentro da janela de tendência.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTrend {
    Improving,
    Declining,
    Stable,
}

impl QualityTrend {
    /// Compara o primeiro e o último dia. Menos de dois dias é estável.
    pub fn from_daily(trends: &[DailyTrend]) -> Self {
        match (trends.first(), trends.last()) {
            (Some(first), Some(last)) if trends.len() >= 2 => {
                let delta = last.avg_score - first.avg_score;
                if delta > TREND_MARGIN {
                    QualityTrend::Improving
                } else if delta < -TREND_MARGIN {
                    QualityTrend::Declining
                } else {
                    QualityTrend::Stable
                }
            }
            _ => QualityTrend::Stable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTrend::Improving => "improving",
            QualityTrend::Declining => "declining",
            QualityTrend::Stable => "stable",
        }
    }
}

pub const GEOMETRY_RECOMMENDATION: &str = "Improve mesh topology and reduce geometric artifacts";
pub const TEXTURE_RECOMMENDATION: &str = "Enhance texture quality and UV mapping";
pub const FIDELITY_RECOMMENDATION: &str = "Improve input-to-output fidelity matching";
pub const PERFORMANCE_RECOMMENDATION: &str = "Optimize model complexity for better performance";
pub const USER_RECOMMENDATION: &str = "Focus on user experience improvements";

/// Resumo da qualidade das avaliações.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub quality_level: QualityLevel,
    pub overall_score: f64,
    pub quality_trend: QualityTrend,
    pub recommendations: Vec<String>,
    pub statistics: EvaluationStatistics,
}

impl QualityReport {
    pub fn from_statistics(statistics: EvaluationStatistics) -> Self {
        let mut recommendations = Vec::new();

        // Conselhos por sub-nota exigem ao menos uma avaliação pontuada.
        if statistics.scored_evaluations() > 0 {
            let checks = [
                (statistics.avg_geometry_score, 0.7, GEOMETRY_RECOMMENDATION),
                (statistics.avg_texture_score, 0.6, TEXTURE_RECOMMENDATION),
                (statistics.avg_fidelity_score, 0.7, FIDELITY_RECOMMENDATION),
                (statistics.avg_performance_score, 0.7, PERFORMANCE_RECOMMENDATION),
            ];
            recommendations.extend(
                checks
                    .iter()
                    .filter(|(avg, threshold, _)| avg < threshold)
                    .map(|(_, _, text)| text.to_string()),
            );
        }

        if statistics.avg_user_rating.is_some_and(|rating| rating < 3.5) {
            recommendations.push(USER_RECOMMENDATION.to_string());
        }

        Self {
            generated_at: Utc::now(),
            quality_level: QualityLevel::from_score(statistics.avg_overall_score),
            overall_score: statistics.avg_overall_score,
            quality_trend: QualityTrend::from_daily(&statistics.daily_trends),
            recommendations,
            statistics,
        }
    }
}
