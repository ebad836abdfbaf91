//! Tipos compartilhados: configuração, erros, entradas e registros.

pub mod config;
pub mod errors;
pub mod input;
pub mod records;

pub use input::{ImageInput, Input, Modality};
pub use records::{
    CacheRecord, EvaluationRecord, EvaluationStatus, NewCacheRecord, ScoreBreakdown, SimilarMatch,
};

use chrono::{DateTime, SecondsFormat, Utc};

/// RFC 3339 de largura fixa (microssegundos, `Z`), então a ordem das strings é a
/// ordem temporal nas comparações SQL.
pub(crate) fn db_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Valores inválidos viram o menor instante representável, então uma linha
/// corrompida fica como a menos recente e cai na próxima remoção por idade.
pub(crate) fn parse_db_timestamp(value: &str) -> DateTime<Utc> {
    value.parse().unwrap_or_else(|e| {
        tracing::warn!(value, error = %e, "Unparsable timestamp in database");
        DateTime::<Utc>::MIN_UTC
    })
}
