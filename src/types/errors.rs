//! Tipos de erro do meshcache.

use std::path::PathBuf;

use thiserror::Error;

/// Tipo de resultado padrão do meshcache.
pub type MeshCacheResult<T> = Result<T, MeshCacheError>;

/// Erros produzidos pelo cache, pelo avaliador e seus armazenamentos.
///
/// Nenhum deles deve abortar uma requisição de geração: o coordenador e o
/// avaliador os transformam em misses ou notas neutras e registram no log.
#[derive(Error, Debug)]
pub enum MeshCacheError {
    #[error("Erro de configuração: {0}")]
    Config(String),

    #[error("Erro de IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro ao parsear TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Erro ao serializar TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Erro no banco de dados: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Entrada ilegível: {0}")]
    InputUnreadable(String),

    #[error("Armazenamento indisponível: {0}")]
    StorageUnavailable(String),

    #[error("Artefato '{}' não pôde ser carregado: {reason}", path.display())]
    ArtifactUnloadable { path: PathBuf, reason: String },

    #[error("Métrica '{metric}' falhou: {reason}")]
    SubMetricFailure { metric: &'static str, reason: String },

    #[error("Nota {0} fora da faixa 1-5")]
    InvalidRating(i64),

    #[error("Dimensão de vetor incompatível: esperado {expected}, recebido {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Falha na geração: {0}")]
    Generation(String),
}

impl MeshCacheError {
    /// Cria um erro de configuração.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Cria um erro de entrada ilegível.
    pub fn unreadable<S: Into<String>>(msg: S) -> Self {
        Self::InputUnreadable(msg.into())
    }

    /// Cria um erro de artefato não carregável.
    pub fn unloadable<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::ArtifactUnloadable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Cria uma falha de sub-métrica.
    pub fn metric<S: Into<String>>(metric: &'static str, reason: S) -> Self {
        Self::SubMetricFailure {
            metric,
            reason: reason.into(),
        }
    }
}
