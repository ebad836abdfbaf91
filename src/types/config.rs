//! Configuração do meshcache.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{MeshCacheError, MeshCacheResult};

/// Nome de arquivo procurado por [`Config::load_or_default`].
pub const CONFIG_FILE_NAME: &str = "meshcache.toml";

/// Configuração principal do meshcache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configurações gerais.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Configurações do cache por similaridade.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Configurações da avaliação de qualidade.
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Configurações do pipeline de geração.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Configurações gerais.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Nível de log (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Formato do log (text, json).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

/// Backend de armazenamento do índice de similaridade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// Arquivo SQLite dentro de `cache.dir`.
    Sqlite,
    /// Local ao processo, perdido ao sair.
    Memory,
}

/// Configurações do cache por similaridade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Habilitado. Um cache desabilitado sempre erra.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Diretório com o banco do índice.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Backend do índice.
    #[serde(default = "default_backend")]
    pub backend: IndexBackend,

    /// Similaridade de cosseno mínima para um hit similar (inclusiva).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Registros não acessados por esta quantidade de dias são removidos.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,

    /// Orçamento de tamanho total dos artefatos, em gigabytes.
    #[serde(default = "default_max_size_gb")]
    pub max_size_gb: f64,

    /// Tamanho dos vetores de features de texto.
    #[serde(default = "default_text_dimension")]
    pub text_dimension: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            backend: default_backend(),
            similarity_threshold: default_similarity_threshold(),
            max_age_days: default_max_age_days(),
            max_size_gb: default_max_size_gb(),
            text_dimension: default_text_dimension(),
        }
    }
}

impl CacheConfig {
    /// Caminho do índice SQLite.
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("cache.db")
    }

    /// Orçamento de tamanho em bytes.
    pub fn max_total_bytes(&self) -> u64 {
        (self.max_size_gb.max(0.0) * 1024.0 * 1024.0 * 1024.0) as u64
    }

    /// Define o limiar de similaridade, limitado a [0, 1].
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Define o backend.
    pub fn with_backend(mut self, backend: IndexBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Define o diretório do índice.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".meshcache")
}

fn default_backend() -> IndexBackend {
    IndexBackend::Sqlite
}

fn default_similarity_threshold() -> f32 {
    0.85
}

fn default_max_age_days() -> u64 {
    30
}

fn default_max_size_gb() -> f64 {
    10.0
}

fn default_text_dimension() -> usize {
    1024
}

/// Pesos das quatro sub-notas na nota geral.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityWeights {
    #[serde(default = "default_geometry_weight")]
    pub geometry: f64,
    #[serde(default = "default_texture_weight")]
    pub texture: f64,
    #[serde(default = "default_fidelity_weight")]
    pub fidelity: f64,
    #[serde(default = "default_performance_weight")]
    pub performance: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            geometry: default_geometry_weight(),
            texture: default_texture_weight(),
            fidelity: default_fidelity_weight(),
            performance: default_performance_weight(),
        }
    }
}

impl QualityWeights {
    /// Soma de todos os pesos.
    pub fn total(&self) -> f64 {
        self.geometry + self.texture + self.fidelity + self.performance
    }

    fn validate(&self) -> MeshCacheResult<()> {
        let all = [self.geometry, self.texture, self.fidelity, self.performance];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(MeshCacheError::config(
                "quality weights must be finite and non-negative",
            ));
        }
        if self.total() <= 0.0 {
            return Err(MeshCacheError::config("quality weights must not all be zero"));
        }
        Ok(())
    }
}

fn default_geometry_weight() -> f64 {
    0.3
}

fn default_texture_weight() -> f64 {
    0.2
}

fn default_fidelity_weight() -> f64 {
    0.3
}

fn default_performance_weight() -> f64 {
    0.2
}

/// Configurações da avaliação de qualidade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Persiste os registros de avaliação.
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Caminho do banco SQLite com avaliações e feedback.
    #[serde(default = "default_evaluation_db")]
    pub db_path: PathBuf,

    /// Pesos das sub-notas.
    #[serde(default)]
    pub weights: QualityWeights,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            persist: true,
            db_path: default_evaluation_db(),
            weights: QualityWeights::default(),
        }
    }
}

fn default_evaluation_db() -> PathBuf {
    PathBuf::from(".meshcache/evaluation.db")
}

/// Configurações do pipeline de geração.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Diretório onde os modelos gerados são gravados.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Limite de tempo de uma geração, em segundos.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".meshcache/models")
}

fn default_generation_timeout() -> u64 {
    300 // 5 minutos
}

impl Config {
    /// Carrega configuração de um arquivo TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> MeshCacheResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Salva configuração em um arquivo TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MeshCacheResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Cria configuração padrão.
    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig::default(),
            cache: CacheConfig::default(),
            evaluation: EvaluationConfig::default(),
            generation: GenerationConfig::default(),
        }
    }

    /// Carrega `meshcache.toml` do diretório atual, depois do diretório de
    /// configuração do usuário, e por fim usa os padrões.
    pub fn load_or_default() -> Self {
        let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("meshcache").join(CONFIG_FILE_NAME));
        }

        for candidate in candidates {
            if !candidate.exists() {
                continue;
            }
            match Self::load(&candidate) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "Ignoring invalid configuration");
                }
            }
        }

        Self::default_config()
    }

    /// Verifica faixas de valores que o serde não expressa.
    pub fn validate(&self) -> MeshCacheResult<()> {
        let threshold = self.cache.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MeshCacheError::config(format!(
                "cache.similarity_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.cache.text_dimension == 0 {
            return Err(MeshCacheError::config("cache.text_dimension must be positive"));
        }
        self.evaluation.weights.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.backend, IndexBackend::Sqlite);
        assert!((config.cache.similarity_threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.cache.max_age_days, 30);
        assert!((config.evaluation.weights.total() - 1.0).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            similarity_threshold = 0.9
            backend = "memory"

            [evaluation.weights]
            texture = 0.5
            "#,
        )
        .unwrap();

        assert!((config.cache.similarity_threshold - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.cache.backend, IndexBackend::Memory);
        assert_eq!(config.cache.max_age_days, 30);
        assert!((config.evaluation.weights.texture - 0.5).abs() < 1e-9);
        assert!((config.evaluation.weights.geometry - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.cache.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.evaluation.weights.fidelity = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.evaluation.weights = QualityWeights {
            geometry: 0.0,
            texture: 0.0,
            fidelity: 0.0,
            performance: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_builder_clamps() {
        let cache = CacheConfig::default().with_similarity_threshold(2.0);
        assert!((cache.similarity_threshold - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = Config::default();
        config.cache.max_age_days = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.cache.max_age_days, 7);
    }

    #[test]
    fn test_max_total_bytes() {
        let mut cache = CacheConfig::default();
        cache.max_size_gb = 1.0;
        assert_eq!(cache.max_total_bytes(), 1024 * 1024 * 1024);
    }
}
