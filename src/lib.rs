//! # meshcache
//!
//! Cache por similaridade e avaliador de qualidade para modelos 3D gerados.
//!
//! Gerar uma malha a partir de um prompt ou de uma imagem leva minutos. O meshcache
//! responde a uma requisição com trabalho anterior quando possível: primeiro pela
//! impressão digital exata da entrada, depois pela similaridade de cosseno dos vetores
//! de features. Todo modelo recém-gerado recebe notas de geometria, textura, fidelidade
//! e desempenho antes de entrar no cache.
//!
//! ## Módulos
//!
//! - [`features`] - Extração de features de texto e imagem
//! - [`index`] - Índice de similaridade (SQLite e em memória)
//! - [`cache`] - Coordenador do cache: consulta, gravação, remoção, estatísticas
//! - [`evaluation`] - Carga de malhas, métricas de qualidade, armazenamento, relatórios
//! - [`pipeline`] - Orquestração de requisições sobre um backend gerador
//! - [`cli`] - Interface de linha de comando
//! - [`types`] - Tipos compartilhados

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod evaluation;
pub mod features;
pub mod index;
pub mod pipeline;
pub mod types;

pub use types::config::Config;
pub use types::errors::{MeshCacheError, MeshCacheResult};
pub use types::{Input, Modality};
