//! Cache por similaridade para requisições de geração.
//!
//! Uma consulta roda em duas fases:
//!
//! 1. **Exata**: impressão digital SHA-256 da entrada bruta
//! 2. **Similar**: vetor de features mais próximo no limiar ou acima
//!
//! As duas fases contam um hit no registro encontrado. Veja
//! [`CacheCoordinator`].

mod coordinator;
mod fingerprint;

pub use coordinator::{
    CacheCoordinator, CacheHit, CacheResult, CacheStatistics, EvictionReport, MissReason,
};
pub use fingerprint::{fingerprint, fingerprint_bytes};
