//! Índice de similaridade sobre SQLite.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::types::{db_timestamp as timestamp, parse_db_timestamp as parse_timestamp};
use crate::types::{CacheRecord, Modality, NewCacheRecord, SimilarMatch};
use crate::{MeshCacheError, MeshCacheResult};

use super::{select_nearest, sort_by_creation, sort_by_recency, ModalityStats, SimilarityIndex};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const COLUMNS: &str = "id, input_hash, input_label, embedding, model_path, quality_score, \
                       generation_time, created_at, last_accessed, access_count";

/// Índice persistente com uma tabela por modalidade.
///
/// `rusqlite::Connection` não é `Sync`, então fica atrás de um mutex. Cada
/// alteração roda em sua própria transação.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Abre (ou cria) o índice em `path`, criando os diretórios pais.
    pub fn open(path: &Path) -> MeshCacheResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // WAL permite que outros processos leiam enquanto um escreve.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::init(conn)
    }

    /// Abre um banco privado em memória.
    pub fn open_in_memory() -> MeshCacheResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> MeshCacheResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let mut schema = String::from(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                modality TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                dimension INTEGER NOT NULL
            );
            "#,
        );
        for modality in Modality::ALL {
            let table = table(modality);
            schema.push_str(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    input_hash TEXT NOT NULL UNIQUE,
                    input_label TEXT NOT NULL DEFAULT '',
                    embedding BLOB NOT NULL,
                    model_path TEXT NOT NULL,
                    quality_score REAL NOT NULL DEFAULT 0,
                    generation_time REAL NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    last_accessed TEXT NOT NULL,
                    access_count INTEGER NOT NULL DEFAULT 1
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_accessed ON {table}(last_accessed);
                "#
            ));
        }
        conn.execute_batch(&schema)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MeshCacheResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MeshCacheError::StorageUnavailable("index lock poisoned".to_string()))
    }

    fn select_all(conn: &Connection, modality: Modality) -> MeshCacheResult<Vec<CacheRecord>> {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM {}", COLUMNS, table(modality)))?;
        let records = stmt
            .query_map([], |row| read_record(modality, row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    fn select_one(
        conn: &Connection,
        modality: Modality,
        fingerprint: &str,
    ) -> MeshCacheResult<Option<CacheRecord>> {
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE input_hash = ?1",
                    COLUMNS,
                    table(modality)
                ),
                params![fingerprint],
                |row| read_record(modality, row),
            )
            .optional()?;
        Ok(record)
    }
}

impl SimilarityIndex for SqliteIndex {
    fn ensure_model(
        &self,
        modality: Modality,
        model_id: &str,
        dimension: usize,
    ) -> MeshCacheResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current: Option<(String, i64)> = tx
            .query_row(
                "SELECT model_id, dimension FROM index_meta WHERE modality = ?1",
                params![modality.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let wiped = match current {
            Some((ref id, dim)) if id == model_id && dim == dimension as i64 => return Ok(false),
            Some((previous, _)) => {
                let removed = tx.execute(&format!("DELETE FROM {}", table(modality)), [])?;
                tracing::warn!(
                    modality = %modality,
                    previous = %previous,
                    current = %model_id,
                    removed,
                    "Feature model changed, dropping stored vectors"
                );
                true
            }
            None => false,
        };

        tx.execute(
            "INSERT OR REPLACE INTO index_meta (modality, model_id, dimension) VALUES (?1, ?2, ?3)",
            params![modality.as_str(), model_id, dimension as i64],
        )?;
        tx.commit()?;
        Ok(wiped)
    }

    fn exact_lookup(
        &self,
        modality: Modality,
        fingerprint: &str,
    ) -> MeshCacheResult<Option<CacheRecord>> {
        let conn = self.lock()?;
        Self::select_one(&conn, modality, fingerprint)
    }

    fn nearest(
        &self,
        modality: Modality,
        vector: &[f32],
        threshold: f32,
    ) -> MeshCacheResult<Option<SimilarMatch>> {
        let mut records = {
            let conn = self.lock()?;
            Self::select_all(&conn, modality)?
        };
        sort_by_creation(&mut records);
        Ok(select_nearest(records, vector, threshold))
    }

    fn insert_or_replace(
        &self,
        modality: Modality,
        record: NewCacheRecord,
    ) -> MeshCacheResult<CacheRecord> {
        let now = Utc::now();
        let stamp = timestamp(&now);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (input_hash, input_label, embedding, model_path, \
                 quality_score, generation_time, created_at, last_accessed, access_count) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 1)",
                table(modality)
            ),
            params![
                record.input_fingerprint,
                record.input_label,
                encode_vector(&record.feature_vector),
                record.artifact_reference,
                record.quality_score,
                record.generation_cost,
                stamp,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        // Relê pela mesma codificação para o chamador ver o que as consultas veem.
        let stored = parse_timestamp(&stamp);
        Ok(CacheRecord {
            id,
            modality,
            input_fingerprint: record.input_fingerprint,
            input_label: record.input_label,
            feature_vector: record.feature_vector,
            artifact_reference: record.artifact_reference,
            quality_score: record.quality_score,
            generation_cost: record.generation_cost,
            created_at: stored,
            last_accessed_at: stored,
            access_count: 1,
        })
    }

    fn touch(&self, modality: Modality, fingerprint: &str) -> MeshCacheResult<Option<CacheRecord>> {
        let stamp = timestamp(&Utc::now());

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            &format!(
                "UPDATE {} SET \
                 last_accessed = CASE WHEN last_accessed > ?1 THEN last_accessed ELSE ?1 END, \
                 access_count = access_count + 1 \
                 WHERE input_hash = ?2",
                table(modality)
            ),
            params![stamp, fingerprint],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let record = Self::select_one(&tx, modality, fingerprint)?;
        tx.commit()?;
        Ok(record)
    }

    fn remove(&self, modality: Modality, fingerprint: &str) -> MeshCacheResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE input_hash = ?1", table(modality)),
            params![fingerprint],
        )?;
        Ok(removed > 0)
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> MeshCacheResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for modality in Modality::ALL {
            // Comparado após o parse, então linhas com timestamp corrompido também saem.
            let expired: Vec<String> = {
                let mut stmt =
                    tx.prepare(&format!("SELECT input_hash, last_accessed FROM {}", table(modality)))?;
                let rows: Vec<String> = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .filter_map(|r| r.ok())
                    .filter(|(_, accessed)| parse_timestamp(accessed) < cutoff)
                    .map(|(hash, _)| hash)
                    .collect();
                rows
            };
            for hash in expired {
                removed += tx.execute(
                    &format!("DELETE FROM {} WHERE input_hash = ?1", table(modality)),
                    params![hash],
                )?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn records_by_recency(&self) -> MeshCacheResult<Vec<CacheRecord>> {
        let mut records = Vec::new();
        {
            let conn = self.lock()?;
            for modality in Modality::ALL {
                records.extend(Self::select_all(&conn, modality)?);
            }
        }
        sort_by_recency(&mut records);
        Ok(records)
    }

    fn stats(&self, modality: Modality) -> MeshCacheResult<ModalityStats> {
        let conn = self.lock()?;
        let (entries, avg): (i64, Option<f64>) = conn.query_row(
            &format!(
                "SELECT COUNT(*), AVG(access_count) FROM {}",
                table(modality)
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let model_id: Option<String> = conn
            .query_row(
                "SELECT model_id FROM index_meta WHERE modality = ?1",
                params![modality.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(ModalityStats {
            entries: entries as usize,
            avg_access_count: avg.unwrap_or(0.0),
            model_id,
        })
    }
}

fn table(modality: Modality) -> &'static str {
    match modality {
        Modality::Text => "text_cache",
        Modality::Image => "image_cache",
    }
}

fn read_record(modality: Modality, row: &Row<'_>) -> rusqlite::Result<CacheRecord> {
    let blob: Vec<u8> = row.get(3)?;
    let created_at: String = row.get(7)?;
    let last_accessed: String = row.get(8)?;
    let access_count: i64 = row.get(9)?;

    Ok(CacheRecord {
        id: row.get(0)?,
        modality,
        input_fingerprint: row.get(1)?,
        input_label: row.get(2)?,
        // Um blob corrompido vira vetor vazio e é ignorado por nearest().
        feature_vector: decode_vector(&blob).unwrap_or_default(),
        artifact_reference: row.get(4)?,
        quality_score: row.get(5)?,
        generation_cost: row.get(6)?,
        created_at: parse_timestamp(&created_at),
        last_accessed_at: parse_timestamp(&last_accessed),
        access_count: access_count.max(0) as u64,
    })
}

/// Sequência de f32 little-endian.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_record(fingerprint: &str, vector: Vec<f32>) -> NewCacheRecord {
        NewCacheRecord {
            input_fingerprint: fingerprint.to_string(),
            input_label: fingerprint.to_string(),
            feature_vector: vector,
            artifact_reference: format!("/models/{}.obj", fingerprint),
            quality_score: 0.8,
            generation_cost: 1.5,
        }
    }

    #[test]
    fn test_vector_blob_encoding() {
        let v = vec![0.5f32, -1.25, 3.0];
        assert_eq!(decode_vector(&encode_vector(&v)), Some(v));
        assert_eq!(decode_vector(&[1, 2, 3]), None);
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let early = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let late = early + chrono::Duration::microseconds(1);
        assert!(timestamp(&early) < timestamp(&late));
    }

    #[test]
    fn test_corrupt_timestamp_is_evicted_first() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index
            .insert_or_replace(Modality::Text, new_record("corrupt", vec![1.0, 0.0]))
            .unwrap();
        index
            .insert_or_replace(Modality::Text, new_record("fine", vec![0.0, 1.0]))
            .unwrap();
        index
            .lock()
            .unwrap()
            .execute(
                "UPDATE text_cache SET last_accessed = 'garbage' WHERE input_hash = 'corrupt'",
                [],
            )
            .unwrap();

        let records = index.records_by_recency().unwrap();
        assert_eq!(records[0].input_fingerprint, "corrupt");

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(index.evict_older_than(cutoff).unwrap(), 1);
        assert!(index.exact_lookup(Modality::Text, "corrupt").unwrap().is_none());
        assert!(index.exact_lookup(Modality::Text, "fine").unwrap().is_some());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");

        {
            let index = SqliteIndex::open(&path).unwrap();
            index
                .insert_or_replace(Modality::Text, new_record("abc", vec![1.0, 0.0]))
                .unwrap();
        }

        let index = SqliteIndex::open(&path).unwrap();
        let record = index.exact_lookup(Modality::Text, "abc").unwrap().unwrap();
        assert_eq!(record.feature_vector, vec![1.0, 0.0]);
        assert_eq!(record.artifact_reference, "/models/abc.obj");
        assert_eq!(record.access_count, 1);
    }

    #[test]
    fn test_modalities_are_separate_tables() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index
            .insert_or_replace(Modality::Image, new_record("same", vec![1.0]))
            .unwrap();

        assert!(index.exact_lookup(Modality::Text, "same").unwrap().is_none());
        assert!(index.exact_lookup(Modality::Image, "same").unwrap().is_some());
    }

    #[test]
    fn test_model_change_wipes_modality() {
        let index = SqliteIndex::open_in_memory().unwrap();
        assert!(!index.ensure_model(Modality::Text, "m1", 2).unwrap());
        index
            .insert_or_replace(Modality::Text, new_record("a", vec![1.0, 0.0]))
            .unwrap();
        index
            .insert_or_replace(Modality::Image, new_record("b", vec![1.0]))
            .unwrap();

        assert!(!index.ensure_model(Modality::Text, "m1", 2).unwrap());
        assert_eq!(index.stats(Modality::Text).unwrap().entries, 1);

        assert!(index.ensure_model(Modality::Text, "m2", 2).unwrap());
        assert_eq!(index.stats(Modality::Text).unwrap().entries, 0);
        assert_eq!(index.stats(Modality::Image).unwrap().entries, 1);
        assert_eq!(
            index.stats(Modality::Text).unwrap().model_id.as_deref(),
            Some("m2")
        );
    }

    #[test]
    fn test_corrupt_blob_is_skipped() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index
            .insert_or_replace(Modality::Text, new_record("good", vec![1.0, 0.0]))
            .unwrap();
        {
            let conn = index.lock().unwrap();
            conn.execute(
                "INSERT INTO text_cache (input_hash, embedding, model_path, created_at, last_accessed) \
                 VALUES ('bad', x'010203', 'x.obj', '2020-01-01T00:00:00.000000Z', '2020-01-01T00:00:00.000000Z')",
                [],
            )
            .unwrap();
        }

        let best = index.nearest(Modality::Text, &[1.0, 0.0], 0.5).unwrap().unwrap();
        assert_eq!(best.record.input_fingerprint, "good");
    }
}
