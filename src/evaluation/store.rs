//! Resultados de avaliação e feedback de usuários persistidos.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::types::{db_timestamp, parse_db_timestamp};
use crate::types::{EvaluationRecord, EvaluationStatus, Modality, ScoreBreakdown};
use crate::{MeshCacheError, MeshCacheResult};

/// Dias cobertos por [`EvaluationStatistics::daily_trends`].
pub const TREND_DAYS: i64 = 7;

/// Nota média de um dia do calendário (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub avg_score: f64,
    pub count: u64,
}

/// Agregados sobre todas as avaliações gravadas.
///
/// As médias cobrem só avaliações pontuadas; artefatos não carregáveis são
/// contados à parte.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStatistics {
    pub total_evaluations: u64,
    pub unloadable_evaluations: u64,
    pub avg_overall_score: f64,
    pub avg_geometry_score: f64,
    pub avg_texture_score: f64,
    pub avg_fidelity_score: f64,
    pub avg_performance_score: f64,
    pub avg_vertex_count: f64,
    pub avg_face_count: f64,
    pub total_user_feedback: u64,
    /// `None` até existir algum feedback.
    pub avg_user_rating: Option<f64>,
    pub daily_trends: Vec<DailyTrend>,
}

impl EvaluationStatistics {
    pub fn scored_evaluations(&self) -> u64 {
        self.total_evaluations - self.unloadable_evaluations
    }
}

/// Armazenamento SQLite de [`EvaluationRecord`]s e feedback.
pub struct EvaluationStore {
    conn: Mutex<Connection>,
}

impl EvaluationStore {
    /// Abre (ou cria) o armazenamento em `path`.
    pub fn open(path: &Path) -> MeshCacheResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> MeshCacheResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> MeshCacheResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS evaluation_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT,
                model_path TEXT NOT NULL,
                input_data TEXT NOT NULL,
                input_type TEXT NOT NULL,
                geometry_score REAL NOT NULL,
                texture_score REAL NOT NULL,
                fidelity_score REAL NOT NULL,
                performance_score REAL NOT NULL,
                overall_score REAL NOT NULL,
                vertex_count INTEGER NOT NULL,
                face_count INTEGER NOT NULL,
                status TEXT NOT NULL,
                fidelity_estimated INTEGER NOT NULL DEFAULT 0,
                evaluation_ms INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT NOT NULL,
                user_rating INTEGER NOT NULL,
                feedback_text TEXT NOT NULL DEFAULT '',
                feedback_categories TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_evaluation_created ON evaluation_results(created_at);
            CREATE INDEX IF NOT EXISTS idx_evaluation_request ON evaluation_results(request_id);
            CREATE INDEX IF NOT EXISTS idx_feedback_request ON user_feedback(request_id);
        "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MeshCacheResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            MeshCacheError::StorageUnavailable("evaluation store lock poisoned".to_string())
        })
    }

    /// Acrescenta um registro e retorna seu id.
    pub fn insert(&self, record: &EvaluationRecord) -> MeshCacheResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO evaluation_results
            (request_id, model_path, input_data, input_type, geometry_score, texture_score,
             fidelity_score, performance_score, overall_score, vertex_count, face_count,
             status, fidelity_estimated, evaluation_ms, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                record.request_id,
                record.model_path,
                record.input_data,
                record.input_type.as_str(),
                record.scores.geometry,
                record.scores.texture,
                record.scores.fidelity,
                record.scores.performance,
                record.scores.overall,
                record.vertex_count as i64,
                record.face_count as i64,
                record.status.as_str(),
                record.fidelity_estimated,
                record.evaluation_ms as i64,
                db_timestamp(&record.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Grava uma nota de 1-5 para uma requisição.
    pub fn record_feedback(
        &self,
        request_id: &str,
        rating: i64,
        text: &str,
        categories: &[String],
    ) -> MeshCacheResult<i64> {
        if !(1..=5).contains(&rating) {
            return Err(MeshCacheError::InvalidRating(rating));
        }

        let categories = serde_json::to_string(categories)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO user_feedback
            (request_id, user_rating, feedback_text, feedback_categories, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![request_id, rating, text, categories, db_timestamp(&Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Avaliações mais recentes primeiro.
    pub fn recent(&self, limit: usize) -> MeshCacheResult<Vec<EvaluationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, request_id, model_path, input_data, input_type, geometry_score,
                   texture_score, fidelity_score, performance_score, overall_score,
                   vertex_count, face_count, status, fidelity_estimated, evaluation_ms,
                   created_at
            FROM evaluation_results
            ORDER BY created_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;

        let records = stmt
            .query_map(params![limit as i64], read_record)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    /// Avaliações registradas para uma requisição.
    pub fn for_request(&self, request_id: &str) -> MeshCacheResult<Vec<EvaluationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, request_id, model_path, input_data, input_type, geometry_score,
                   texture_score, fidelity_score, performance_score, overall_score,
                   vertex_count, face_count, status, fidelity_estimated, evaluation_ms,
                   created_at
            FROM evaluation_results
            WHERE request_id = ?1
            ORDER BY id
            "#,
        )?;

        let records = stmt
            .query_map(params![request_id], read_record)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    /// Totais, médias, feedback e a tendência diária.
    pub fn statistics(&self) -> MeshCacheResult<EvaluationStatistics> {
        let conn = self.lock()?;

        let (total, unloadable): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(status = 'unloadable'), 0) FROM evaluation_results",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let averages: [Option<f64>; 7] = conn.query_row(
            r#"
            SELECT AVG(overall_score), AVG(geometry_score), AVG(texture_score),
                   AVG(fidelity_score), AVG(performance_score),
                   AVG(vertex_count), AVG(face_count)
            FROM evaluation_results
            WHERE status = 'scored'
            "#,
            [],
            |row| {
                Ok([
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ])
            },
        )?;
        let avg = |i: usize| averages[i].unwrap_or(0.0);

        let (total_feedback, avg_rating): (i64, Option<f64>) = conn.query_row(
            "SELECT COUNT(*), AVG(user_rating) FROM user_feedback",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let since = Utc::now() - chrono::Duration::days(TREND_DAYS);
        let mut stmt = conn.prepare(
            r#"
            SELECT substr(created_at, 1, 10) AS day, AVG(overall_score), COUNT(*)
            FROM evaluation_results
            WHERE status = 'scored' AND created_at >= ?1
            GROUP BY day
            ORDER BY day
            "#,
        )?;
        let daily_trends = stmt
            .query_map(params![db_timestamp(&since)], |row| {
                Ok(DailyTrend {
                    date: row.get(0)?,
                    avg_score: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(EvaluationStatistics {
            total_evaluations: total as u64,
            unloadable_evaluations: unloadable as u64,
            avg_overall_score: avg(0),
            avg_geometry_score: avg(1),
            avg_texture_score: avg(2),
            avg_fidelity_score: avg(3),
            avg_performance_score: avg(4),
            avg_vertex_count: avg(5),
            avg_face_count: avg(6),
            total_user_feedback: total_feedback as u64,
            avg_user_rating: avg_rating,
            daily_trends,
        })
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<EvaluationRecord> {
    let input_type: String = row.get(4)?;
    let status: String = row.get(12)?;
    let created_at: String = row.get(15)?;

    Ok(EvaluationRecord {
        id: Some(row.get(0)?),
        request_id: row.get(1)?,
        model_path: row.get(2)?,
        input_data: row.get(3)?,
        input_type: Modality::parse(&input_type).unwrap_or(Modality::Text),
        scores: ScoreBreakdown {
            geometry: row.get(5)?,
            texture: row.get(6)?,
            fidelity: row.get(7)?,
            performance: row.get(8)?,
            overall: row.get(9)?,
        },
        vertex_count: row.get::<_, i64>(10)?.max(0) as u64,
        face_count: row.get::<_, i64>(11)?.max(0) as u64,
        status: EvaluationStatus::parse(&status),
        fidelity_estimated: row.get(13)?,
        evaluation_ms: row.get::<_, i64>(14)?.max(0) as u64,
        created_at: parse_db_timestamp(&created_at),
    })
}
