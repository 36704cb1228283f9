//! Analytics Sink - 검색 분석 기록 영속화
//!
//! 저장은 best-effort입니다. 실패는 추적기에서 로그만 남기고 버려집니다.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags};
use uuid::Uuid;

use super::tracker::SearchAnalyticsRecord;

// ============================================================================
// AnalyticsSink Trait
// ============================================================================

/// 분석 기록 저장소 인터페이스
pub trait AnalyticsSink: Send + Sync {
    /// 기록 1건 저장
    fn persist(&self, record: &SearchAnalyticsRecord) -> Result<()>;
}

/// 공유 싱크 (추적기와 CLI가 같은 싱크를 씀)
impl<T: AnalyticsSink + ?Sized> AnalyticsSink for Arc<T> {
    fn persist(&self, record: &SearchAnalyticsRecord) -> Result<()> {
        (**self).persist(record)
    }
}

// ============================================================================
// SqliteAnalyticsSink
// ============================================================================

/// SQLite `search_analytics` 테이블 싱크
pub struct SqliteAnalyticsSink {
    conn: Mutex<Connection>,
}

impl SqliteAnalyticsSink {
    /// DB 열기 (테이블이 없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create analytics directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open analytics database")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS search_analytics (
                id TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                result_count INTEGER NOT NULL,
                average_score REAL NOT NULL,
                sources TEXT NOT NULL,
                user_id TEXT,
                has_good_results INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create search_analytics table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_search_analytics_created_at
             ON search_analytics(created_at)",
            [],
        )
        .context("Failed to create created_at index")?;

        tracing::debug!("Analytics sink initialized at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// `since` 이후 기록 로드 (오래된 순)
    ///
    /// 프로세스 시작 시 추적기를 복원하는 데 사용합니다.
    pub fn load_since(&self, since: DateTime<Utc>) -> Result<Vec<SearchAnalyticsRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, query, result_count, average_score, sources, user_id, has_good_results, created_at
             FROM search_analytics
             WHERE created_at > ?1
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![format_timestamp(since)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, bool>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, query, result_count, average_score, sources, user_id, has_good_results, created_at) =
                row?;

            let Ok(timestamp) = DateTime::parse_from_rfc3339(&created_at) else {
                tracing::warn!("Skipping analytics row {} with bad timestamp {:?}", id, created_at);
                continue;
            };

            records.push(SearchAnalyticsRecord {
                id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::new_v4()),
                query,
                result_count: result_count.max(0) as usize,
                average_score,
                sources: serde_json::from_str(&sources).unwrap_or_default(),
                user_id,
                has_good_results,
                timestamp: timestamp.with_timezone(&Utc),
            });
        }

        Ok(records)
    }

    /// `cutoff` 이전(포함) 기록 삭제
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let rows = conn
            .execute(
                "DELETE FROM search_analytics WHERE created_at <= ?1",
                params![format_timestamp(cutoff)],
            )
            .context("Failed to prune search analytics")?;

        Ok(rows)
    }

    /// 저장된 기록 수
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM search_analytics", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl AnalyticsSink for SqliteAnalyticsSink {
    fn persist(&self, record: &SearchAnalyticsRecord) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let sources = serde_json::to_string(&record.sources).context("Failed to encode sources")?;

        conn.execute(
            "INSERT INTO search_analytics
                (id, query, result_count, average_score, sources, user_id, has_good_results, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.query,
                record.result_count as i64,
                record.average_score,
                sources,
                record.user_id,
                record.has_good_results,
                format_timestamp(record.timestamp),
            ],
        )
        .context("Failed to insert search analytics")?;

        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 고정 폭 RFC3339 (문자열 비교 = 시간 비교)
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================================================
// Tests
// ============================================================================
