//! Knowledge Store - rusqlite 기반 동기 지식 저장소
//!
//! 문서(청크 단위)와 FAQ를 저장하고, FAQ/키워드 소스가 쓰는 LIKE 검색을 제공합니다.
//! 저장 위치: ~/.palank-fusion/knowledge.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;

// ============================================================================
// Types
// ============================================================================

/// 새 문서 입력용 구조체 (이미 청크로 나뉜 텍스트)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDocument {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub chunks: Vec<NewChunk>,
}

/// 새 청크 입력
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewChunk {
    pub content: String,
    /// 청크별 부가 정보 (JSON 객체)
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl From<&str> for NewChunk {
    fn from(content: &str) -> Self {
        Self {
            content: content.to_string(),
            metadata: None,
        }
    }
}

/// 저장된 FAQ 엔트리
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub priority: i64,
}

/// 새 FAQ 입력
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFaq {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: i64,
}

/// 키워드 검색 행 (문서 LEFT JOIN 청크)
#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub doc_id: i64,
    pub doc_name: String,
    pub chunk_index: Option<i64>,
    pub content: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub faq_count: usize,
    pub total_content_bytes: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// KnowledgeStore
// ============================================================================

/// Knowledge Store - 동기 지식 저장소
///
/// 연결을 `Arc<Mutex<_>>`로 공유하므로 clone해서 `spawn_blocking`에 넘길 수 있습니다.
#[derive(Clone)]
pub struct KnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl KnowledgeStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 설정의 데이터 디렉토리에서 열기
    pub fn open_default(config: &SearchConfig) -> Result<Self> {
        Self::open(&config.knowledge_db_path())
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                category TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS document_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document ON document_chunks(document_id);

            CREATE TABLE IF NOT EXISTS faq_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                category TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                tag_text TEXT NOT NULL DEFAULT '',
                priority INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create knowledge tables")?;

        tracing::debug!("Knowledge store initialized at {:?}", self.db_path);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    // ------------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------------

    /// 문서와 청크 저장 (단일 트랜잭션)
    pub fn add_document(&self, doc: NewDocument) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO documents (name, category, created_at) VALUES (?1, ?2, ?3)",
            params![doc.name, doc.category, now],
        )
        .context("Failed to insert document")?;
        let id = tx.last_insert_rowid();

        for (index, chunk) in doc.chunks.iter().enumerate() {
            let metadata = chunk
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            tx.execute(
                "INSERT INTO document_chunks (document_id, chunk_index, content, metadata)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, index as i64, chunk.content, metadata],
            )
            .context("Failed to insert document chunk")?;
        }

        tx.commit()?;
        tracing::info!("Added document: {} (id={}, chunks={})", doc.name, id, doc.chunks.len());

        Ok(id)
    }

    /// 문서 이름만 조회 (벡터 결과 보강용)
    pub fn document_name(&self, id: i64) -> Result<Option<String>> {
        let conn = self.lock()?;
        let name = conn
            .query_row("SELECT name FROM documents WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to look up document {}", id))?;
        Ok(name)
    }

    /// 키워드 검색
    ///
    /// 모든 용어가 (문서 이름 OR 청크 내용)에 부분 일치해야 합니다.
    /// 청크가 없는 문서도 이름만으로 매칭됩니다.
    pub fn search_chunks(&self, terms: &[String], limit: usize) -> Result<Vec<ChunkRow>> {
        if terms.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let conditions = (0..terms.len())
            .map(|i| {
                format!(
                    "(LOWER(d.name) LIKE ?{n} ESCAPE '\\' OR LOWER(c.content) LIKE ?{n} ESCAPE '\\')",
                    n = i + 1
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        let sql = format!(
            "SELECT d.id, d.name, c.chunk_index, c.content, c.metadata
             FROM documents d
             LEFT JOIN document_chunks c ON c.document_id = d.id
             WHERE {}
             ORDER BY d.id, c.chunk_index
             LIMIT {}",
            conditions, limit
        );

        let patterns: Vec<String> = terms.iter().map(|t| like_pattern(t)).collect();

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(patterns.iter()), |row| {
                Ok(ChunkRow {
                    doc_id: row.get(0)?,
                    doc_name: row.get(1)?,
                    chunk_index: row.get(2)?,
                    content: row.get(3)?,
                    metadata: row
                        .get::<_, Option<String>>(4)?
                        .and_then(|m| serde_json::from_str(&m).ok()),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    // ------------------------------------------------------------------------
    // FAQ
    // ------------------------------------------------------------------------

    /// FAQ 저장
    pub fn add_faq(&self, faq: NewFaq) -> Result<i64> {
        let conn = self.lock()?;
        let tags = serde_json::to_string(&faq.tags)?;

        conn.execute(
            "INSERT INTO faq_entries (question, answer, category, tags, tag_text, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                faq.question,
                faq.answer,
                faq.category,
                tags,
                faq.tags.join(" "),
                faq.priority,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to insert FAQ entry")?;

        Ok(conn.last_insert_rowid())
    }

    /// FAQ 검색 (질문/답변/태그에 쿼리 전체가 부분 일치)
    pub fn search_faq(&self, query: &str, limit: usize) -> Result<Vec<FaqEntry>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, question, answer, category, tags, priority FROM faq_entries
             WHERE LOWER(question) LIKE ?1 ESCAPE '\\'
                OR LOWER(answer) LIKE ?1 ESCAPE '\\'
                OR LOWER(tag_text) LIKE ?1 ESCAPE '\\'
             ORDER BY priority DESC, id ASC
             LIMIT ?2",
        )?;

        let faqs = stmt
            .query_map(params![like_pattern(query), limit as i64], |row| {
                Ok(FaqEntry {
                    id: row.get(0)?,
                    question: row.get(1)?,
                    answer: row.get(2)?,
                    category: row.get(3)?,
                    tags: serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
                    priority: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(faqs)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let count = |sql: &str| -> i64 { conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0) };

        Ok(StoreStats {
            document_count: count("SELECT COUNT(*) FROM documents") as usize,
            chunk_count: count("SELECT COUNT(*) FROM document_chunks") as usize,
            faq_count: count("SELECT COUNT(*) FROM faq_entries") as usize,
            total_content_bytes: count("SELECT COALESCE(SUM(LENGTH(content)), 0) FROM document_chunks")
                as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 부분 일치 LIKE 패턴 (`%`, `_`, `\` 이스케이프)
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, KnowledgeStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = KnowledgeStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn doc(name: &str, chunks: &[&str]) -> NewDocument {
        NewDocument {
            name: name.to_string(),
            category: Some("processor".to_string()),
            chunks: chunks.iter().map(|c| NewChunk::from(*c)).collect(),
        }
    }

    #[test]
    fn test_add_document_and_lookup_name() {
        let (_dir, store) = create_test_store();

        let id = store.add_document(doc("Clover Rate Sheet", &["clover fees", "clover flex"])).unwrap();
        assert!(id > 0);

        assert_eq!(store.document_name(id).unwrap().as_deref(), Some("Clover Rate Sheet"));
        assert!(store.document_name(999).unwrap().is_none());

        let stats = store.stats().unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 2);
    }

    #[test]
    fn test_document_name_propagates_database_errors() {
        let (_dir, store) = create_test_store();
        store.add_document(doc("Stripe Setup", &["stripe terminal"])).unwrap();

        store
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE document_chunks; DROP TABLE documents;")
            .unwrap();

        // 행 없음(None)과 조회 실패(Err)를 구분
        let err = store.document_name(1).unwrap_err();
        assert!(format!("{:#}", err).contains("no such table"));
    }

    #[test]
    fn test_search_chunks_requires_all_terms() {
        let (_dir, store) = create_test_store();

        store.add_document(doc("Square Guide", &["square pricing overview", "hardware list"])).unwrap();
        store.add_document(doc("Stripe Guide", &["stripe pricing"])).unwrap();

        let terms = vec!["square".to_string(), "pricing".to_string()];
        let rows = store.search_chunks(&terms, 20).unwrap();

        // "Square Guide" 이름이 square를 만족하므로 두 청크 모두 pricing 조건만 보면 됨
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc_name, "Square Guide");
        assert_eq!(rows[0].chunk_index, Some(0));
    }

    #[test]
    fn test_search_chunks_document_without_chunks() {
        let (_dir, store) = create_test_store();
        store.add_document(doc("Helcim Onboarding", &[])).unwrap();

        let rows = store.search_chunks(&["helcim".to_string()], 20).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].content.is_none());
        assert!(rows[0].chunk_index.is_none());
    }

    #[test]
    fn test_search_chunks_limit_and_empty_terms() {
        let (_dir, store) = create_test_store();
        store.add_document(doc("Fees", &["fees a", "fees b", "fees c"])).unwrap();

        assert_eq!(store.search_chunks(&["fees".to_string()], 2).unwrap().len(), 2);
        assert!(store.search_chunks(&[], 20).unwrap().is_empty());
    }

    #[test]
    fn test_like_wildcards_are_literal() {
        let (_dir, store) = create_test_store();
        store.add_document(doc("Rates", &["interchange 100% pass-through"])).unwrap();
        store.add_document(doc("Other", &["interchange 1000 pass"])).unwrap();

        let rows = store.search_chunks(&["100%".to_string()], 20).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc_name, "Rates");
    }

    #[test]
    fn test_chunk_metadata_round_trip() {
        let (_dir, store) = create_test_store();
        store
            .add_document(NewDocument {
                name: "Elavon".to_string(),
                category: None,
                chunks: vec![NewChunk {
                    content: "elavon converge".to_string(),
                    metadata: Some(serde_json::json!({"page": 3})),
                }],
            })
            .unwrap();

        let rows = store.search_chunks(&["converge".to_string()], 20).unwrap();
        assert_eq!(rows[0].metadata.as_ref().unwrap()["page"], 3);
    }

    #[test]
    fn test_faq_search() {
        let (_dir, store) = create_test_store();

        store
            .add_faq(NewFaq {
                question: "How do I set up Clover?".to_string(),
                answer: "Use the Clover dashboard.".to_string(),
                category: Some("setup".to_string()),
                tags: vec!["clover".to_string(), "onboarding".to_string()],
                priority: 1,
            })
            .unwrap();
        store
            .add_faq(NewFaq {
                question: "What are Stripe fees?".to_string(),
                answer: "2.9% + 30c".to_string(),
                tags: vec!["pricing".to_string()],
                ..Default::default()
            })
            .unwrap();

        let hits = store.search_faq("CLOVER", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tags, vec!["clover", "onboarding"]);

        // 태그 매칭
        let hits = store.search_faq("pricing", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].question, "What are Stripe fees?");

        // 태그는 공백으로 이어 붙여 매칭
        assert_eq!(store.search_faq("clover onboarding", 5).unwrap().len(), 1);

        assert!(store.search_faq("  ", 5).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let (_dir, store) = create_test_store();

        store.add_document(doc("Test", &["1234567890"])).unwrap();
        store
            .add_faq(NewFaq {
                question: "q".to_string(),
                answer: "a".to_string(),
                ..Default::default()
            })
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.faq_count, 1);
        assert_eq!(stats.total_content_bytes, 10);
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern("Square"), "%square%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
