//! CLI 모듈
//!
//! palank-fusion CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::analytics::{AnalyticsTracker, SqliteAnalyticsSink};
use crate::config::SearchConfig;
use crate::embedding::{has_api_key, GeminiEmbedding};
use crate::knowledge::{
    DocumentKeywordSource, FaqSource, KnowledgeStore, LanceVectorIndex, NewDocument, NewFaq,
    SemanticSource, VectorIndex,
};
use crate::search::{FusionSearchEngine, SearchResult, DEFAULT_LIMIT};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "palank-fusion")]
#[command(version, about = "멀티소스 융합 검색 엔진", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// FAQ/벡터/키워드 융합 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// 분석 기록용 사용자 ID
        #[arg(short, long)]
        user: Option<String>,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// JSON 파일에서 FAQ와 청크 문서 가져오기
    Import {
        /// `{"faqs": [...], "documents": [...]}` 형식 파일
        file: PathBuf,
    },

    /// 자주 실패하는 쿼리
    PoorQueries {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// 검색 인사이트 요약
    Insights,

    /// 보존 기간이 지난 분석 기록 삭제
    Cleanup,

    /// 상태 확인
    Status,
}

// ============================================================================
// App Context
// ============================================================================

/// 명령어 공통 자원
struct App {
    config: SearchConfig,
    store: KnowledgeStore,
    sink: Arc<SqliteAnalyticsSink>,
    tracker: Arc<AnalyticsTracker>,
}

impl App {
    /// 저장소를 열고 보존 기간 내 분석 기록으로 추적기 복원
    fn open(config: SearchConfig) -> Result<Self> {
        let store = KnowledgeStore::open_default(&config).context("KnowledgeStore 열기 실패")?;
        let sink = Arc::new(
            SqliteAnalyticsSink::open(&config.analytics_db_path()).context("분석 DB 열기 실패")?,
        );

        let cutoff = chrono::Utc::now() - config.retention();
        let records = sink.load_since(cutoff).context("분석 기록 로드 실패")?;
        tracing::debug!("Restored {} analytics records", records.len());

        let tracker = AnalyticsTracker::new()
            .with_quality_threshold(config.quality_threshold)
            .with_retention(config.retention())
            .with_records(records)
            .with_sink(Box::new(sink.clone()));

        Ok(Self {
            config,
            store,
            sink,
            tracker: Arc::new(tracker),
        })
    }

    /// 사용 가능한 소스로 검색 엔진 구성
    ///
    /// 벡터 소스는 API 키와 인덱스가 모두 있을 때만 붙습니다.
    async fn engine(&self) -> FusionSearchEngine {
        let mut engine = FusionSearchEngine::new(self.config.clone(), self.tracker.clone())
            .with_qa_source(Arc::new(FaqSource::new(self.store.clone(), self.config.faq_limit)))
            .with_keyword_source(Arc::new(DocumentKeywordSource::new(
                self.store.clone(),
                self.config.keyword_limit,
            )));

        match self.semantic_source().await {
            Ok(Some(source)) => engine = engine.with_vector_source(Arc::new(source)),
            Ok(None) => tracing::info!("Vector source disabled (no API key or index)"),
            Err(e) => tracing::warn!("Vector source unavailable: {:#}", e),
        }

        engine
    }

    async fn semantic_source(&self) -> Result<Option<SemanticSource<GeminiEmbedding, LanceVectorIndex>>> {
        let index_path = self.config.vector_index_path();
        if !has_api_key() || !index_path.exists() {
            return Ok(None);
        }

        let embedder = GeminiEmbedding::from_env()?;
        let index = LanceVectorIndex::open(&index_path).await?;

        Ok(Some(
            SemanticSource::new(embedder, index, self.config.vector_limit_per_variation)
                .with_store(self.store.clone()),
        ))
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let app = App::open(SearchConfig::from_env())?;

    match cli.command {
        Commands::Search {
            query,
            limit,
            user,
            json,
        } => cmd_search(&app, &query, limit, user.as_deref(), json).await,
        Commands::Import { file } => cmd_import(&app, &file),
        Commands::PoorQueries { limit } => cmd_poor_queries(&app, limit),
        Commands::Insights => cmd_insights(&app),
        Commands::Cleanup => cmd_cleanup(&app),
        Commands::Status => cmd_status(&app).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 검색 명령어 (search)
async fn cmd_search(app: &App, query: &str, limit: usize, user: Option<&str>, json: bool) -> Result<()> {
    let engine = app.engine().await;
    let results = engine.search(query, limit, user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("[*] 검색: \"{}\"", query);

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result);
    }

    Ok(())
}

fn print_result(rank: usize, result: &SearchResult) {
    println!("{}. [{}] {} (score: {:.3})", rank, result.source, result.id, result.score);
    if let Some(name) = result.document_name() {
        println!("   문서: {}", name);
    }
    println!("   내용: {}", truncate_text(&result.content, 200));
    println!();
}

/// 가져오기 파일 형식
#[derive(Debug, Default, Deserialize)]
struct ImportFile {
    #[serde(default)]
    faqs: Vec<NewFaq>,
    #[serde(default)]
    documents: Vec<NewDocument>,
}

/// 가져오기 명령어 (import)
///
/// 원문 텍스트만 저장합니다. 벡터 인덱스는 별도 파이프라인이 채웁니다.
fn cmd_import(app: &App, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("파일 읽기 실패: {}", file.display()))?;
    let import: ImportFile = serde_json::from_str(&raw).context("JSON 파싱 실패")?;

    println!(
        "[*] 가져오는 중: FAQ {} 건, 문서 {} 건",
        import.faqs.len(),
        import.documents.len()
    );

    let mut faq_count = 0;
    for faq in import.faqs {
        let question = faq.question.clone();
        match app.store.add_faq(faq) {
            Ok(_) => faq_count += 1,
            Err(e) => println!("[!] FAQ 저장 실패 ({}): {}", truncate_text(&question, 40), e),
        }
    }

    let mut doc_count = 0;
    let mut chunk_count = 0;
    for doc in import.documents {
        let name = doc.name.clone();
        let chunks = doc.chunks.len();
        match app.store.add_document(doc) {
            Ok(_) => {
                doc_count += 1;
                chunk_count += chunks;
            }
            Err(e) => println!("[!] 문서 저장 실패 ({}): {}", name, e),
        }
    }

    println!("[OK] FAQ {} 건, 문서 {} 건 ({} 청크) 저장됨", faq_count, doc_count, chunk_count);
    Ok(())
}

/// 실패 쿼리 명령어 (poor-queries)
fn cmd_poor_queries(app: &App, limit: usize) -> Result<()> {
    let poor = app.tracker.poor_performing_queries(limit);

    if poor.is_empty() {
        println!("[OK] 실패한 검색이 없습니다.");
        return Ok(());
    }

    println!("[*] 자주 실패하는 쿼리 ({} 건):\n", poor.len());
    for (i, entry) in poor.iter().enumerate() {
        println!(
            "{:>3}. {:<40} 실패 {:>4} 회  평균 {:.3}",
            i + 1,
            truncate_text(&entry.query, 40),
            entry.search_count,
            entry.average_score
        );
        if !entry.suggested_keywords.is_empty() {
            println!("     추천 키워드: {}", entry.suggested_keywords.join(", "));
        }
    }

    Ok(())
}

/// 인사이트 명령어 (insights)
fn cmd_insights(app: &App) -> Result<()> {
    let insights = app.tracker.search_insights();

    println!("[*] 검색 인사이트 (최근 {}일)", app.config.retention_days);
    println!();
    println!("    총 검색: {} 회", insights.total_searches);
    println!("    성공률: {:.1}%", insights.success_rate * 100.0);
    println!("    평균 결과 수: {:.2}", insights.average_result_count);

    if !insights.top_poor_queries.is_empty() {
        println!();
        println!("[!] 실패 상위 쿼리:");
        for entry in &insights.top_poor_queries {
            println!("    - {} ({} 회)", entry.query, entry.search_count);
        }
    }

    if !insights.common_failure_patterns.is_empty() {
        println!();
        println!("[!] 실패 패턴:");
        for pattern in &insights.common_failure_patterns {
            println!("    - {}", pattern);
        }
    }

    Ok(())
}

/// 정리 명령어 (cleanup)
fn cmd_cleanup(app: &App) -> Result<()> {
    let cutoff = app.tracker.retention_cutoff();
    let in_memory = app.tracker.cleanup_before(cutoff);
    let on_disk = app.sink.prune_before(cutoff).context("분석 기록 삭제 실패")?;

    println!(
        "[OK] {} 이전 기록 정리: 메모리 {} 건, DB {} 건",
        cutoff.format("%Y-%m-%d %H:%M"),
        in_memory,
        on_disk
    );
    Ok(())
}

/// 상태 확인 명령어 (status)
async fn cmd_status(app: &App) -> Result<()> {
    println!("palank-fusion v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", app.config.data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (벡터 검색 비활성)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match app.store.stats() {
        Ok(stats) => {
            println!("[OK] 문서: {} 건 ({} 청크)", stats.document_count, stats.chunk_count);
            println!("[OK] FAQ: {} 건", stats.faq_count);
            println!("     콘텐츠 크기: {}", format_bytes(stats.total_content_bytes));
        }
        Err(e) => println!("[!] 통계 조회 실패: {}", e),
    }

    let index_path = app.config.vector_index_path();
    if index_path.exists() {
        match LanceVectorIndex::open(&index_path).await {
            Ok(index) => match index.count().await {
                Ok(count) => println!("[OK] 벡터 인덱스: {} 청크", count),
                Err(e) => println!("[!] 벡터 인덱스 조회 실패: {}", e),
            },
            Err(e) => println!("[!] 벡터 인덱스 열기 실패: {}", e),
        }
    } else {
        println!("[!] 벡터 인덱스 없음: {}", index_path.display());
    }

    match app.sink.count() {
        Ok(count) => println!("[OK] 분석 기록: {} 건", count),
        Err(e) => println!("[!] 분석 기록 조회 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_app() -> (TempDir, App) {
        let dir = TempDir::new().unwrap();
        let config = SearchConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let app = App::open(config).unwrap();
        (dir, app)
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("Q: a\n\nA: b", 20), "Q: a  A: b");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate_text("안녕하세요 세계", 5), "안녕하세요...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_cli_parses_search_flags() {
        let cli = Cli::try_parse_from(["palank-fusion", "search", "clover fees", "--limit", "3", "--json"]).unwrap();
        match cli.command {
            Commands::Search { query, limit, user, json } => {
                assert_eq!(query, "clover fees");
                assert_eq!(limit, 3);
                assert!(user.is_none());
                assert!(json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[tokio::test]
    async fn test_import_then_search() {
        let (dir, app) = test_app();

        let file = dir.path().join("import.json");
        std::fs::write(
            &file,
            r#"{
                "faqs": [
                    {"question": "How much does Clover cost?", "answer": "See the rate sheet.", "tags": ["clover"]}
                ],
                "documents": [
                    {"name": "Clover Rate Sheet", "category": "pricing", "chunks": [{"content": "clover flex fees"}]}
                ]
            }"#,
        )
        .unwrap();

        cmd_import(&app, &file).unwrap();
        let stats = app.store.stats().unwrap();
        assert_eq!(stats.faq_count, 1);
        assert_eq!(stats.document_count, 1);

        let engine = app.engine().await;
        let results = engine.search("clover", 10, Some("tester")).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].id.starts_with("faq-"));
        assert!(results.iter().any(|r| r.id.starts_with("doc-")));
        assert_eq!(app.sink.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tracker_is_restored_from_disk() {
        let dir = TempDir::new().unwrap();
        let config = SearchConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        {
            let app = App::open(config.clone()).unwrap();
            let engine = app.engine().await;
            engine.search("nothing matches this", 10, None).await.unwrap();
            engine.search("nothing matches this", 10, None).await.unwrap();
        }

        let app = App::open(config).unwrap();
        let poor = app.tracker.poor_performing_queries(5);
        assert_eq!(poor.len(), 1);
        assert_eq!(poor[0].search_count, 2);

        cmd_cleanup(&app).unwrap();
        assert_eq!(app.sink.count().unwrap(), 2);
    }
}
