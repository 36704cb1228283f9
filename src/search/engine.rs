//! 융합 검색 엔진 - 검색 진입점
//!
//! 쿼리 -> 확장 -> 소스 병렬 호출 -> 융합/중복 제거 -> 스코어링 -> 분석 기록
//!
//! 호출자가 반환 future를 drop하면 진행 중인 소스 호출도 함께 취소됩니다.

use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use crate::analytics::AnalyticsTracker;
use crate::config::SearchConfig;

use super::expansion::{extract_key_terms, QueryExpander};
use super::fusion::fuse;
use super::scorer::rank;
use super::sources::{guarded, KeywordSource, QaSource, VectorSource};
use super::types::{ResultSource, SearchResult};

/// 기본 결과 개수
pub const DEFAULT_LIMIT: usize = 10;

// ============================================================================
// Errors
// ============================================================================

/// 검색 입력 오류 (호출자에게 보이는 유일한 실패)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("limit must be at least 1 (got {0})")]
    InvalidLimit(usize),
}

// ============================================================================
// FusionSearchEngine
// ============================================================================

/// 멀티소스 융합 검색 엔진
///
/// 소스가 `None`이면 해당 소스는 비활성으로 간주해 빈 결과를 기여합니다.
pub struct FusionSearchEngine {
    qa: Option<Arc<dyn QaSource>>,
    vector: Option<Arc<dyn VectorSource>>,
    keyword: Option<Arc<dyn KeywordSource>>,
    expander: QueryExpander,
    analytics: Arc<AnalyticsTracker>,
    config: SearchConfig,
}

impl FusionSearchEngine {
    /// 소스 없이 생성 (빌더로 소스 연결)
    pub fn new(config: SearchConfig, analytics: Arc<AnalyticsTracker>) -> Self {
        Self {
            qa: None,
            vector: None,
            keyword: None,
            expander: QueryExpander::new(),
            analytics,
            config,
        }
    }

    pub fn with_qa_source(mut self, source: Arc<dyn QaSource>) -> Self {
        self.qa = Some(source);
        self
    }

    pub fn with_vector_source(mut self, source: Arc<dyn VectorSource>) -> Self {
        self.vector = Some(source);
        self
    }

    pub fn with_keyword_source(mut self, source: Arc<dyn KeywordSource>) -> Self {
        self.keyword = Some(source);
        self
    }

    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = expander;
        self
    }

    /// 분석 추적기
    pub fn analytics(&self) -> &AnalyticsTracker {
        &self.analytics
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// 융합 검색
    ///
    /// # Arguments
    /// * `query` - 검색 쿼리 (trim 후 비어 있으면 안 됨)
    /// * `limit` - 최대 결과 수 (1 이상)
    /// * `user_id` - 분석 기록용 사용자 ID
    ///
    /// # Returns
    /// 점수 내림차순, id 중복 없는 결과 (최대 `limit`개)
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        user_id: Option<&str>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if limit == 0 {
            return Err(SearchError::InvalidLimit(limit));
        }

        let variations = self.expander.expand(query);
        let terms = extract_key_terms(query);
        let timeout = self.config.source_timeout;

        tracing::debug!("Searching {:?} with {} variations, terms={:?}", query, variations.len(), terms);

        let qa_call = async {
            match &self.qa {
                Some(source) => guarded(ResultSource::Faq, query, timeout, source.search_qa(query)).await,
                None => Vec::new(),
            }
        };

        let vector_calls = async {
            match &self.vector {
                Some(source) => {
                    join_all(variations.iter().map(|variation| {
                        guarded(ResultSource::Vector, variation, timeout, source.search_vectors(variation))
                    }))
                    .await
                }
                None => Vec::new(),
            }
        };

        let keyword_call = async {
            match &self.keyword {
                Some(source) => {
                    guarded(ResultSource::Keyword, query, timeout, source.search_keywords(query, &terms)).await
                }
                None => Vec::new(),
            }
        };

        let (qa_results, vector_batches, keyword_results) =
            tokio::join!(qa_call, vector_calls, keyword_call);

        tracing::debug!(
            "Source hits: faq={}, vector={}, keyword={}",
            qa_results.len(),
            vector_batches.iter().map(Vec::len).sum::<usize>(),
            keyword_results.len()
        );

        let fused = fuse(qa_results, vector_batches, keyword_results);
        let results = rank(fused.into_vec(), query, limit);

        self.record_analytics(query, &results, user_id).await;

        tracing::info!("Search {:?}: {} results", query, results.len());

        Ok(results)
    }

    /// 인메모리 기록은 즉시, 싱크 저장은 블로킹 풀에서 소스 타임아웃 안에 수행
    ///
    /// 타임아웃이 지나면 응답을 먼저 돌려주고 저장은 백그라운드에서 끝납니다.
    async fn record_analytics(&self, query: &str, results: &[SearchResult], user_id: Option<&str>) {
        let record = self.analytics.record(query, results, user_id);
        if !self.analytics.has_sink() {
            return;
        }

        let tracker = self.analytics.clone();
        let timeout = self.config.source_timeout;
        let persist = tokio::task::spawn_blocking(move || tracker.persist_record(&record));

        match tokio::time::timeout(timeout, persist).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Analytics persist task failed: {}", e),
            Err(_) => tracing::warn!(
                "Analytics persist still running after {:?}, not waiting for {:?}",
                timeout,
                query
            ),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{AnalyticsSink, SearchAnalyticsRecord};
    use crate::search::types::DOCUMENT_NAME_KEY;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    // ------------------------------------------------------------------
    // Mock sources
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MockQa {
        results: Vec<SearchResult>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QaSource for MockQa {
        async fn search_qa(&self, _query: &str) -> Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.results.clone())
        }
    }

    /// 변형별 결과 + 호출된 변형 기록
    #[derive(Default)]
    struct MockVector {
        by_variation: HashMap<String, Vec<SearchResult>>,
        delay: Option<Duration>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VectorSource for MockVector {
        async fn search_vectors(&self, query: &str) -> Result<Vec<SearchResult>> {
            self.seen.lock().unwrap().push(query.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.by_variation.get(query).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct MockKeyword {
        results: Vec<SearchResult>,
        fail: bool,
    }

    #[async_trait]
    impl KeywordSource for MockKeyword {
        async fn search_keywords(&self, _query: &str, terms: &[String]) -> Result<Vec<SearchResult>> {
            if self.fail {
                anyhow::bail!("database connection lost");
            }
            assert!(!terms.is_empty());
            Ok(self.results.clone())
        }
    }

    fn config() -> SearchConfig {
        SearchConfig {
            source_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn vector_hit(id: &str, name: &str, score: f64) -> SearchResult {
        SearchResult::new(id, score, format!("{} body", name), ResultSource::Vector)
            .with_meta(DOCUMENT_NAME_KEY, name)
    }

    fn engine(
        qa: MockQa,
        vector: MockVector,
        keyword: MockKeyword,
    ) -> (FusionSearchEngine, Arc<MockQa>, Arc<MockVector>) {
        let qa = Arc::new(qa);
        let vector = Arc::new(vector);
        let engine = FusionSearchEngine::new(config(), Arc::new(AnalyticsTracker::new()))
            .with_qa_source(qa.clone())
            .with_vector_source(vector.clone())
            .with_keyword_source(Arc::new(keyword));
        (engine, qa, vector)
    }

    // ------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_square_pricing_scenario() {
        let qa = MockQa {
            results: vec![SearchResult::new("doc-A", 0.95, "Q: Square fees?\n\nA: 2.6% + 10c", ResultSource::Faq)],
            ..Default::default()
        };

        let mut by_variation = HashMap::new();
        for variation in ["square pricing", "square rates"] {
            by_variation.insert(
                variation.to_string(),
                vec![vector_hit("doc-A", "Square Guide", 0.7), vector_hit("doc-B", "Rates Sheet", 0.6)],
            );
        }
        let vector = MockVector { by_variation, ..Default::default() };

        let keyword = MockKeyword {
            results: vec![SearchResult::new("doc-A", 0.5, "Square keyword hit", ResultSource::Keyword)],
            ..Default::default()
        };

        let (engine, _, vector) = engine(qa, vector, keyword);
        let results = engine.search("square pricing", 10, None).await.unwrap();

        assert_eq!(results.len(), 2);

        let a = results.iter().find(|r| r.id == "doc-A").unwrap();
        assert_eq!(a.source, ResultSource::Faq);
        assert_eq!(a.content, "Q: Square fees?\n\nA: 2.6% + 10c");
        assert_eq!(a.score, 1.0);

        let b = results.iter().find(|r| r.id == "doc-B").unwrap();
        assert_eq!(b.source, ResultSource::Vector);
        assert!((b.score - 0.6 * 1.1).abs() < 1e-9);

        // 모든 변형이 한 번씩만 호출됨
        let seen = vector.seen.lock().unwrap().clone();
        let unique: HashSet<&String> = seen.iter().collect();
        assert_eq!(seen.len(), unique.len());
        assert!(seen.contains(&"square pricing".to_string()));
        assert!(seen.contains(&"square rates".to_string()));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_before_sources() {
        let (engine, qa, vector) = engine(MockQa::default(), MockVector::default(), MockKeyword::default());

        assert_eq!(engine.search("", 10, None).await, Err(SearchError::EmptyQuery));
        assert_eq!(engine.search("   ", 10, None).await, Err(SearchError::EmptyQuery));
        assert_eq!(engine.search("fees", 0, None).await, Err(SearchError::InvalidLimit(0)));

        assert_eq!(qa.calls.load(Ordering::SeqCst), 0);
        assert!(vector.seen.lock().unwrap().is_empty());
        assert!(engine.analytics().export_records().is_empty());
    }

    #[tokio::test]
    async fn test_vector_timeout_degrades_gracefully() {
        let qa = MockQa {
            results: vec![SearchResult::new("faq-1", 0.95, "Q: chargebacks\n\nA: ...", ResultSource::Faq)],
            ..Default::default()
        };

        let mut by_variation = HashMap::new();
        by_variation.insert("chargeback window".to_string(), vec![vector_hit("doc-9", "Late", 0.99)]);
        let vector = MockVector {
            by_variation,
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        };

        let keyword = MockKeyword {
            results: vec![
                SearchResult::new("doc-1", 0.7, "chargeback window is 120 days", ResultSource::Keyword),
                SearchResult::new("doc-2", 0.35, "dispute overview", ResultSource::Keyword),
            ],
            ..Default::default()
        };

        let (engine, _, _) = engine(qa, vector, keyword);
        let results = engine.search("chargeback window", 10, None).await.unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["faq-1", "doc-1", "doc-2"]);
        assert!((results[1].score - 0.84).abs() < 1e-9);
        assert!((results[2].score - 0.35).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_keyword_source_is_isolated() {
        let qa = MockQa {
            results: vec![SearchResult::new("faq-3", 0.95, "Q: x\n\nA: y", ResultSource::Faq)],
            ..Default::default()
        };
        let keyword = MockKeyword { fail: true, ..Default::default() };

        let (engine, _, _) = engine(qa, MockVector::default(), keyword);
        let results = engine.search("batch settlement", 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "faq-3");
    }

    #[tokio::test]
    async fn test_results_are_sorted_bounded_and_unique() {
        let keyword = MockKeyword {
            results: (0..20)
                .map(|i| SearchResult::new(format!("doc-{}", i % 12), (i as f64) / 25.0, "x", ResultSource::Keyword))
                .collect(),
            ..Default::default()
        };

        let (engine, _, _) = engine(MockQa::default(), MockVector::default(), keyword);
        let results = engine.search("terminal", 5, None).await.unwrap();

        assert_eq!(results.len(), 5);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
        let unique: HashSet<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(unique.len(), results.len());
    }

    #[tokio::test]
    async fn test_repeated_empty_searches_surface_as_poor_query() {
        let (engine, _, _) = engine(MockQa::default(), MockVector::default(), MockKeyword::default());

        for _ in 0..10 {
            let results = engine.search("Hubwallet Refunds", 10, Some("rep-1")).await.unwrap();
            assert!(results.is_empty());
        }

        let poor = engine.analytics().poor_performing_queries(1);
        assert_eq!(poor[0].query, "hubwallet refunds");
        assert_eq!(poor[0].search_count, 10);
        assert_eq!(poor[0].average_score, 0.0);
    }

    struct SlowSink {
        delay: Duration,
        persisted: Arc<AtomicUsize>,
    }

    impl AnalyticsSink for SlowSink {
        fn persist(&self, _record: &SearchAnalyticsRecord) -> Result<()> {
            std::thread::sleep(self.delay);
            self.persisted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_analytics_sink_does_not_delay_response() {
        let persisted = Arc::new(AtomicUsize::new(0));
        let tracker = AnalyticsTracker::new().with_sink(Box::new(SlowSink {
            delay: Duration::from_secs(1),
            persisted: persisted.clone(),
        }));
        let engine = FusionSearchEngine::new(config(), Arc::new(tracker));

        let started = std::time::Instant::now();
        let results = engine.search("clover fees", 10, None).await.unwrap();

        assert!(results.is_empty());
        assert!(started.elapsed() < Duration::from_millis(500));
        // 응답 전에 인메모리 로그에는 이미 기록됨
        assert_eq!(engine.analytics().export_records().len(), 1);
        assert_eq!(persisted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fast_analytics_sink_is_written_before_return() {
        let persisted = Arc::new(AtomicUsize::new(0));
        let tracker = AnalyticsTracker::new().with_sink(Box::new(SlowSink {
            delay: Duration::ZERO,
            persisted: persisted.clone(),
        }));
        let engine = FusionSearchEngine::new(config(), Arc::new(tracker));

        engine.search("clover fees", 10, None).await.unwrap();
        assert_eq!(persisted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_sources_contribute_nothing() {
        let engine = FusionSearchEngine::new(config(), Arc::new(AnalyticsTracker::new()));
        let results = engine.search("anything", 3, None).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(engine.analytics().export_records().len(), 1);
    }
}
