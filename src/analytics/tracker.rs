//! Analytics Tracker - 인메모리 검색 로그 + 실패 쿼리 빈도 인덱스
//!
//! 로그와 빈도 인덱스는 하나의 `RwLock` 안에 있어서
//! 기록 1건이 절반만 보이는 일이 없습니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DEFAULT_QUALITY_THRESHOLD, DEFAULT_RETENTION_DAYS};
use crate::search::{QueryExpander, SearchResult};

use super::sink::AnalyticsSink;

/// `search_insights`에 포함할 실패 쿼리 수
const INSIGHT_TOP_POOR_QUERIES: usize = 10;

/// 실패 패턴 테이블: (마커 부분 문자열, 메시지)
pub const FAILURE_PATTERNS: &[(&[&str], &str)] = &[
    (&["pricing", "rates"], "Pricing/rates information requests often fail"),
    (&["api", "documentation"], "Technical documentation queries need improvement"),
    (&["compare", "vs"], "Comparison queries lack comprehensive data"),
];

// ============================================================================
// Types
// ============================================================================

/// 검색 1회 기록 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchAnalyticsRecord {
    pub id: Uuid,
    /// 정규화된 쿼리 (소문자, trim)
    pub query: String,
    pub result_count: usize,
    pub average_score: f64,
    /// 결과에 등장한 소스 이름 (중복 없음)
    pub sources: Vec<String>,
    pub user_id: Option<String>,
    pub has_good_results: bool,
    pub timestamp: DateTime<Utc>,
}

impl SearchAnalyticsRecord {
    /// 최종 결과 목록으로 기록 생성
    pub fn from_results(
        query: &str,
        results: &[SearchResult],
        user_id: Option<&str>,
        quality_threshold: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let average_score = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64
        };

        let sources: BTreeSet<&str> = results.iter().map(|r| r.source.as_str()).collect();

        Self {
            id: Uuid::new_v4(),
            query: normalize_query(query),
            result_count: results.len(),
            average_score,
            sources: sources.into_iter().map(str::to_string).collect(),
            user_id: user_id.map(str::to_string),
            has_good_results: !results.is_empty() && average_score >= quality_threshold,
            timestamp,
        }
    }
}

/// 성능이 나쁜 쿼리 집계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoorQuery {
    pub query: String,
    /// 실패 횟수
    pub search_count: usize,
    /// 해당 쿼리 전체 기록의 평균 점수
    pub average_score: f64,
    pub suggested_keywords: Vec<String>,
}

/// 시스템 전체 검색 인사이트
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchInsights {
    pub total_searches: usize,
    pub success_rate: f64,
    pub average_result_count: f64,
    pub top_poor_queries: Vec<PoorQuery>,
    pub common_failure_patterns: Vec<String>,
}

// ============================================================================
// AnalyticsTracker
// ============================================================================

#[derive(Default)]
struct AnalyticsLog {
    records: Vec<SearchAnalyticsRecord>,
    poor_counts: HashMap<String, usize>,
}

impl AnalyticsLog {
    fn append(&mut self, record: SearchAnalyticsRecord) {
        if !record.has_good_results {
            *self.poor_counts.entry(record.query.clone()).or_insert(0) += 1;
        }
        self.records.push(record);
    }

    fn rebuild_index(&mut self) {
        self.poor_counts.clear();
        for record in self.records.iter().filter(|r| !r.has_good_results) {
            *self.poor_counts.entry(record.query.clone()).or_insert(0) += 1;
        }
    }
}

/// 검색 분석 추적기
///
/// 검색 엔진에 참조로 주입합니다. 테스트마다 독립 인스턴스를 만들 수 있습니다.
pub struct AnalyticsTracker {
    log: RwLock<AnalyticsLog>,
    sink: Option<Box<dyn AnalyticsSink>>,
    expander: QueryExpander,
    quality_threshold: f64,
    retention: Duration,
}

impl Default for AnalyticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsTracker {
    /// 영속화 없는 인메모리 추적기
    pub fn new() -> Self {
        Self {
            log: RwLock::new(AnalyticsLog::default()),
            sink: None,
            expander: QueryExpander::new(),
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    /// 영속화 싱크 연결
    pub fn with_sink(mut self, sink: Box<dyn AnalyticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 품질 임계값 지정
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// 보존 기간 지정
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// 기존 기록 복원 (빈도 인덱스 재구성)
    pub fn with_records(self, records: Vec<SearchAnalyticsRecord>) -> Self {
        {
            let mut log = self.write_log();
            log.records = records;
            log.rebuild_index();
        }
        self
    }

    /// 검색 결과 기록 (인메모리 기록 + 싱크 저장)
    ///
    /// 싱크 저장 실패는 로그만 남기고 인메모리 상태와 호출자에 영향을 주지 않습니다.
    /// 비동기 경로에서는 `record` 후 `persist_record`를 블로킹 풀에서 호출합니다.
    pub fn track(&self, query: &str, results: &[SearchResult], user_id: Option<&str>) {
        let record = self.record(query, results, user_id);
        self.persist_record(&record);
    }

    /// 인메모리 로그에만 기록하고 기록 사본을 반환
    pub fn record(&self, query: &str, results: &[SearchResult], user_id: Option<&str>) -> SearchAnalyticsRecord {
        let record = SearchAnalyticsRecord::from_results(
            query,
            results,
            user_id,
            self.quality_threshold,
            Utc::now(),
        );

        tracing::debug!(
            "Tracked search {:?}: {} results, avg {:.3}, good={}",
            record.query,
            record.result_count,
            record.average_score,
            record.has_good_results
        );

        self.write_log().append(record.clone());
        record
    }

    /// 싱크에 저장 (블로킹, 실패는 경고 후 버림)
    pub fn persist_record(&self, record: &SearchAnalyticsRecord) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.persist(record) {
                tracing::warn!("Failed to persist search analytics for {:?}: {:#}", record.query, e);
            }
        }
    }

    /// 싱크 연결 여부
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// 실패 빈도 상위 쿼리
    ///
    /// 빈도 내림차순, 동률이면 쿼리 문자열 오름차순.
    pub fn poor_performing_queries(&self, limit: usize) -> Vec<PoorQuery> {
        let log = self.read_log();

        let mut ranked: Vec<(&String, usize)> =
            log.poor_counts.iter().map(|(q, &count)| (q, count)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(limit);

        ranked
            .into_iter()
            .map(|(query, search_count)| {
                let (sum, n) = log
                    .records
                    .iter()
                    .filter(|r| &r.query == query)
                    .fold((0.0, 0usize), |(sum, n), r| (sum + r.average_score, n + 1));

                PoorQuery {
                    query: query.clone(),
                    search_count,
                    average_score: if n > 0 { sum / n as f64 } else { 0.0 },
                    suggested_keywords: self.expander.suggest_keywords(query),
                }
            })
            .collect()
    }

    /// 시스템 전체 인사이트
    pub fn search_insights(&self) -> SearchInsights {
        let top_poor_queries = self.poor_performing_queries(INSIGHT_TOP_POOR_QUERIES);
        let log = self.read_log();

        let total_searches = log.records.len();
        let successful = log.records.iter().filter(|r| r.has_good_results).count();
        let total_results: usize = log.records.iter().map(|r| r.result_count).sum();

        let (success_rate, average_result_count) = if total_searches > 0 {
            (
                successful as f64 / total_searches as f64,
                total_results as f64 / total_searches as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let failed: Vec<&str> = log
            .records
            .iter()
            .filter(|r| !r.has_good_results)
            .map(|r| r.query.as_str())
            .collect();

        let common_failure_patterns = FAILURE_PATTERNS
            .iter()
            .filter(|(markers, _)| failed.iter().any(|q| markers.iter().any(|m| q.contains(m))))
            .map(|(_, message)| message.to_string())
            .collect();

        SearchInsights {
            total_searches,
            success_rate,
            average_result_count,
            top_poor_queries,
            common_failure_patterns,
        }
    }

    /// 로그 사본
    pub fn export_records(&self) -> Vec<SearchAnalyticsRecord> {
        self.read_log().records.clone()
    }

    /// 보존 기간이 지난 기록 제거 후 빈도 인덱스 재구성
    ///
    /// 제거된 기록 수를 반환합니다.
    pub fn cleanup(&self) -> usize {
        self.cleanup_before(Utc::now() - self.retention)
    }

    /// `cutoff` 이전(포함) 기록 제거
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut log = self.write_log();

        let before = log.records.len();
        log.records.retain(|r| r.timestamp > cutoff);
        log.rebuild_index();

        let removed = before - log.records.len();
        if removed > 0 {
            tracing::info!("Removed {} search analytics records older than {}", removed, cutoff);
        }
        removed
    }

    /// 보존 기간 경계 시각
    pub fn retention_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - self.retention
    }

    // 락 오염(poison)은 복구해서 계속 사용
    fn read_log(&self) -> RwLockReadGuard<'_, AnalyticsLog> {
        self.log.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_log(&self) -> RwLockWriteGuard<'_, AnalyticsLog> {
        self.log.write().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn append_record(&self, record: SearchAnalyticsRecord) {
        self.write_log().append(record);
    }
}

/// 쿼리 정규화 (소문자 + trim)
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

// ============================================================================
// Tests
// ============================================================================
