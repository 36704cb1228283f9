//! 검색 분석 모듈 - 검색 품질 추적 및 어휘 개선 제안
//!
//! - 검색마다 `SearchAnalyticsRecord`를 추가 전용 로그에 기록
//! - 결과가 나쁜 쿼리는 빈도 인덱스로 빠르게 상위 N개 조회
//! - 정리(`cleanup`)는 외부 스케줄러가 호출 (자동 실행 없음)

mod sink;
mod tracker;

// Re-exports
pub use sink::{AnalyticsSink, SqliteAnalyticsSink};
pub use tracker::{
    AnalyticsTracker, PoorQuery, SearchAnalyticsRecord, SearchInsights, FAILURE_PATTERNS,
};
