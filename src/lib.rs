//! palank-fusion - 멀티소스 융합 검색 엔진
//!
//! 큐레이션 FAQ, 시맨틱 벡터 인덱스, 관계형 키워드 검색을 병렬로 조회하고
//! 하나의 랭킹으로 합칩니다. 검색마다 분석 기록을 남겨
//! 자주 실패하는 쿼리를 찾아냅니다.

pub mod analytics;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod knowledge;
pub mod search;

// Re-exports
pub use analytics::{AnalyticsSink, AnalyticsTracker, PoorQuery, SearchAnalyticsRecord, SearchInsights, SqliteAnalyticsSink};
pub use config::SearchConfig;
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use knowledge::{DocumentKeywordSource, FaqSource, KnowledgeStore, LanceVectorIndex, SemanticSource, VectorIndex};
pub use search::{
    FusionSearchEngine, KeywordSource, QaSource, QueryExpander, ResultSource, SearchError, SearchResult,
    VectorSource,
};
