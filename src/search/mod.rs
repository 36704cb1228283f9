//! Search 모듈 - 멀티소스 융합 검색
//!
//! - Expansion: 동의어/치환 규칙 테이블로 쿼리 변형 생성
//! - Sources: FAQ/벡터/키워드 소스 트레이트와 타임아웃 래퍼
//! - Fusion: 소스 우선순위 기반 병합 + 교차 소스 부스트
//! - Scorer: 곱셈 부스트 합성 후 정렬/절단
//! - Engine: 위 단계를 묶는 검색 진입점

mod engine;
mod expansion;
mod fusion;
mod scorer;
mod sources;
mod types;

// Re-exports
pub use engine::{FusionSearchEngine, SearchError, DEFAULT_LIMIT};
pub use expansion::{
    extract_key_terms, QueryExpander, SubstitutionRule, TermGroup, SUBSTITUTION_RULES, TERM_GROUPS,
};
pub use fusion::{dedup_vector_batches, fuse, FusedResults, CROSS_SOURCE_BOOST};
pub use scorer::{rank, score, source_multiplier, RelevanceScorer};
pub use sources::{guarded, KeywordSource, QaSource, VectorSource};
pub use types::{Metadata, MetadataValue, ResultSource, SearchResult, DOCUMENT_NAME_KEY};
