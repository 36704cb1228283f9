//! Knowledge 모듈 - 검색 소스 구현체
//!
//! - Store: SQLite 문서/청크/FAQ 저장소
//! - Adapters: FAQ 소스, 키워드 소스 (spawn_blocking)
//! - Vector/Lance: 읽기 전용 LanceDB 벡터 인덱스
//! - Semantic: 임베딩 + 벡터 인덱스를 묶은 벡터 소스

mod adapters;
mod lance;
mod semantic;
mod store;
mod vector;

// Re-exports
pub use adapters::{DocumentKeywordSource, FaqSource, FAQ_SCORE, KEYWORD_MAX_SCORE};
pub use lance::LanceVectorIndex;
pub use semantic::SemanticSource;
pub use store::{ChunkRow, FaqEntry, KnowledgeStore, NewChunk, NewDocument, NewFaq, StoreStats};
pub use vector::{distance_to_similarity, VectorHit, VectorIndex, EMBEDDING_DIMENSION};
