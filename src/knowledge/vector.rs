//! Vector Index - 읽기 전용 벡터 검색 트레이트
//!
//! 인덱스는 외부 인제스트 파이프라인이 채웁니다. 검색 경로에서는 조회만 합니다.

use anyhow::Result;
use async_trait::async_trait;

/// 벡터 임베딩 차원 (Gemini gemini-embedding-001 기본값)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
pub const EMBEDDING_DIMENSION: i32 = 768;

/// 벡터 검색 결과 1건
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// 문서 ID (documents.id)
    pub doc_id: i64,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 유사도 스코어 (0.0 ~ 1.0)
    pub similarity: f32,
}

/// 벡터 인덱스 트레이트 (async)
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 최근접 이웃 검색 (유사도 내림차순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>>;

    /// 인덱스된 벡터 수
    async fn count(&self) -> Result<usize>;
}

/// L2 거리를 (0, 1] 유사도로 변환
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_similarity() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert_eq!(distance_to_similarity(1.0), 0.5);
        assert!(distance_to_similarity(9.0) < distance_to_similarity(1.0));
        // 음수 거리는 0으로 취급
        assert_eq!(distance_to_similarity(-0.5), 1.0);
    }
}
