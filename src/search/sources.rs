//! 소스 어댑터 인터페이스
//!
//! FAQ, 벡터, 키워드 세 소스의 공통 트레이트와 장애 격리 래퍼입니다.
//! 구현체는 `knowledge` 모듈에 있습니다.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::types::{ResultSource, SearchResult};

// ============================================================================
// Source Traits
// ============================================================================

/// 큐레이션된 Q&A 저장소
#[async_trait]
pub trait QaSource: Send + Sync {
    /// 질문/답변/태그가 쿼리와 겹치는 항목 검색
    async fn search_qa(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// 시맨틱 벡터 검색 프로바이더
#[async_trait]
pub trait VectorSource: Send + Sync {
    /// 쿼리 변형 1개에 대한 벡터 검색
    async fn search_vectors(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// 관계형 키워드 저장소
#[async_trait]
pub trait KeywordSource: Send + Sync {
    /// 추출된 용어로 문서/청크 검색
    async fn search_keywords(&self, query: &str, terms: &[String]) -> Result<Vec<SearchResult>>;
}

// ============================================================================
// Fault Isolation
// ============================================================================

/// 소스 호출을 타임아웃과 함께 실행
///
/// 에러나 타임아웃은 경고 로그를 남기고 빈 결과로 바뀝니다.
/// 호출자에게 에러가 전파되지 않습니다.
pub async fn guarded<F>(source: ResultSource, query: &str, timeout: Duration, call: F) -> Vec<SearchResult>
where
    F: Future<Output = Result<Vec<SearchResult>>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(results)) => {
            tracing::debug!("{} source returned {} results for {:?}", source, results.len(), query);
            results
        }
        Ok(Err(e)) => {
            tracing::warn!("{} source failed for {:?}: {:#}", source, query, e);
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("{} source timed out after {:?} for {:?}", source, timeout, query);
            Vec::new()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
