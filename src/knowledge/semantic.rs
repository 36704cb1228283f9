//! Semantic Source - 임베딩 + 벡터 인덱스 기반 VectorSource
//!
//! 쿼리 변형 1개 = 임베딩 1회 + 인덱스 검색 1회.
//! 결과 id는 키워드 소스와 같은 `doc-<id>` 형식이라 융합 단계에서 교차 확인됩니다.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::store::KnowledgeStore;
use super::vector::{VectorHit, VectorIndex};
use crate::embedding::EmbeddingProvider;
use crate::search::{ResultSource, SearchResult, VectorSource, DOCUMENT_NAME_KEY};

/// 시맨틱 벡터 소스
pub struct SemanticSource<E, I> {
    embedder: E,
    index: I,
    store: Option<KnowledgeStore>,
    limit: usize,
}

impl<E: EmbeddingProvider, I: VectorIndex> SemanticSource<E, I> {
    pub fn new(embedder: E, index: I, limit: usize) -> Self {
        Self {
            embedder,
            index,
            store: None,
            limit,
        }
    }

    /// 문서 이름 조회용 저장소 연결
    pub fn with_store(mut self, store: KnowledgeStore) -> Self {
        self.store = Some(store);
        self
    }

    /// doc_id -> 문서 이름 (조회 실패는 이름 없음으로 처리)
    async fn resolve_names(&self, hits: &[VectorHit]) -> HashMap<i64, String> {
        let Some(store) = self.store.clone() else {
            return HashMap::new();
        };
        let ids: BTreeSet<i64> = hits.iter().map(|h| h.doc_id).collect();

        let lookup = tokio::task::spawn_blocking(move || {
            ids.into_iter()
                .filter_map(|id| match store.document_name(id) {
                    Ok(name) => name.map(|n| (id, n)),
                    Err(e) => {
                        tracing::debug!("Document name lookup failed for {}: {}", id, e);
                        None
                    }
                })
                .collect::<HashMap<_, _>>()
        })
        .await;

        lookup.unwrap_or_else(|e| {
            tracing::warn!("Document name lookup task failed: {}", e);
            HashMap::new()
        })
    }
}

#[async_trait]
impl<E, I> VectorSource for SemanticSource<E, I>
where
    E: EmbeddingProvider,
    I: VectorIndex,
{
    async fn search_vectors(&self, query: &str) -> Result<Vec<SearchResult>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .with_context(|| format!("Failed to embed query with {}", self.embedder.name()))?;

        let hits = self.index.search(&embedding, self.limit).await?;
        let names = self.resolve_names(&hits).await;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut result = SearchResult::new(
                    format!("doc-{}", hit.doc_id),
                    f64::from(hit.similarity),
                    hit.chunk_text,
                    ResultSource::Vector,
                )
                .with_meta("type", "document")
                .with_meta("chunk_index", i64::from(hit.chunk_index));

                if let Some(name) = names.get(&hit.doc_id) {
                    result = result.with_meta(DOCUMENT_NAME_KEY, name.as_str());
                }
                result
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
