//! Knowledge Store 소스 어댑터
//!
//! SQLite 호출은 블로킹이므로 `spawn_blocking`에서 실행합니다.
//! 그래야 엔진의 소스 타임아웃이 실제로 발동합니다.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::store::{ChunkRow, FaqEntry, KnowledgeStore};
use crate::search::{
    KeywordSource, Metadata, MetadataValue, QaSource, ResultSource, SearchResult, DOCUMENT_NAME_KEY,
};

/// FAQ 매칭 고정 점수
pub const FAQ_SCORE: f64 = 0.95;

/// 키워드 매칭 최대 점수 (모든 용어 일치 시)
pub const KEYWORD_MAX_SCORE: f64 = 0.7;

// ============================================================================
// FAQ Source
// ============================================================================

/// `faq_entries` 테이블 기반 Q&A 소스
#[derive(Clone)]
pub struct FaqSource {
    store: KnowledgeStore,
    limit: usize,
}

impl FaqSource {
    pub fn new(store: KnowledgeStore, limit: usize) -> Self {
        Self { store, limit }
    }
}

#[async_trait]
impl QaSource for FaqSource {
    async fn search_qa(&self, query: &str) -> Result<Vec<SearchResult>> {
        let store = self.store.clone();
        let query = query.to_string();
        let limit = self.limit;

        let entries = tokio::task::spawn_blocking(move || store.search_faq(&query, limit))
            .await
            .context("FAQ search task failed")??;

        Ok(entries.into_iter().map(faq_to_result).collect())
    }
}

fn faq_to_result(faq: FaqEntry) -> SearchResult {
    let mut result = SearchResult::new(
        format!("faq-{}", faq.id),
        FAQ_SCORE,
        format!("Q: {}\n\nA: {}", faq.question, faq.answer),
        ResultSource::Faq,
    )
    .with_meta("type", "faq")
    .with_meta("tags", faq.tags.join(","))
    .with_meta("priority", faq.priority);

    if let Some(category) = faq.category {
        result = result.with_meta("category", category);
    }
    result
}

// ============================================================================
// Keyword Source
// ============================================================================

/// `documents` + `document_chunks` 기반 키워드 소스
#[derive(Clone)]
pub struct DocumentKeywordSource {
    store: KnowledgeStore,
    limit: usize,
}

impl DocumentKeywordSource {
    pub fn new(store: KnowledgeStore, limit: usize) -> Self {
        Self { store, limit }
    }
}

#[async_trait]
impl KeywordSource for DocumentKeywordSource {
    async fn search_keywords(&self, _query: &str, terms: &[String]) -> Result<Vec<SearchResult>> {
        if terms.is_empty() {
            return Ok(vec![]);
        }

        let store = self.store.clone();
        let owned_terms = terms.to_vec();
        let limit = self.limit;

        let rows = tokio::task::spawn_blocking(move || store.search_chunks(&owned_terms, limit))
            .await
            .context("Keyword search task failed")??;

        Ok(best_row_per_document(rows, terms))
    }
}

/// 문서별로 가장 점수가 높은 행만 남김 (첫 등장 순서 유지)
fn best_row_per_document(rows: Vec<ChunkRow>, terms: &[String]) -> Vec<SearchResult> {
    let mut order: Vec<SearchResult> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();

    for row in rows {
        let score = term_coverage(&row, terms) * KEYWORD_MAX_SCORE;

        match index.get(&row.doc_id) {
            Some(&pos) => {
                if score > order[pos].score {
                    order[pos] = row_to_result(row, score);
                }
            }
            None => {
                index.insert(row.doc_id, order.len());
                order.push(row_to_result(row, score));
            }
        }
    }

    order
}

/// 일치한 용어 비율 (0.0 ~ 1.0)
fn term_coverage(row: &ChunkRow, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }

    let name = row.doc_name.to_lowercase();
    let content = row.content.as_deref().unwrap_or_default().to_lowercase();

    let matched = terms
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|t| name.contains(t.as_str()) || content.contains(t.as_str()))
        .count();

    matched as f64 / terms.len() as f64
}

fn row_to_result(row: ChunkRow, score: f64) -> SearchResult {
    let content = match row.content {
        Some(text) => text,
        None => format!("Document: {}", row.doc_name),
    };

    // 청크 메타데이터를 먼저 깔고 고정 키로 덮어씀
    let mut metadata = row.metadata.as_ref().map(json_to_metadata).unwrap_or_default();
    metadata.insert(DOCUMENT_NAME_KEY.to_string(), MetadataValue::from(row.doc_name));
    metadata.insert("type".to_string(), MetadataValue::from("document"));
    if let Some(chunk_index) = row.chunk_index {
        metadata.insert("chunk_index".to_string(), MetadataValue::from(chunk_index));
    }

    let mut result = SearchResult::new(format!("doc-{}", row.doc_id), score, content, ResultSource::Keyword);
    result.metadata = metadata;
    result
}

/// JSON 객체의 스칼라 값만 메타데이터로 변환
///
/// 배열은 쉼표로 이어 붙이고, 중첩 객체와 null은 버립니다.
fn json_to_metadata(value: &serde_json::Value) -> Metadata {
    let mut metadata = Metadata::new();
    let Some(object) = value.as_object() else {
        return metadata;
    };

    for (key, value) in object {
        let converted = match value {
            serde_json::Value::String(s) => Some(MetadataValue::from(s.as_str())),
            serde_json::Value::Number(n) => n.as_f64().map(MetadataValue::from),
            serde_json::Value::Bool(b) => Some(MetadataValue::from(*b)),
            serde_json::Value::Array(items) => Some(MetadataValue::from(
                items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
            )),
            _ => None,
        };
        if let Some(converted) = converted {
            metadata.insert(key.clone(), converted);
        }
    }

    metadata
}

// ============================================================================
// Tests
// ============================================================================
