//! 결과 융합 - 소스 우선순위 기반 병합 및 중복 제거
//!
//! 우선순위: FAQ > 벡터 > 키워드.
//! 키워드 결과가 이미 있는 문서와 겹치면 내용은 유지하고 교차 소스 부스트만 적용합니다.

use std::collections::HashMap;

use super::types::{ResultSource, SearchResult};

/// 교차 소스 부스트 배수
pub const CROSS_SOURCE_BOOST: f64 = 1.15;

/// `relevance_boost`에 누적되는 증분
const CROSS_SOURCE_INCREMENT: f64 = CROSS_SOURCE_BOOST - 1.0;

// ============================================================================
// FusedResults
// ============================================================================

/// 융합 결과 (id 키, 최초 삽입 순서 유지)
///
/// 순서는 점수 동률 시 안정 정렬의 기준이 됩니다.
#[derive(Debug, Default, Clone)]
pub struct FusedResults {
    entries: Vec<SearchResult>,
    index: HashMap<String, usize>,
}

impl FusedResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SearchResult> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut SearchResult> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    fn insert_new(&mut self, result: SearchResult) {
        self.index.insert(result.id.clone(), self.entries.len());
        self.entries.push(result);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchResult> {
        self.entries.iter()
    }

    /// 삽입 순서대로 결과 반환
    pub fn into_vec(self) -> Vec<SearchResult> {
        self.entries
    }
}

// ============================================================================
// Fusion
// ============================================================================

/// 점수가 NaN/무한대인 결과 제외
///
/// 이런 점수는 clamp를 통과하고 `total_cmp` 정렬에서 맨 앞에 오게 됩니다.
fn finite_only(results: Vec<SearchResult>) -> impl Iterator<Item = SearchResult> {
    results.into_iter().filter(|result| {
        let keep = result.score.is_finite();
        if !keep {
            tracing::warn!("Dropping {} result {} with non-finite score {}", result.source, result.id, result.score);
        }
        keep
    })
}

/// 벡터 배치 중복 제거
///
/// 모든 변형 배치를 통틀어 문서 이름(없으면 id)당 가장 높은 점수만 남깁니다.
pub fn dedup_vector_batches(batches: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    let mut best: Vec<SearchResult> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for result in batches.into_iter().flat_map(finite_only) {
        match by_key.get(result.dedup_key()) {
            Some(&i) => {
                if result.score > best[i].score {
                    best[i] = result;
                }
            }
            None => {
                by_key.insert(result.dedup_key().to_string(), best.len());
                best.push(result);
            }
        }
    }

    best
}

/// 세 소스 결과 융합
///
/// 점수가 유한하지 않은 결과는 어느 소스든 버립니다.
///
/// 1. FAQ 결과는 그대로 들어가고 절대 덮어쓰지 않음
/// 2. 벡터 결과는 FAQ에 없는 id만 삽입
/// 3. 키워드 결과는 이미 있는 id면 점수 x1.15 (1.0 상한) + 부스트 기록, 없으면 삽입
pub fn fuse(
    qa_results: Vec<SearchResult>,
    vector_batches: Vec<Vec<SearchResult>>,
    keyword_results: Vec<SearchResult>,
) -> FusedResults {
    let mut fused = FusedResults::new();

    for result in finite_only(qa_results) {
        if fused.get(&result.id).is_none() {
            fused.insert_new(result);
        }
    }

    for result in dedup_vector_batches(vector_batches) {
        match fused.get_mut(&result.id) {
            None => fused.insert_new(result),
            Some(existing) if existing.source == ResultSource::Faq => {
                tracing::debug!("Vector hit {} shadowed by FAQ entry", result.id);
            }
            Some(existing) => {
                // 같은 id의 다른 문서 이름 배치끼리는 높은 점수 유지
                if result.score > existing.score {
                    *existing = result;
                }
            }
        }
    }

    for result in finite_only(keyword_results) {
        match fused.get_mut(&result.id) {
            None => fused.insert_new(result),
            Some(existing) if existing.source != ResultSource::Keyword => {
                existing.score = (existing.score * CROSS_SOURCE_BOOST).min(1.0);
                existing.relevance_boost =
                    Some(existing.relevance_boost.unwrap_or(0.0) + CROSS_SOURCE_INCREMENT);
            }
            Some(existing) => {
                if result.score > existing.score {
                    *existing = result;
                }
            }
        }
    }

    fused
}

// ============================================================================
// Tests
// ============================================================================
