//! 관련도 스코어러 - 곱셈 부스트 합성
//!
//! 최종 점수 = min(1.0, score x 구문 보너스 x 소스 가중치 x 제목 용어 보너스 x (1 + 교차 소스 부스트))
//!
//! 교차 소스 부스트는 융합 단계의 x1.15에 더해 여기서 한 번 더 적용됩니다.

use super::expansion::extract_key_terms;
use super::types::{ResultSource, SearchResult};

/// 쿼리 전체가 내용/문서 이름에 포함될 때의 배수
pub const EXACT_PHRASE_MULTIPLIER: f64 = 1.2;

/// 문서 이름에 포함된 용어 1개당 증가분
pub const TITLE_TERM_STEP: f64 = 0.1;

/// 소스 가중치
pub fn source_multiplier(source: ResultSource) -> f64 {
    match source {
        ResultSource::Faq => 1.3,
        ResultSource::Vector => 1.1,
        ResultSource::Keyword => 1.0,
    }
}

/// 쿼리 단위 스코어러
///
/// 핵심 용어 추출을 결과마다 반복하지 않도록 쿼리별로 한 번 만듭니다.
pub struct RelevanceScorer {
    query_lower: String,
    key_terms: Vec<String>,
}

impl RelevanceScorer {
    pub fn new(original_query: &str) -> Self {
        Self {
            query_lower: original_query.to_lowercase(),
            key_terms: extract_key_terms(original_query),
        }
    }

    /// 최종 배수 계산
    pub fn multiplier(&self, result: &SearchResult) -> f64 {
        let content = result.content.to_lowercase();
        let doc_name = result.document_name().unwrap_or_default().to_lowercase();

        let mut multiplier = 1.0;

        if content.contains(&self.query_lower) || doc_name.contains(&self.query_lower) {
            multiplier *= EXACT_PHRASE_MULTIPLIER;
        }

        multiplier *= source_multiplier(result.source);

        let name_matches = self
            .key_terms
            .iter()
            .filter(|term| doc_name.contains(term.as_str()))
            .count();
        if name_matches > 0 {
            multiplier *= 1.0 + name_matches as f64 * TITLE_TERM_STEP;
        }

        if let Some(boost) = result.relevance_boost {
            if boost != 0.0 {
                multiplier *= 1.0 + boost;
            }
        }

        multiplier
    }

    /// 점수 확정 (0.0 ~ 1.0 범위로 고정)
    pub fn score(&self, mut result: SearchResult) -> SearchResult {
        result.score = (result.score * self.multiplier(&result)).clamp(0.0, 1.0);
        result
    }
}

/// 단건 스코어링
pub fn score(result: SearchResult, original_query: &str) -> SearchResult {
    RelevanceScorer::new(original_query).score(result)
}

/// 스코어링 후 내림차순 정렬, `limit`개로 자르기
///
/// 동점이면 입력 순서를 유지합니다 (안정 정렬).
pub fn rank(results: Vec<SearchResult>, original_query: &str, limit: usize) -> Vec<SearchResult> {
    let scorer = RelevanceScorer::new(original_query);

    let mut scored: Vec<SearchResult> = results.into_iter().map(|r| scorer.score(r)).collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored
}

// ============================================================================
// Tests
// ============================================================================
