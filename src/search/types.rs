//! 검색 결과 공통 타입
//!
//! 세 소스(FAQ, 벡터, 키워드)의 결과를 하나의 `SearchResult`로 정규화합니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 문서 이름 메타데이터 키
pub const DOCUMENT_NAME_KEY: &str = "document_name";

// ============================================================================
// Types
// ============================================================================

/// 검색 소스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// 큐레이션된 FAQ (최우선)
    Faq,
    /// 시맨틱 벡터 검색
    Vector,
    /// 키워드 (SQLite LIKE) 검색
    Keyword,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSource::Faq => "faq",
            ResultSource::Vector => "vector",
            ResultSource::Keyword => "keyword",
        }
    }
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 메타데이터 값 (문자열/숫자/불리언)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Flag(value)
    }
}

/// 열린 메타데이터 맵 (알 수 없는 키는 그대로 통과)
pub type Metadata = BTreeMap<String, MetadataValue>;

/// 검색 결과 1건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 문서/청크 식별자 (같은 문서면 호출 간 동일)
    pub id: String,
    /// 관련도 스코어 (0.0 ~ 1.0)
    pub score: f64,
    /// 사용자에게 보여줄 텍스트
    pub content: String,
    /// 메타데이터
    #[serde(default)]
    pub metadata: Metadata,
    /// 검색 소스
    pub source: ResultSource,
    /// 융합 단계에서 누적된 교차 소스 부스트 (스코어링 전용)
    #[serde(skip)]
    pub relevance_boost: Option<f64>,
}

impl SearchResult {
    pub fn new(
        id: impl Into<String>,
        score: f64,
        content: impl Into<String>,
        source: ResultSource,
    ) -> Self {
        Self {
            id: id.into(),
            score,
            content: content.into(),
            metadata: Metadata::new(),
            source,
            relevance_boost: None,
        }
    }

    /// 메타데이터 추가 (빌더)
    pub fn with_meta(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// 문서 이름 메타데이터
    pub fn document_name(&self) -> Option<&str> {
        self.metadata.get(DOCUMENT_NAME_KEY).and_then(|v| v.as_str())
    }

    /// 벡터 배치 중복 제거 키 (문서 이름, 없으면 id)
    pub fn dedup_key(&self) -> &str {
        self.document_name().unwrap_or(&self.id)
    }
}

// ============================================================================
// Tests
// ============================================================================
