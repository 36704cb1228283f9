//! 설정 모듈 - 검색 엔진 런타임 설정
//!
//! 기본값 위에 환경변수(`PALANK_*`)를 덮어써서 구성합니다.
//! 잘못된 값은 경고만 남기고 기본값을 유지합니다.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.palank-fusion/)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PALANK_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".palank-fusion")
}

// ============================================================================
// SearchConfig
// ============================================================================

/// 소스 호출 기본 타임아웃
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

/// 좋은 검색으로 판정하는 평균 점수 하한
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.4;

/// 분석 로그 보존 기간 (일)
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// 검색 엔진 설정
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// 소스 어댑터 호출 1회당 타임아웃
    pub source_timeout: Duration,
    /// 쿼리 변형 1개당 벡터 검색 결과 수
    pub vector_limit_per_variation: usize,
    /// FAQ 검색 결과 상한
    pub faq_limit: usize,
    /// 키워드 검색 행 상한
    pub keyword_limit: usize,
    /// hasGoodResults 판정 임계값
    pub quality_threshold: f64,
    /// 분석 로그 보존 기간 (일)
    pub retention_days: i64,
    /// 데이터 디렉토리
    pub data_dir: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            vector_limit_per_variation: 10,
            faq_limit: 5,
            keyword_limit: 20,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            retention_days: DEFAULT_RETENTION_DAYS,
            data_dir: get_data_dir(),
        }
    }
}

impl SearchConfig {
    /// 환경변수를 반영한 설정 생성
    ///
    /// | 변수 | 필드 |
    /// |------|------|
    /// | `PALANK_SOURCE_TIMEOUT_MS` | `source_timeout` |
    /// | `PALANK_VECTOR_LIMIT` | `vector_limit_per_variation` |
    /// | `PALANK_FAQ_LIMIT` | `faq_limit` |
    /// | `PALANK_KEYWORD_LIMIT` | `keyword_limit` |
    /// | `PALANK_QUALITY_THRESHOLD` | `quality_threshold` |
    /// | `PALANK_RETENTION_DAYS` | `retention_days` |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_parse::<u64>("PALANK_SOURCE_TIMEOUT_MS") {
            config.source_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>("PALANK_VECTOR_LIMIT") {
            config.vector_limit_per_variation = n;
        }
        if let Some(n) = env_parse::<usize>("PALANK_FAQ_LIMIT") {
            config.faq_limit = n;
        }
        if let Some(n) = env_parse::<usize>("PALANK_KEYWORD_LIMIT") {
            config.keyword_limit = n;
        }
        if let Some(t) = env_parse::<f64>("PALANK_QUALITY_THRESHOLD") {
            if (0.0..=1.0).contains(&t) {
                config.quality_threshold = t;
            } else {
                tracing::warn!("PALANK_QUALITY_THRESHOLD out of range (0..1): {}", t);
            }
        }
        if let Some(days) = env_parse::<i64>("PALANK_RETENTION_DAYS") {
            if days > 0 {
                config.retention_days = days;
            } else {
                tracing::warn!("PALANK_RETENTION_DAYS must be positive: {}", days);
            }
        }

        config
    }

    /// SQLite 지식 DB 경로
    pub fn knowledge_db_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.db")
    }

    /// SQLite 검색 분석 DB 경로
    pub fn analytics_db_path(&self) -> PathBuf {
        self.data_dir.join("analytics.db")
    }

    /// LanceDB 벡터 인덱스 경로
    pub fn vector_index_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }

    /// 보존 기간 (chrono)
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

/// 환경변수 파싱 (없거나 잘못된 값이면 None)
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.source_timeout, Duration::from_secs(5));
        assert_eq!(config.faq_limit, 5);
        assert_eq!(config.keyword_limit, 20);
        assert!((config.quality_threshold - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.retention(), chrono::Duration::days(7));
    }

    #[test]
    fn test_paths_live_under_data_dir() {
        let config = SearchConfig {
            data_dir: PathBuf::from("/tmp/palank"),
            ..Default::default()
        };
        assert_eq!(config.knowledge_db_path(), PathBuf::from("/tmp/palank/knowledge.db"));
        assert_eq!(config.vector_index_path(), PathBuf::from("/tmp/palank/vectors.lance"));
        assert_eq!(config.analytics_db_path(), PathBuf::from("/tmp/palank/analytics.db"));
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("PALANK_TEST_ENV_PARSE", "not-a-number");
        assert_eq!(env_parse::<u64>("PALANK_TEST_ENV_PARSE"), None);

        std::env::set_var("PALANK_TEST_ENV_PARSE", " 250 ");
        assert_eq!(env_parse::<u64>("PALANK_TEST_ENV_PARSE"), Some(250));

        std::env::remove_var("PALANK_TEST_ENV_PARSE");
        assert_eq!(env_parse::<u64>("PALANK_TEST_ENV_PARSE"), None);
    }
}
