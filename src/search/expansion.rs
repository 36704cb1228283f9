//! 쿼리 확장 - 동의어 테이블 기반 쿼리 변형 생성
//!
//! 결제 프로세서 별칭 테이블과 일반 용어 치환 규칙으로
//! 하나의 쿼리에서 여러 변형을 만들어 벡터 검색 재현율을 높입니다.
//!
//! 매칭은 단어 경계가 아닌 부분 문자열 기준입니다.
//! ("unauthorized" 안의 "authorize"도 매칭됨)

use std::collections::{BTreeSet, HashSet};

use regex::{NoExpand, Regex, RegexBuilder};

// ============================================================================
// Tables
// ============================================================================

/// 도메인 용어 그룹 (짧은 이름 <-> 정식 이름 + 별칭)
#[derive(Debug, Clone, Copy)]
pub struct TermGroup {
    pub short: &'static str,
    pub full: &'static str,
    pub alternates: &'static [&'static str],
}

/// 일반 치환 규칙
///
/// `triggers` 중 하나라도 쿼리에 포함되면 `pattern`을 각 `replacements`로
/// 치환한 변형을 하나씩 추가합니다.
#[derive(Debug, Clone, Copy)]
pub struct SubstitutionRule {
    pub triggers: &'static [&'static str],
    pub pattern: &'static str,
    pub replacements: &'static [&'static str],
}

/// 결제 프로세서 별칭 테이블
pub const TERM_GROUPS: &[TermGroup] = &[
    TermGroup { short: "tsys", full: "total system services", alternates: &["vital", "global payments"] },
    TermGroup { short: "fiserv", full: "first data", alternates: &["clover"] },
    TermGroup { short: "worldpay", full: "world pay", alternates: &["vantiv", "fis"] },
    TermGroup { short: "square", full: "block", alternates: &["square payments", "square terminal"] },
    TermGroup { short: "clover", full: "clover pos", alternates: &["clover flex", "clover mini"] },
    TermGroup { short: "shift4", full: "shift 4", alternates: &["shift four", "harbortouch"] },
    TermGroup { short: "stripe", full: "stripe payments", alternates: &["stripe terminal", "stripe connect"] },
    TermGroup { short: "helcim", full: "helcom", alternates: &["helcim payments"] },
    TermGroup { short: "paypal", full: "paypal here", alternates: &["paypal zettle", "braintree"] },
    TermGroup { short: "chase", full: "chase paymentech", alternates: &["paymentech"] },
    TermGroup { short: "elavon", full: "elavon merchant", alternates: &["us bank", "converge"] },
    TermGroup { short: "hubwallet", full: "hub wallet", alternates: &["tracer hub wallet"] },
    TermGroup { short: "quantic", full: "quantic pos", alternates: &["quantic retail"] },
    TermGroup { short: "clearent", full: "clearent payments", alternates: &["tsys clearent"] },
];

const AUTH_NET_TRIGGERS: &[&str] = &["auth.net", "authnet", "authorize"];
const PRICING_TRIGGERS: &[&str] = &["pricing", "rates", "price"];
const SETUP_TRIGGERS: &[&str] = &["setup", "set up"];
const ECOMMERCE_TRIGGERS: &[&str] = &["ecommerce", "e-commerce"];

/// 일반 용어 치환 규칙 테이블
pub const SUBSTITUTION_RULES: &[SubstitutionRule] = &[
    SubstitutionRule {
        triggers: AUTH_NET_TRIGGERS,
        pattern: r"auth\.?net",
        replacements: &["authorize.net", "authorize net", "authorize"],
    },
    SubstitutionRule {
        triggers: AUTH_NET_TRIGGERS,
        pattern: r"authorize",
        replacements: &["auth.net", "authnet"],
    },
    SubstitutionRule { triggers: PRICING_TRIGGERS, pattern: r"pricing", replacements: &["rates"] },
    SubstitutionRule { triggers: PRICING_TRIGGERS, pattern: r"rates", replacements: &["pricing"] },
    SubstitutionRule {
        triggers: PRICING_TRIGGERS,
        pattern: r"pric(e|ing|es)",
        replacements: &["fees", "cost"],
    },
    SubstitutionRule {
        triggers: SETUP_TRIGGERS,
        pattern: r"set\s*up",
        replacements: &["install", "configure", "integrate"],
    },
    SubstitutionRule {
        triggers: &["pos"],
        pattern: r"\bpos\b",
        replacements: &["point of sale", "terminal"],
    },
    SubstitutionRule {
        triggers: ECOMMERCE_TRIGGERS,
        pattern: r"e-?commerce",
        replacements: &["online", "website", "virtual terminal"],
    },
];

/// 키워드 추출 시 제외할 불용어
const STOP_WORDS: &[&str] = &[
    "how", "do", "i", "what", "is", "the", "a", "an", "for", "to", "of", "in", "on", "at", "with",
];

/// 쿼리 전체를 하나의 용어로 추가하는 길이 기준 (문자 수 미만)
const PHRASE_TERM_MAX_CHARS: usize = 30;

// ============================================================================
// QueryExpander
// ============================================================================

struct CompiledGroup {
    group: TermGroup,
    short_re: Regex,
    full_re: Regex,
}

struct CompiledRule {
    rule: SubstitutionRule,
    re: Regex,
}

/// 쿼리 확장기
///
/// 테이블을 한 번 컴파일해 두고 재사용합니다. 같은 테이블이면 결과는 결정적입니다.
pub struct QueryExpander {
    groups: Vec<CompiledGroup>,
    rules: Vec<CompiledRule>,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExpander {
    /// 기본 테이블로 생성
    pub fn new() -> Self {
        Self::with_tables(TERM_GROUPS, SUBSTITUTION_RULES)
    }

    /// 사용자 지정 테이블로 생성
    ///
    /// 컴파일에 실패한 패턴은 경고 후 건너뜁니다.
    pub fn with_tables(groups: &[TermGroup], rules: &[SubstitutionRule]) -> Self {
        let groups = groups
            .iter()
            .filter_map(|group| {
                let short_re = literal_regex(group.short)?;
                let full_re = literal_regex(group.full)?;
                Some(CompiledGroup {
                    group: *group,
                    short_re,
                    full_re,
                })
            })
            .collect();

        let rules = rules
            .iter()
            .filter_map(|rule| {
                match RegexBuilder::new(rule.pattern).case_insensitive(true).build() {
                    Ok(re) => Some(CompiledRule { rule: *rule, re }),
                    Err(e) => {
                        tracing::warn!("Skipping invalid substitution pattern {:?}: {}", rule.pattern, e);
                        None
                    }
                }
            })
            .collect();

        Self { groups, rules }
    }

    /// 쿼리 변형 생성
    ///
    /// 원본 쿼리는 항상 포함됩니다. 결과는 집합이므로 중복이 없습니다.
    pub fn expand(&self, query: &str) -> BTreeSet<String> {
        let mut variations = BTreeSet::new();
        variations.insert(query.to_string());

        let lower = query.to_lowercase();

        for compiled in &self.groups {
            let group = &compiled.group;

            if lower.contains(group.short) {
                variations.insert(replace_all(&compiled.short_re, query, group.full));
                for alt in group.alternates {
                    variations.insert(replace_all(&compiled.short_re, query, alt));
                }
            }

            if lower.contains(group.full) {
                variations.insert(replace_all(&compiled.full_re, query, group.short));
                for alt in group.alternates {
                    variations.insert(replace_all(&compiled.full_re, query, alt));
                }
            }
        }

        for compiled in &self.rules {
            if !compiled.rule.triggers.iter().any(|t| lower.contains(t)) {
                continue;
            }
            for replacement in compiled.rule.replacements {
                variations.insert(replace_all(&compiled.re, query, replacement));
            }
        }

        variations
    }

    /// 실패한 쿼리에 대한 추천 키워드
    ///
    /// 쿼리에 걸린 용어 그룹의 다른 이름들과, 발동한 규칙의 치환어를 모읍니다.
    /// 그룹은 대표 이름(`short`/`full`)이 단어 단위로 들어 있을 때만 걸립니다.
    /// 쿼리에 이미 들어 있는 단어는 제외합니다.
    pub fn suggest_keywords(&self, query: &str) -> Vec<String> {
        let lower = query.to_lowercase();
        let mut seen = HashSet::new();
        let mut suggestions = Vec::new();

        let mut push = |candidate: &str| {
            if !lower.contains(candidate) && seen.insert(candidate.to_string()) {
                suggestions.push(candidate.to_string());
            }
        };

        for compiled in &self.groups {
            let group = &compiled.group;
            if !contains_word(&lower, group.short) && !contains_word(&lower, group.full) {
                continue;
            }

            std::iter::once(group.short)
                .chain(std::iter::once(group.full))
                .chain(group.alternates.iter().copied())
                .for_each(&mut push);
        }

        for compiled in &self.rules {
            if compiled.rule.triggers.iter().any(|t| lower.contains(t)) {
                compiled.rule.replacements.iter().for_each(|r| push(*r));
            }
        }

        suggestions
    }
}

/// `needle`이 앞뒤로 영숫자가 붙지 않은 채 들어 있는지 확인
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

// ============================================================================
// Key Term Extraction
// ============================================================================

/// 키워드 검색/스코어링용 핵심 용어 추출
///
/// 소문자화 -> `.`/`-` 외 구두점 제거 -> 공백 분리 -> 불용어 및 2자 이하 제거.
/// 쿼리가 짧으면(30자 미만) 쿼리 전체도 하나의 용어로 맨 앞에 넣습니다.
pub fn extract_key_terms(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let cleaned: String = lower
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut terms = Vec::new();

    let phrase = lower.trim();
    if !phrase.is_empty() && query.chars().count() < PHRASE_TERM_MAX_CHARS {
        terms.push(phrase.to_string());
    }

    terms.extend(
        cleaned
            .split_whitespace()
            .filter(|term| term.chars().count() > 2 && !STOP_WORDS.contains(term))
            .map(str::to_string),
    );

    let mut seen = HashSet::new();
    terms.retain(|term| seen.insert(term.clone()));
    terms
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 리터럴 문자열의 대소문자 무시 정규식
fn literal_regex(literal: &str) -> Option<Regex> {
    match RegexBuilder::new(&regex::escape(literal))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Skipping term {:?}: {}", literal, e);
            None
        }
    }
}

fn replace_all(re: &Regex, query: &str, replacement: &str) -> String {
    re.replace_all(query, NoExpand(replacement)).into_owned()
}

// ============================================================================
// Tests
// ============================================================================
