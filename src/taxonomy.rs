use serde::{Deserialize, Serialize};
use std::fmt;

/// Job function identifier as the API spells it (`FRONT`, `BACKEND`, ...).
///
/// Codes outside the table below are carried around untouched so that a stale
/// shared link still round-trips, but they never resolve to a label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCode(String);

/// Industry vertical identifier (`FINTECH`, `EDUCATION`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainCode(String);

impl RoleCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        role_label(self).is_some()
    }
}

impl DomainCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        domain_label(self).is_some()
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DomainCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RoleEntry {
    pub code: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct RoleCategory {
    pub key: &'static str,
    pub label: &'static str,
    pub roles: &'static [RoleEntry],
}

impl RoleCategory {
    pub fn codes(&self) -> impl Iterator<Item = RoleCode> + '_ {
        self.roles.iter().map(|r| RoleCode::new(r.code))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DomainEntry {
    pub code: &'static str,
    pub label: &'static str,
}

pub const ROLE_CATEGORIES: &[RoleCategory] = &[
    RoleCategory {
        key: "dev",
        label: "개발",
        roles: &[
            RoleEntry { code: "FRONT", label: "프론트엔드 개발" },
            RoleEntry { code: "BACKEND", label: "서버 · 백엔드 개발" },
            RoleEntry { code: "APP", label: "앱 개발" },
            RoleEntry { code: "DATA", label: "데이터" },
            RoleEntry { code: "OTHERS", label: "기타 분야" },
        ],
    },
    RoleCategory {
        key: "planning",
        label: "기획",
        roles: &[RoleEntry { code: "PLANNER", label: "기획" }],
    },
    RoleCategory {
        key: "design",
        label: "디자인",
        roles: &[RoleEntry { code: "DESIGN", label: "디자인" }],
    },
    RoleCategory {
        key: "marketing",
        label: "마케팅",
        roles: &[RoleEntry { code: "MARKETING", label: "마케팅" }],
    },
];

pub const DOMAINS: &[DomainEntry] = &[
    DomainEntry { code: "FINTECH", label: "핀테크" },
    DomainEntry { code: "HEALTHTECH", label: "헬스테크" },
    DomainEntry { code: "EDUCATION", label: "교육" },
    DomainEntry { code: "ECOMMERCE", label: "이커머스" },
    DomainEntry { code: "FOODTECH", label: "푸드테크" },
    DomainEntry { code: "MOBILITY", label: "모빌리티" },
    DomainEntry { code: "CONTENTS", label: "콘텐츠" },
    DomainEntry { code: "B2B", label: "B2B" },
    DomainEntry { code: "OTHERS", label: "기타" },
];

/// Looks a category up by its key (`dev`) or its display label (`개발`).
pub fn category(key: &str) -> Option<&'static RoleCategory> {
    ROLE_CATEGORIES
        .iter()
        .find(|c| c.key.eq_ignore_ascii_case(key) || c.label == key)
}

pub fn role_label(code: &RoleCode) -> Option<&'static str> {
    ROLE_CATEGORIES
        .iter()
        .flat_map(|c| c.roles.iter())
        .find(|r| r.code == code.as_str())
        .map(|r| r.label)
}

pub fn domain_label(code: &DomainCode) -> Option<&'static str> {
    DOMAINS
        .iter()
        .find(|d| d.code == code.as_str())
        .map(|d| d.label)
}

pub fn all_domains() -> impl Iterator<Item = DomainCode> {
    DOMAINS.iter().map(|d| DomainCode::new(d.code))
}

/// Label shown next to a posting; unknown codes are shown as-is.
pub fn position_label(code: &str) -> String {
    role_label(&RoleCode::new(code))
        .map(str::to_string)
        .unwrap_or_else(|| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_lookup_by_key_and_label() {
        assert_eq!(category("dev").map(|c| c.roles.len()), Some(5));
        assert_eq!(category("DEV").map(|c| c.key), Some("dev"));
        assert_eq!(category("디자인").map(|c| c.key), Some("design"));
        assert!(category("sales").is_none());
    }

    #[test]
    fn test_role_codes_are_unique_across_categories() {
        let mut codes: Vec<&str> = ROLE_CATEGORIES
            .iter()
            .flat_map(|c| c.roles.iter().map(|r| r.code))
            .collect();
        let total = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }

    #[test]
    fn test_unknown_codes_have_no_label() {
        assert!(!RoleCode::new("CHEF").is_known());
        assert!(RoleCode::new("BACKEND").is_known());
        assert_eq!(domain_label(&DomainCode::new("B2B")), Some("B2B"));
        assert!(!DomainCode::new("SPACE").is_known());
    }

    #[test]
    fn test_position_label_falls_back_to_code() {
        assert_eq!(position_label("FRONT"), "프론트엔드 개발");
        assert_eq!(position_label("frontend"), "frontend");
    }
}
