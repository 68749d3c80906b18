use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Literal some postings use instead of a date for rolling recruitment.
const ALWAYS_OPEN_LITERAL: &str = "상시모집";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmploymentEndDate {
    #[default]
    Always,
    On(NaiveDate),
}

impl EmploymentEndDate {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == ALWAYS_OPEN_LITERAL {
            return EmploymentEndDate::Always;
        }
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
            return EmploymentEndDate::On(dt.date_naive());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return EmploymentEndDate::On(dt.date());
        }
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => EmploymentEndDate::On(date),
            Err(_) => EmploymentEndDate::Always,
        }
    }

    /// Whole days from `today` until the deadline; `None` for rolling postings.
    pub fn days_left(&self, today: NaiveDate) -> Option<i64> {
        match self {
            EmploymentEndDate::Always => None,
            EmploymentEndDate::On(date) => Some((*date - today).num_days()),
        }
    }

    pub fn label(&self, today: NaiveDate) -> String {
        match self.days_left(today) {
            None => "Always open".to_string(),
            Some(days) if days < 0 => "Closed".to_string(),
            Some(0) => "Closes today".to_string(),
            Some(days) => format!("D-{}", days),
        }
    }
}

impl Serialize for EmploymentEndDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EmploymentEndDate::Always => serializer.serialize_none(),
            EmploymentEndDate::On(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for EmploymentEndDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw
            .map(|s| EmploymentEndDate::parse(&s))
            .unwrap_or(EmploymentEndDate::Always))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub employment_end_date: EmploymentEndDate,
    #[serde(default)]
    pub position_title: String,
    #[serde(default)]
    pub position_type: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub slogan: String,
    #[serde(default)]
    pub head_count: u32,
    #[serde(default)]
    pub is_bookmarked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Paginator {
    pub last_page: u32,
}

impl Default for Paginator {
    fn default() -> Self {
        Self { last_page: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub paginator: Paginator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub enroll_year: i32,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub cv_key: Option<String>,
}

impl Profile {
    pub fn departments(&self) -> Vec<&str> {
        self.department
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub enroll_year: i32,
    pub department: String,
    pub cv_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_end_date_formats() {
        assert_eq!(EmploymentEndDate::parse("2025-03-01"), EmploymentEndDate::On(day(2025, 3, 1)));
        assert_eq!(
            EmploymentEndDate::parse("2025-03-01T23:59:59"),
            EmploymentEndDate::On(day(2025, 3, 1))
        );
        assert_eq!(
            EmploymentEndDate::parse("2025-03-01T14:59:59.000Z"),
            EmploymentEndDate::On(day(2025, 3, 1))
        );
        assert_eq!(EmploymentEndDate::parse("상시모집"), EmploymentEndDate::Always);
        assert_eq!(EmploymentEndDate::parse("soon"), EmploymentEndDate::Always);
    }

    #[test]
    fn test_deadline_labels() {
        let today = day(2025, 3, 10);
        assert_eq!(EmploymentEndDate::Always.label(today), "Always open");
        assert_eq!(EmploymentEndDate::On(day(2025, 3, 9)).label(today), "Closed");
        assert_eq!(EmploymentEndDate::On(day(2025, 3, 10)).label(today), "Closes today");
        assert_eq!(EmploymentEndDate::On(day(2025, 3, 13)).label(today), "D-3");
    }

    #[test]
    fn test_post_deserializes_with_null_deadline() {
        let raw = r#"{
            "id": "p1",
            "companyName": "Waffle",
            "employmentEndDate": null,
            "positionTitle": "Backend intern",
            "positionType": "BACKEND",
            "domain": "EDUCATION",
            "slogan": "hi",
            "headCount": 2,
            "isBookmarked": true
        }"#;
        let post: Post = serde_json::from_str(raw).unwrap();
        assert_eq!(post.employment_end_date, EmploymentEndDate::Always);
        assert_eq!(post.head_count, 2);
        assert!(post.is_bookmarked);
    }

    #[test]
    fn test_page_result_defaults_last_page() {
        let page: PageResult = serde_json::from_str(r#"{"posts":[]}"#).unwrap();
        assert_eq!(page.paginator.last_page, 1);
    }

    #[test]
    fn test_profile_departments_split() {
        let profile = Profile {
            name: None,
            email: None,
            enroll_year: 2023,
            department: "컴퓨터공학부, 경영학과".to_string(),
            cv_key: None,
        };
        assert_eq!(profile.departments(), vec!["컴퓨터공학부", "경영학과"]);
    }
}
