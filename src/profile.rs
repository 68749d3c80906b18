use chrono::Datelike;
use thiserror::Error;

use crate::api::{SignupInfo, SignupRequest};
use crate::models::ProfileUpdate;

/// Domain appended to the local part typed at signup.
pub const SCHOOL_EMAIL_DOMAIN: &str = "snu.ac.kr";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("enrollment year must be two or four digits (e.g. 25 or 2025), got {0:?}")]
    EnrollYearFormat(String),
    #[error("enrollment year {0} is out of range")]
    EnrollYearRange(i32),
    #[error("add at least one department")]
    NoDepartment,
    #[error("department names cannot contain commas: {0:?}")]
    DepartmentComma(String),
    #[error("a CV is required")]
    MissingCv,
    #[error("CV must be a PDF file: {0:?}")]
    CvNotPdf(String),
    #[error("name is required")]
    MissingName,
    #[error("enter only the part of your email before @snu.ac.kr")]
    EmailLocalPart,
    #[error("password is required")]
    MissingPassword,
    #[error("passwords do not match")]
    PasswordMismatch,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileDraft {
    pub enroll_year: String,
    pub departments: Vec<String>,
    pub cv_key: String,
}

impl ProfileDraft {
    /// Checks every field against `current_year` and builds the request body.
    pub fn validate(&self, current_year: i32) -> Result<ProfileUpdate, ValidationError> {
        let enroll_year = parse_enroll_year(&self.enroll_year, current_year)?;

        let mut departments: Vec<&str> = Vec::new();
        for dept in self.departments.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
            if dept.contains(',') {
                return Err(ValidationError::DepartmentComma(dept.to_string()));
            }
            if !departments.contains(&dept) {
                departments.push(dept);
            }
        }
        if departments.is_empty() {
            return Err(ValidationError::NoDepartment);
        }

        let cv_key = self.cv_key.trim();
        if cv_key.is_empty() {
            return Err(ValidationError::MissingCv);
        }
        if !cv_key.to_ascii_lowercase().ends_with(".pdf") {
            return Err(ValidationError::CvNotPdf(cv_key.to_string()));
        }

        Ok(ProfileUpdate {
            enroll_year,
            department: departments.join(","),
            cv_key: cv_key.to_string(),
        })
    }

    pub fn validate_now(&self) -> Result<ProfileUpdate, ValidationError> {
        self.validate(chrono::Local::now().year())
    }
}

fn parse_enroll_year(raw: &str, current_year: i32) -> Result<i32, ValidationError> {
    let raw = raw.trim();
    if !raw.chars().all(|c| c.is_ascii_digit()) || !matches!(raw.len(), 2 | 4) {
        return Err(ValidationError::EnrollYearFormat(raw.to_string()));
    }
    let value: i32 = raw
        .parse()
        .map_err(|_| ValidationError::EnrollYearFormat(raw.to_string()))?;
    let year = if raw.len() == 2 { 2000 + value } else { value };
    if year < 2000 || year > current_year + 1 {
        return Err(ValidationError::EnrollYearRange(year));
    }
    Ok(year)
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub name: String,
    pub email_local: String,
    pub password: String,
    pub confirm: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<SignupRequest, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        let local = self.email_local.trim();
        if local.is_empty() || local.contains('@') || local.contains(char::is_whitespace) {
            return Err(ValidationError::EmailLocalPart);
        }
        if self.password.is_empty() {
            return Err(ValidationError::MissingPassword);
        }
        if self.password != self.confirm {
            return Err(ValidationError::PasswordMismatch);
        }

        Ok(SignupRequest {
            auth_type: "APPLICANT",
            info: SignupInfo {
                kind: "APPLICANT",
                name: name.to_string(),
                email: format!("{}@{}", local, SCHOOL_EMAIL_DOMAIN),
                password: self.password.clone(),
                success_code: "string".to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn draft(year: &str, departments: &[&str], cv: &str) -> ProfileDraft {
        ProfileDraft {
            enroll_year: year.to_string(),
            departments: departments.iter().map(|d| d.to_string()).collect(),
            cv_key: cv.to_string(),
        }
    }

    #[test]
    fn test_valid_profile_joins_departments() {
        let update = draft("25", &["컴퓨터공학부", " 경제학부 ", "컴퓨터공학부"], "cv/me.PDF")
            .validate(2025)
            .unwrap();
        assert_eq!(
            update,
            ProfileUpdate {
                enroll_year: 2025,
                department: "컴퓨터공학부,경제학부".to_string(),
                cv_key: "cv/me.PDF".to_string(),
            }
        );
    }

    #[test]
    fn test_enroll_year_rules() {
        assert_eq!(draft("2021", &["a"], "x.pdf").validate(2025).unwrap().enroll_year, 2021);
        assert_eq!(
            draft("3", &["a"], "x.pdf").validate(2025),
            Err(ValidationError::EnrollYearFormat("3".into()))
        );
        assert_eq!(
            draft("2a", &["a"], "x.pdf").validate(2025),
            Err(ValidationError::EnrollYearFormat("2a".into()))
        );
        assert_eq!(
            draft("1999", &["a"], "x.pdf").validate(2025),
            Err(ValidationError::EnrollYearRange(1999))
        );
        assert_eq!(
            draft("30", &["a"], "x.pdf").validate(2025),
            Err(ValidationError::EnrollYearRange(2030))
        );
    }

    #[test]
    fn test_department_and_cv_rules() {
        assert_eq!(
            draft("25", &["  "], "x.pdf").validate(2025),
            Err(ValidationError::NoDepartment)
        );
        assert_eq!(
            draft("25", &["a,b"], "x.pdf").validate(2025),
            Err(ValidationError::DepartmentComma("a,b".into()))
        );
        assert_eq!(draft("25", &["a"], "").validate(2025), Err(ValidationError::MissingCv));
        assert_eq!(
            draft("25", &["a"], "cv.docx").validate(2025),
            Err(ValidationError::CvNotPdf("cv.docx".into()))
        );
    }

    #[test]
    fn test_signup_builds_school_email() {
        let form = SignupForm {
            name: "Kim".into(),
            email_local: "kim01".into(),
            password: "pw".into(),
            confirm: "pw".into(),
        };
        let request = form.validate().unwrap();
        assert_eq!(request.info.email, "kim01@snu.ac.kr");
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["authType"], "APPLICANT");
        assert_eq!(body["info"]["type"], "APPLICANT");
        assert_eq!(body["info"]["successCode"], "string");
    }

    #[test]
    fn test_signup_rejections() {
        let base = SignupForm {
            name: "Kim".into(),
            email_local: "kim".into(),
            password: "pw".into(),
            confirm: "pw".into(),
        };
        let with = |f: fn(&mut SignupForm)| {
            let mut form = base.clone();
            f(&mut form);
            form.validate().unwrap_err()
        };
        assert_eq!(with(|f| f.name = " ".into()), ValidationError::MissingName);
        assert_eq!(with(|f| f.email_local = "kim@snu.ac.kr".into()), ValidationError::EmailLocalPart);
        assert_eq!(with(|f| f.password = String::new()), ValidationError::MissingPassword);
        assert_eq!(with(|f| f.confirm = "other".into()), ValidationError::PasswordMismatch);
    }
}
