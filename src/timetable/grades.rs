//! Grade-level ordering and the subject → grade-range table.
//!
//! Levels: 0 Nursery, 1 LKG, 2 UKG, 3 Class 1, ... 14 Class 12.

use serde::Serialize;

pub const MIN_GRADE: u8 = 0;
pub const MAX_GRADE: u8 = 14;

#[derive(Debug, Clone, Copy)]
pub struct GradeRange {
    pub subject: &'static str,
    pub min: u8,
    pub max: u8,
}

const fn range(subject: &'static str, min: u8, max: u8) -> GradeRange {
    GradeRange { subject, min, max }
}

pub static SUBJECT_GRADE_RANGES: &[GradeRange] = &[
    range("English", 0, 14),
    range("Mathematics", 0, 14),
    range("Art", 0, 12),
    range("Music", 0, 12),
    range("Physical Education", 0, 14),
    range("Rhymes", 0, 2),
    range("Environmental Studies", 3, 7),
    range("Science", 5, 12),
    range("Social Studies", 5, 12),
    range("Computer Science", 5, 14),
    range("Physics", 9, 14),
    range("Chemistry", 9, 14),
    range("Biology", 9, 14),
    range("History", 9, 14),
    range("Geography", 9, 14),
    range("Economics", 13, 14),
    range("Accountancy", 13, 14),
    range("Business Studies", 13, 14),
    range("Political Science", 13, 14),
];

pub fn grade_name(level: u8) -> String {
    match level {
        0 => "Nursery".to_string(),
        1 => "LKG".to_string(),
        2 => "UKG".to_string(),
        n => format!("Class {}", n.saturating_sub(2)),
    }
}

/// Parse a class name such as `Class 8`, `Grade 10 - A`, `UKG` or `Nursery`.
pub fn parse_grade_level(class_name: &str) -> Option<u8> {
    let lower = class_name.trim().to_ascii_lowercase();
    let compact: String = lower.chars().filter(|c| !c.is_whitespace()).collect();
    if ["nursery", "pre-k", "prek"].iter().any(|p| compact.starts_with(*p)) {
        return Some(0);
    }
    if compact.starts_with("lkg") || compact.starts_with("lowerkg") {
        return Some(1);
    }
    if compact.starts_with("ukg") || compact.starts_with("upperkg") {
        return Some(2);
    }

    let rest = ["class", "grade", "std", "standard"]
        .iter()
        .find_map(|p| lower.strip_prefix(p))
        .unwrap_or(&lower);
    let digits: String = rest
        .trim_start_matches(|c: char| c.is_whitespace() || c == '.' || c == '-')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let n: u8 = digits.parse().ok()?;
    if (1..=12).contains(&n) {
        Some(n + 2)
    } else {
        None
    }
}

/// An explicit level wins over the one parsed from the name.
pub fn resolve_grade_level(explicit: Option<i64>, class_name: &str) -> Option<u8> {
    explicit
        .and_then(|v| u8::try_from(v).ok())
        .filter(|v| *v <= MAX_GRADE)
        .or_else(|| parse_grade_level(class_name))
}

pub fn lookup(subject: &str) -> Option<&'static GradeRange> {
    let s = subject.trim();
    SUBJECT_GRADE_RANGES
        .iter()
        .find(|r| r.subject.eq_ignore_ascii_case(s))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeCheck {
    pub is_valid: bool,
    pub subject: String,
    pub grade_level: u8,
    pub grade_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_grade: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_grade: Option<u8>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

pub fn validate_subject_grade_assignment(subject: &str, grade_level: u8) -> GradeCheck {
    let grade = grade_name(grade_level);
    let Some(r) = lookup(subject) else {
        return GradeCheck {
            is_valid: true,
            subject: subject.trim().to_string(),
            grade_level,
            grade_name: grade,
            min_grade: None,
            max_grade: None,
            message: format!("No grade restriction recorded for {}", subject.trim()),
            suggestion: None,
        };
    };

    let is_valid = (r.min..=r.max).contains(&grade_level);
    let span = format!("{} to {}", grade_name(r.min), grade_name(r.max));
    let (message, suggestion) = if is_valid {
        (format!("{} is appropriate for {}", r.subject, grade), None)
    } else {
        let alternatives = appropriate_subjects(grade_level);
        let hint = if grade_level < r.min {
            format!("{} is introduced from {}", r.subject, grade_name(r.min))
        } else {
            format!("{} is only taught up to {}", r.subject, grade_name(r.max))
        };
        (
            format!("{} is not appropriate for {} (taught {})", r.subject, grade, span),
            Some(format!(
                "{}. Subjects suitable for {}: {}",
                hint,
                grade,
                alternatives.join(", ")
            )),
        )
    };

    GradeCheck {
        is_valid,
        subject: r.subject.to_string(),
        grade_level,
        grade_name: grade,
        min_grade: Some(r.min),
        max_grade: Some(r.max),
        message,
        suggestion,
    }
}

pub fn appropriate_subjects(grade_level: u8) -> Vec<&'static str> {
    SUBJECT_GRADE_RANGES
        .iter()
        .filter(|r| (r.min..=r.max).contains(&grade_level))
        .map(|r| r.subject)
        .collect()
}
