use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

pub const MAX_FOCUS_SCORE: i32 = 100;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn cycle(&self) -> Self {
        match self {
            Priority::High => Priority::Medium,
            Priority::Medium => Priority::Low,
            Priority::Low => Priority::High,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(ParseEnumError {
                kind: "priority",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    #[default]
    NotStarted,
    Planned,
    InProgress,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::NotStarted => "not_started",
            ContentStatus::Planned => "planned",
            ContentStatus::InProgress => "in_progress",
            ContentStatus::Published => "published",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContentStatus::NotStarted => "Not started",
            ContentStatus::Planned => "Planned",
            ContentStatus::InProgress => "In progress",
            ContentStatus::Published => "Published",
        }
    }

    pub fn cycle(&self) -> Self {
        match self {
            ContentStatus::NotStarted => ContentStatus::Planned,
            ContentStatus::Planned => ContentStatus::InProgress,
            ContentStatus::InProgress => ContentStatus::Published,
            ContentStatus::Published => ContentStatus::NotStarted,
        }
    }
}

impl FromStr for ContentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "not_started" => Ok(ContentStatus::NotStarted),
            "planned" => Ok(ContentStatus::Planned),
            "in_progress" => Ok(ContentStatus::InProgress),
            "published" => Ok(ContentStatus::Published),
            _ => Err(ParseEnumError {
                kind: "content status",
                value: s.to_string(),
            }),
        }
    }
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum_sql!(Priority);
text_enum_sql!(ContentStatus);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    pub keyword: String,
    pub priority: Priority,
    pub category: Option<String>,
    pub focus_score: i32,
    pub notes: Option<String>,
    pub target_url: Option<String>,
    pub content_status: ContentStatus,
    pub assigned_content_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKeyword {
    pub keyword: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub focus_score: i32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
}

impl NewKeyword {
    pub fn new(keyword: impl Into<String>, priority: Priority) -> Self {
        Self {
            keyword: keyword.into(),
            priority,
            category: None,
            focus_score: 0,
            notes: None,
            target_url: None,
        }
    }

    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn with_focus_score(mut self, score: i32) -> Self {
        self.focus_score = score;
        self
    }

    /// Validate and return a copy with trimmed text and blank optionals cleared.
    pub fn normalized(&self) -> Result<Self> {
        let keyword = validate_keyword_text(&self.keyword)?;
        validate_focus_score(self.focus_score)?;
        let target_url = non_blank(&self.target_url);
        if let Some(url) = &target_url {
            parse_target_url(url).map_err(AppError::Validation)?;
        }

        Ok(Self {
            keyword,
            priority: self.priority,
            category: non_blank(&self.category),
            focus_score: self.focus_score,
            notes: non_blank(&self.notes),
            target_url,
        })
    }
}

/// Partial update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordUpdate {
    pub keyword: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Option<String>>,
    pub focus_score: Option<i32>,
    pub notes: Option<Option<String>>,
    pub target_url: Option<Option<String>>,
    pub content_status: Option<ContentStatus>,
    pub assigned_content_id: Option<Option<String>>,
}

impl KeywordUpdate {
    pub fn is_empty(&self) -> bool {
        *self == KeywordUpdate::default()
    }

    /// Merge onto an existing record, re-running create-time validation.
    pub fn apply_to(&self, existing: &Keyword) -> Result<Keyword> {
        let mut merged = existing.clone();

        if let Some(keyword) = &self.keyword {
            merged.keyword = keyword.clone();
        }
        if let Some(priority) = self.priority {
            merged.priority = priority;
        }
        if let Some(category) = &self.category {
            merged.category = category.clone();
        }
        if let Some(score) = self.focus_score {
            merged.focus_score = score;
        }
        if let Some(notes) = &self.notes {
            merged.notes = notes.clone();
        }
        if let Some(url) = &self.target_url {
            merged.target_url = url.clone();
        }
        if let Some(status) = self.content_status {
            merged.content_status = status;
        }
        if let Some(content_id) = &self.assigned_content_id {
            merged.assigned_content_id = content_id.clone();
        }

        merged.keyword = validate_keyword_text(&merged.keyword)?;
        validate_focus_score(merged.focus_score)?;
        merged.category = non_blank(&merged.category);
        merged.notes = non_blank(&merged.notes);
        merged.target_url = non_blank(&merged.target_url);
        merged.assigned_content_id = non_blank(&merged.assigned_content_id);
        if let Some(url) = &merged.target_url {
            parse_target_url(url).map_err(AppError::Validation)?;
        }

        Ok(merged)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordFilter {
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl KeywordFilter {
    /// None -> high -> medium -> low -> None
    pub fn cycle_priority(&mut self) {
        self.priority = match self.priority {
            None => Some(Priority::High),
            Some(Priority::High) => Some(Priority::Medium),
            Some(Priority::Medium) => Some(Priority::Low),
            Some(Priority::Low) => None,
        };
    }

    pub fn label(&self) -> String {
        let mut parts = vec![self.priority.map(|p| p.as_str()).unwrap_or("all").to_string()];
        if let Some(category) = &self.category {
            parts.push(format!("#{category}"));
        }
        if let Some(search) = &self.search {
            parts.push(format!("\"{search}\""));
        }
        parts.join(" ")
    }
}

/// Parse an absolute http(s) URL with a host.
pub fn parse_target_url(raw: &str) -> std::result::Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("{raw}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("{raw}: only http and https URLs can be analyzed"));
    }
    if url.host_str().is_none() {
        return Err(format!("{raw}: URL has no host"));
    }
    Ok(url)
}

fn validate_keyword_text(keyword: &str) -> Result<String> {
    let trimmed = keyword.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("keyword must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn validate_focus_score(score: i32) -> Result<()> {
    if !(0..=MAX_FOCUS_SCORE).contains(&score) {
        return Err(AppError::validation(format!(
            "focus score must be between 0 and {MAX_FOCUS_SCORE}, got {score}"
        )));
    }
    Ok(())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample_keyword() -> Keyword {
        Keyword {
            id: 1,
            keyword: "testosterone booster".into(),
            priority: Priority::High,
            category: Some("supplements".into()),
            focus_score: 40,
            notes: None,
            target_url: Some("https://example.com/booster".into()),
            content_status: ContentStatus::NotStarted,
            assigned_content_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_keyword_rejects_blank_text() {
        let err = NewKeyword::new("   ", Priority::Low).normalized().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_new_keyword_rejects_out_of_range_focus() {
        let err = NewKeyword::new("test", Priority::Low)
            .with_focus_score(150)
            .normalized()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = NewKeyword::new("test", Priority::Low)
            .with_focus_score(-1)
            .normalized()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_new_keyword_normalizes_fields() {
        let mut input = NewKeyword::new("  best creatine  ", Priority::High)
            .with_target_url(" https://example.com/creatine ");
        input.category = Some("   ".into());
        let normalized = input.normalized().unwrap();

        assert_eq!(normalized.keyword, "best creatine");
        assert_eq!(normalized.category, None);
        assert_eq!(
            normalized.target_url.as_deref(),
            Some("https://example.com/creatine")
        );
    }

    #[test]
    fn test_target_url_must_be_absolute_http() {
        assert!(parse_target_url("https://example.com/page").is_ok());
        assert!(parse_target_url("/relative/path").is_err());
        assert!(parse_target_url("ftp://example.com/file").is_err());
        assert!(parse_target_url("not a url").is_err());

        let err = NewKeyword::new("test", Priority::Medium)
            .with_target_url("example.com/page")
            .normalized()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_update_merges_and_clears() {
        let existing = sample_keyword();
        let update = KeywordUpdate {
            priority: Some(Priority::Low),
            category: Some(None),
            focus_score: Some(90),
            ..Default::default()
        };

        let merged = update.apply_to(&existing).unwrap();
        assert_eq!(merged.priority, Priority::Low);
        assert_eq!(merged.category, None);
        assert_eq!(merged.focus_score, 90);
        assert_eq!(merged.keyword, existing.keyword);
        assert_eq!(merged.target_url, existing.target_url);
    }

    #[test]
    fn test_update_revalidates() {
        let existing = sample_keyword();
        let update = KeywordUpdate {
            keyword: Some("".into()),
            ..Default::default()
        };
        assert!(update.apply_to(&existing).is_err());

        let update = KeywordUpdate {
            focus_score: Some(101),
            ..Default::default()
        };
        assert!(update.apply_to(&existing).is_err());
    }

    #[test]
    fn test_enum_text_forms() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(
            "in_progress".parse::<ContentStatus>().unwrap(),
            ContentStatus::InProgress
        );
        assert_eq!(
            serde_json::to_string(&ContentStatus::NotStarted).unwrap(),
            "\"not_started\""
        );
        assert_eq!(ContentStatus::Published.cycle(), ContentStatus::NotStarted);
    }

    #[test]
    fn test_filter_cycle_and_label() {
        let mut filter = KeywordFilter::default();
        assert_eq!(filter.label(), "all");
        filter.cycle_priority();
        assert_eq!(filter.priority, Some(Priority::High));
        filter.search = Some("creatine".into());
        assert_eq!(filter.label(), "high \"creatine\"");
        filter.cycle_priority();
        filter.cycle_priority();
        filter.cycle_priority();
        assert_eq!(filter.priority, None);
    }
}
