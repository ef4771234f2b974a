use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keyword::{Keyword, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    MissingH1,
    H1Keyword,
    MissingTitle,
    TitleKeyword,
    MissingDescription,
    DescriptionKeyword,
    KeywordMissing,
    LowDensity,
    HighDensity,
    MultipleH1,
    TitleLength,
    DescriptionLength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub message: String,
    pub priority: Priority,
}

/// On-page signals for one keyword/URL pair, derived purely from the page HTML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub target_url: String,
    pub has_h1: bool,
    pub h1_matches: Vec<String>,
    pub has_meta_title: bool,
    pub meta_title: Option<String>,
    pub meta_title_match: bool,
    pub has_meta_description: bool,
    pub meta_description: Option<String>,
    pub meta_description_match: bool,
    pub keyword_density: f64,
    pub word_count: u32,
    pub keyword_count: u32,
    pub seo_score: u8,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoAnalysis {
    pub keyword_id: i64,
    pub analyzed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub page: PageAnalysis,
}

impl SeoAnalysis {
    pub fn new(keyword_id: i64, page: PageAnalysis) -> Self {
        Self {
            keyword_id,
            analyzed_at: Utc::now(),
            page,
        }
    }

    /// The keyword's target URL changed since this analysis ran.
    pub fn is_stale_for(&self, keyword: &Keyword) -> bool {
        keyword.target_url.as_deref() != Some(self.page.target_url.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisStatus {
    #[default]
    NotAnalyzed,
    Analyzing,
    Analyzed,
    Failed,
    NoTargetUrl,
}
