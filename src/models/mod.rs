mod analysis;
mod gsc;
mod keyword;
mod trend;

pub use analysis::{AnalysisStatus, PageAnalysis, Recommendation, RecommendationKind, SeoAnalysis};
pub use gsc::GscTokens;
pub use keyword::{
    parse_target_url, ContentStatus, Keyword, KeywordFilter, KeywordUpdate, NewKeyword, Priority,
    MAX_FOCUS_SCORE,
};
pub use trend::{DateRange, QueryTotals, TrendStatus, TrendingQuery};
