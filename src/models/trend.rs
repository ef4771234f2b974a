use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryTotals {
    pub clicks: u64,
    pub impressions: u64,
}

impl QueryTotals {
    pub fn new(clicks: u64, impressions: u64) -> Self {
        Self {
            clicks,
            impressions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clicks == 0 && self.impressions == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingQuery {
    pub keyword: String,
    pub current_clicks: u64,
    pub current_impressions: u64,
    pub previous_clicks: u64,
    pub previous_impressions: u64,
    pub clicks_change: f64,
    pub impressions_change: f64,
    pub trend_score: f64,
    pub is_new: bool,
}

/// Inclusive date range, as Search Console expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendStatus {
    #[default]
    Idle,
    Syncing,
    Ready,
    NotConnected,
    Failed,
}
