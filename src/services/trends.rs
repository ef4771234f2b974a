//! Period-over-period momentum ranking for Search Console queries.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{QueryTotals, TrendingQuery};

/// Reported change for a metric that grew from zero.
pub const NEW_QUERY_CHANGE: f64 = 999.0;

/// Per-metric ceiling applied before weighting, so a jump from a tiny base
/// cannot swamp the ranking.
pub const CHANGE_CAP: f64 = 500.0;

const CLICKS_WEIGHT: f64 = 0.6;
const IMPRESSIONS_WEIGHT: f64 = 0.4;

pub fn percent_change(current: u64, previous: u64) -> f64 {
    if previous == 0 {
        return if current > 0 { NEW_QUERY_CHANGE } else { 0.0 };
    }
    (current as f64 - previous as f64) * 100.0 / previous as f64
}

pub fn trend_score(clicks_change: f64, impressions_change: f64) -> f64 {
    clicks_change.min(CHANGE_CAP) * CLICKS_WEIGHT
        + impressions_change.min(CHANGE_CAP) * IMPRESSIONS_WEIGHT
}

/// Rank queries seen in `current` by growth against `previous`, keeping the top `limit`.
pub fn compute_trending(
    current: &HashMap<String, QueryTotals>,
    previous: &HashMap<String, QueryTotals>,
    limit: usize,
) -> Vec<TrendingQuery> {
    let mut trending: Vec<TrendingQuery> = current
        .iter()
        .filter(|(_, totals)| !totals.is_empty())
        .map(|(keyword, now)| {
            let before = previous.get(keyword).copied().unwrap_or_default();
            let clicks_change = percent_change(now.clicks, before.clicks);
            let impressions_change = percent_change(now.impressions, before.impressions);

            TrendingQuery {
                keyword: keyword.clone(),
                current_clicks: now.clicks,
                current_impressions: now.impressions,
                previous_clicks: before.clicks,
                previous_impressions: before.impressions,
                clicks_change,
                impressions_change,
                trend_score: trend_score(clicks_change, impressions_change),
                is_new: before.is_empty(),
            }
        })
        .collect();

    trending.sort_by(rank_order);
    trending.truncate(limit);
    trending
}

fn rank_order(a: &TrendingQuery, b: &TrendingQuery) -> Ordering {
    b.trend_score
        .total_cmp(&a.trend_score)
        .then_with(|| b.current_clicks.cmp(&a.current_clicks))
        .then_with(|| a.keyword.cmp(&b.keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(entries: &[(&str, u64, u64)]) -> HashMap<String, QueryTotals> {
        entries
            .iter()
            .map(|(k, c, i)| (k.to_string(), QueryTotals::new(*c, *i)))
            .collect()
    }

    #[test]
    fn test_new_query_from_zero() {
        let current = totals(&[("creatine gummies", 5, 50)]);
        let previous = totals(&[("creatine gummies", 0, 0)]);

        let trending = compute_trending(&current, &previous, 10);
        assert_eq!(trending.len(), 1);
        assert!(trending[0].is_new);
        assert_eq!(trending[0].clicks_change, NEW_QUERY_CHANGE);
        assert_eq!(trending[0].impressions_change, NEW_QUERY_CHANGE);
        assert_eq!(trending[0].trend_score, CHANGE_CAP);

        // Absent from the previous window behaves the same
        let trending = compute_trending(&current, &HashMap::new(), 10);
        assert!(trending[0].is_new);
    }

    #[test]
    fn test_percentage_deltas() {
        let current = totals(&[("zinc", 20, 150)]);
        let previous = totals(&[("zinc", 10, 100)]);

        let trending = compute_trending(&current, &previous, 10);
        assert_eq!(trending[0].clicks_change, 100.0);
        assert_eq!(trending[0].impressions_change, 50.0);
        assert!(!trending[0].is_new);
        assert!((trending[0].trend_score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_ranked_by_score_descending() {
        // Scores 10, 90 and 50
        let current = totals(&[("alpha", 11, 110), ("bravo", 19, 190), ("charlie", 15, 150)]);
        let previous = totals(&[("alpha", 10, 100), ("bravo", 10, 100), ("charlie", 10, 100)]);

        let trending = compute_trending(&current, &previous, 10);
        let scores: Vec<f64> = trending.iter().map(|t| t.trend_score.round()).collect();
        assert_eq!(scores, vec![90.0, 50.0, 10.0]);
        let keywords: Vec<&str> = trending.iter().map(|t| t.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["bravo", "charlie", "alpha"]);
    }

    #[test]
    fn test_ties_break_on_clicks_then_keyword() {
        let current = totals(&[("b-query", 20, 20), ("a-query", 20, 20), ("big", 40, 40)]);
        let previous = totals(&[("b-query", 10, 10), ("a-query", 10, 10), ("big", 20, 20)]);

        let trending = compute_trending(&current, &previous, 10);
        let keywords: Vec<&str> = trending.iter().map(|t| t.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["big", "a-query", "b-query"]);
    }

    #[test]
    fn test_declines_and_zero_rows() {
        let current = totals(&[("falling", 5, 50), ("gone", 0, 0)]);
        let previous = totals(&[("falling", 10, 100), ("gone", 30, 300)]);

        let trending = compute_trending(&current, &previous, 10);
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].clicks_change, -50.0);
        assert!(trending[0].trend_score < 0.0);
    }

    #[test]
    fn test_limit_and_partial_zero_base() {
        let current = totals(&[("a", 0, 40), ("b", 3, 30), ("c", 1, 10)]);
        let previous = totals(&[("a", 0, 20), ("b", 1, 10), ("c", 1, 10)]);

        let trending = compute_trending(&current, &previous, 2);
        assert_eq!(trending.len(), 2);
        // "a" has no clicks in either window: 0% clicks change, not "new"
        let a = compute_trending(&current, &previous, 10)
            .into_iter()
            .find(|t| t.keyword == "a")
            .unwrap();
        assert_eq!(a.clicks_change, 0.0);
        assert!(!a.is_new);
    }
}
