use std::collections::HashMap;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::GscConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{DateRange, GscTokens, QueryTotals, TrendingQuery};
use crate::services::trends::compute_trending;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://www.googleapis.com/webmasters/v3";
const SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";

/// Search Console data settles a few days behind real time.
const DATA_LAG_DAYS: u64 = 3;
/// Largest page the search analytics API returns.
const ROW_LIMIT: u32 = 25_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchAnalyticsRequest {
    start_date: String,
    end_date: String,
    dimensions: Vec<&'static str>,
    row_limit: u32,
    start_row: u32,
}

#[derive(Debug, Deserialize)]
struct SearchAnalyticsResponse {
    #[serde(default)]
    rows: Vec<GscRow>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GscRow {
    pub keys: Vec<String>,
    pub clicks: f64,
    pub impressions: f64,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub position: f64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

/// Consent page the user visits to grant read-only Search Console access.
pub fn consent_url(config: &GscConfig) -> String {
    format!(
        "{AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(SCOPE),
    )
}

/// Current window: the `days` days ending at `end`. Previous: the `days` days before that.
pub fn comparison_windows(end: NaiveDate, days: u32) -> Result<(DateRange, DateRange)> {
    let days = u64::from(days.max(1));
    let out_of_range = || AppError::Config(format!("a {days}-day window ending {end} is out of range"));

    let current_start = end.checked_sub_days(Days::new(days - 1)).ok_or_else(out_of_range)?;
    let previous_end = current_start.checked_sub_days(Days::new(1)).ok_or_else(out_of_range)?;
    let previous_start = current_start.checked_sub_days(Days::new(days)).ok_or_else(out_of_range)?;

    Ok((
        DateRange {
            start: current_start,
            end,
        },
        DateRange {
            start: previous_start,
            end: previous_end,
        },
    ))
}

/// Sum rows per query text. Queries are matched case-insensitively.
pub fn aggregate_rows(rows: &[GscRow]) -> HashMap<String, QueryTotals> {
    let mut totals: HashMap<String, QueryTotals> = HashMap::new();
    for row in rows {
        let Some(query) = row.keys.first().map(|k| k.trim().to_lowercase()) else {
            continue;
        };
        if query.is_empty() {
            continue;
        }
        let entry = totals.entry(query).or_default();
        entry.clicks += metric(row.clicks);
        entry.impressions += metric(row.impressions);
    }
    totals
}

fn metric(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

pub struct GscClient {
    client: Client,
    config: Option<GscConfig>,
    repository: Repository,
    api_base: String,
    token_url: String,
    page_size: u32,
}

impl GscClient {
    pub fn new(config: Option<GscConfig>, repository: Repository, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("keyword-intel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            repository,
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            page_size: ROW_LIMIT,
        })
    }

    #[cfg(test)]
    fn with_endpoints(mut self, client: Client, api_base: String, token_url: String) -> Self {
        self.client = client;
        self.api_base = api_base;
        self.token_url = token_url;
        self
    }

    #[cfg(test)]
    fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn config(&self) -> Result<&GscConfig> {
        self.config.as_ref().ok_or_else(|| {
            AppError::NotConnected("add a [gsc] section to the config file".to_string())
        })
    }

    /// Trade an authorization code from the consent page for tokens and store them.
    pub async fn exchange_code(&self, code: &str) -> Result<GscTokens> {
        let config = self.config()?;
        let params = [
            ("code", code.trim()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let tokens = self.request_tokens(&params).await?;
        self.repository.save_gsc_tokens(&tokens).await?;
        tracing::info!("Connected to Search Console for {}", config.site_url);
        Ok(tokens)
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.repository.clear_gsc_tokens().await
    }

    /// A valid access token, refreshing the stored one if it has expired.
    pub async fn access_token(&self) -> Result<String> {
        let config = self.config()?;
        let tokens = self
            .repository
            .get_gsc_tokens()
            .await?
            .ok_or_else(|| AppError::NotConnected("no stored authorization".to_string()))?;

        if !tokens.is_expired(Utc::now()) {
            return Ok(tokens.access_token);
        }

        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            AppError::NotConnected("access expired and no refresh token is stored".to_string())
        })?;
        tracing::debug!("Refreshing Search Console access token");

        let params = [
            ("refresh_token", refresh_token.as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let refreshed = self.request_tokens(&params).await?;
        self.repository.save_gsc_tokens(&refreshed).await?;
        Ok(refreshed.access_token)
    }

    async fn request_tokens(&self, params: &[(&str, &str)]) -> Result<GscTokens> {
        let response = self
            .client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::Sync(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Sync(format!("token request failed: {e}")))?;

        match status {
            // invalid_grant / invalid_client: the user has to authorize again
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                return Err(AppError::NotConnected(format!(
                    "token endpoint returned HTTP {status}: {body}"
                )));
            }
            s if !s.is_success() => {
                return Err(AppError::Sync(format!(
                    "token endpoint returned HTTP {status}: {body}"
                )));
            }
            _ => {}
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::Sync(format!("unexpected token response: {e}")))?;

        Ok(GscTokens {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    /// Per-query rows for one date range, following `startRow` until a short page.
    pub async fn query(&self, range: DateRange) -> Result<Vec<GscRow>> {
        let config = self.config()?;
        let token = self.access_token().await?;

        let url = format!(
            "{}/sites/{}/searchAnalytics/query",
            self.api_base,
            urlencoding::encode(&config.site_url)
        );

        let mut rows = Vec::new();
        loop {
            let request = SearchAnalyticsRequest {
                start_date: range.start.format("%Y-%m-%d").to_string(),
                end_date: range.end.format("%Y-%m-%d").to_string(),
                dimensions: vec!["query"],
                row_limit: self.page_size,
                start_row: rows.len() as u32,
            };
            let page = self.query_page(&url, &token, &request).await?;
            let short = (page.len() as u32) < self.page_size;
            rows.extend(page);
            if short {
                break;
            }
            tracing::debug!("Fetched {} Search Console rows, requesting more", rows.len());
        }
        Ok(rows)
    }

    async fn query_page(
        &self,
        url: &str,
        token: &str,
        request: &SearchAnalyticsRequest,
    ) -> Result<Vec<GscRow>> {
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Sync(format!("search analytics request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Sync(format!("search analytics request failed: {e}")))?;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::NotConnected(format!(
                    "Search Console rejected the credentials (HTTP {status})"
                )));
            }
            s if !s.is_success() => {
                return Err(AppError::Sync(format!("HTTP {status}: {body}")));
            }
            _ => {}
        }

        let parsed: SearchAnalyticsResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::Sync(format!("unexpected search analytics response: {e}")))?;
        Ok(parsed.rows)
    }

    /// Rank queries by growth between the two most recent complete windows.
    pub async fn fetch_trending(
        &self,
        days: u32,
        limit: usize,
        today: NaiveDate,
    ) -> Result<Vec<TrendingQuery>> {
        let end = today
            .checked_sub_days(Days::new(DATA_LAG_DAYS))
            .ok_or_else(|| AppError::Config(format!("{today} is out of range")))?;
        let (current_range, previous_range) = comparison_windows(end, days)?;

        let current_rows = self.query(current_range).await?;
        let previous_rows = self.query(previous_range).await?;
        tracing::info!(
            "Synced {} current and {} previous Search Console rows ({}-day windows)",
            current_rows.len(),
            previous_rows.len(),
            current_range.days()
        );

        let current = aggregate_rows(&current_rows);
        let previous = aggregate_rows(&previous_rows);
        Ok(compute_trending(&current, &previous, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::services::test_support::{http_response, serve_once, serve_sequence, test_client};
    use tempfile::TempDir;

    fn gsc_config() -> GscConfig {
        GscConfig {
            client_id: "client.apps.googleusercontent.com".into(),
            client_secret: "secret".into(),
            site_url: "https://example.com/".into(),
            redirect_uri: "http://localhost:8080/callback".into(),
        }
    }

    fn row(query: &str, clicks: f64, impressions: f64) -> GscRow {
        GscRow {
            keys: vec![query.to_string()],
            clicks,
            impressions,
            ctr: 0.0,
            position: 0.0,
        }
    }

    async fn setup(config: Option<GscConfig>) -> (TempDir, Repository, GscClient) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path().join("gsc.db").to_str().unwrap())
            .await
            .unwrap();
        let client = GscClient::new(config, repo.clone(), Duration::from_secs(5)).unwrap();
        (dir, repo, client)
    }

    async fn store_tokens(repo: &Repository, expires_in: i64) {
        repo.save_gsc_tokens(&GscTokens {
            access_token: "stored-access".into(),
            refresh_token: Some("stored-refresh".into()),
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_consent_url_is_encoded() {
        let url = consent_url(&gsc_config());
        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("client_id=client.apps.googleusercontent.com"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fwebmasters.readonly"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_comparison_windows_are_adjacent() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 28).unwrap();
        let (current, previous) = comparison_windows(end, 28).unwrap();

        assert_eq!(current.end, end);
        assert_eq!(current.start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(previous.end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(previous.start, NaiveDate::from_ymd_opt(2024, 2, 2).unwrap());
        assert_eq!(current.days(), 28);
        assert_eq!(previous.days(), 28);
    }

    #[test]
    fn test_aggregate_rows_merges_case_and_skips_blank() {
        let rows = vec![
            row("Best Creatine", 3.0, 40.0),
            row("best creatine ", 2.0, 10.0),
            row("", 9.0, 9.0),
            row("zinc", f64::NAN, 5.0),
            GscRow {
                keys: vec![],
                ..row("ignored", 1.0, 1.0)
            },
        ];

        let totals = aggregate_rows(&rows);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals["best creatine"], QueryTotals::new(5, 50));
        assert_eq!(totals["zinc"], QueryTotals::new(0, 5));
    }

    #[tokio::test]
    async fn test_missing_config_or_tokens_is_not_connected() {
        let (_dir, _repo, client) = setup(None).await;
        let err = client.access_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);

        let (_dir, _repo, client) = setup(Some(gsc_config())).await;
        let err = client.access_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_fresh_token_is_used_without_refresh() {
        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, 3600).await;
        assert_eq!(client.access_token().await.unwrap(), "stored-access");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_stored() {
        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, -10).await;

        let token_url = serve_once(http_response(
            "200 OK",
            "application/json",
            r#"{"access_token":"fresh-access","expires_in":3599,"token_type":"Bearer"}"#,
        ))
        .await;
        let client = client.with_endpoints(test_client(), API_BASE.into(), token_url);

        assert_eq!(client.access_token().await.unwrap(), "fresh-access");
        let stored = repo.get_gsc_tokens().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "fresh-access");
        assert_eq!(stored.refresh_token.as_deref(), Some("stored-refresh"));
    }

    #[tokio::test]
    async fn test_revoked_refresh_is_not_connected() {
        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, -10).await;

        let token_url = serve_once(http_response(
            "400 Bad Request",
            "application/json",
            r#"{"error":"invalid_grant"}"#,
        ))
        .await;
        let client = client.with_endpoints(test_client(), API_BASE.into(), token_url);

        let err = client.access_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_token_endpoint_outage_is_sync_error() {
        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, -10).await;

        let token_url = serve_once(http_response(
            "503 Service Unavailable",
            "text/plain",
            "backend unavailable",
        ))
        .await;
        let client = client.with_endpoints(test_client(), API_BASE.into(), token_url);

        let err = client.access_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Sync);
        // Stored authorization is kept for the next attempt
        assert!(repo.get_gsc_tokens().await.unwrap().is_some());
    }

    #[test]
    fn test_comparison_windows_reject_out_of_range_dates() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 28).unwrap();
        let err = comparison_windows(end, u32::MAX).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let err = comparison_windows(NaiveDate::MIN, 1).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_query_follows_pages_until_short_page() {
        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, 3600).await;

        let api = serve_sequence(vec![
            http_response(
                "200 OK",
                "application/json",
                r#"{"rows":[{"keys":["best creatine"],"clicks":9,"impressions":90},{"keys":["zinc"],"clicks":5,"impressions":50}]}"#,
            ),
            http_response(
                "200 OK",
                "application/json",
                r#"{"rows":[{"keys":["magnesium sleep"],"clicks":1,"impressions":30}]}"#,
            ),
        ])
        .await;
        let client = client
            .with_endpoints(test_client(), api, TOKEN_URL.into())
            .with_page_size(2);

        let range = comparison_windows(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 7)
            .unwrap()
            .0;
        let rows = client.query(range).await.unwrap();
        let queries: Vec<&str> = rows.iter().map(|r| r.keys[0].as_str()).collect();
        assert_eq!(queries, vec!["best creatine", "zinc", "magnesium sleep"]);
    }

    #[tokio::test]
    async fn test_query_parses_rows() {
        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, 3600).await;

        let api = serve_once(http_response(
            "200 OK",
            "application/json",
            r#"{"rows":[{"keys":["best creatine"],"clicks":12,"impressions":340,"ctr":0.035,"position":7.2}],"responseAggregationType":"byProperty"}"#,
        ))
        .await;
        let client = client.with_endpoints(test_client(), api, TOKEN_URL.into());

        let range = comparison_windows(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 7)
            .unwrap()
            .0;
        let rows = client.query(range).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keys, vec!["best creatine"]);
        assert_eq!(rows[0].clicks, 12.0);
    }

    #[tokio::test]
    async fn test_query_without_rows_is_empty() {
        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, 3600).await;

        let api = serve_once(http_response(
            "200 OK",
            "application/json",
            r#"{"responseAggregationType":"byProperty"}"#,
        ))
        .await;
        let client = client.with_endpoints(test_client(), api, TOKEN_URL.into());

        let range = comparison_windows(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 7)
            .unwrap()
            .0;
        assert!(client.query(range).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_error_mapping() {
        let range = comparison_windows(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 7)
            .unwrap()
            .0;

        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, 3600).await;
        let api = serve_once(http_response("403 Forbidden", "application/json", "{}")).await;
        let client = client.with_endpoints(test_client(), api, TOKEN_URL.into());
        assert_eq!(
            client.query(range).await.unwrap_err().kind(),
            ErrorKind::NotConnected
        );

        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, 3600).await;
        let api = serve_once(http_response("500 Internal Server Error", "text/plain", "boom")).await;
        let client = client.with_endpoints(test_client(), api, TOKEN_URL.into());
        assert_eq!(client.query(range).await.unwrap_err().kind(), ErrorKind::Sync);

        let (_dir, repo, client) = setup(Some(gsc_config())).await;
        store_tokens(&repo, 3600).await;
        let api = serve_once(http_response(
            "200 OK",
            "application/json",
            r#"{"rows":[{"keys":["x"],"clicks":"lots"}]}"#,
        ))
        .await;
        let client = client.with_endpoints(test_client(), api, TOKEN_URL.into());
        assert_eq!(client.query(range).await.unwrap_err().kind(), ErrorKind::Sync);
    }
}
