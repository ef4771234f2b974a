use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    ContentStatus, GscTokens, Keyword, KeywordFilter, KeywordUpdate, NewKeyword, PageAnalysis,
    SeoAnalysis,
};

use super::schema::SCHEMA;

const KEYWORD_COLUMNS: &str = "id, keyword, priority, category, focus_score, notes, target_url, \
     content_status, assigned_content_id, created_at, updated_at";

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Keyword operations

    pub async fn create_keyword(&self, input: NewKeyword) -> Result<Keyword> {
        let input = input.normalized()?;
        let now = Utc::now().to_rfc3339();

        let keyword = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO keywords (keyword, priority, category, focus_score, notes, target_url,
                                            content_status, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"#,
                    params![
                        input.keyword,
                        input.priority,
                        input.category,
                        input.focus_score,
                        input.notes,
                        input.target_url,
                        ContentStatus::NotStarted,
                        now,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                let keyword = conn.query_row(
                    &format!("SELECT {KEYWORD_COLUMNS} FROM keywords WHERE id = ?1"),
                    params![id],
                    keyword_from_row,
                )?;
                Ok(keyword)
            })
            .await?;

        tracing::debug!("Created keyword {} ({})", keyword.id, keyword.keyword);
        Ok(keyword)
    }

    pub async fn get_keyword(&self, id: i64) -> Result<Option<Keyword>> {
        let keyword = self
            .conn
            .call(move |conn| {
                let keyword = conn
                    .query_row(
                        &format!("SELECT {KEYWORD_COLUMNS} FROM keywords WHERE id = ?1"),
                        params![id],
                        keyword_from_row,
                    )
                    .optional()?;
                Ok(keyword)
            })
            .await?;
        Ok(keyword)
    }

    pub async fn update_keyword(&self, id: i64, update: KeywordUpdate) -> Result<Keyword> {
        let existing = self
            .get_keyword(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("keyword {id}")))?;

        if update.is_empty() {
            return Ok(existing);
        }

        let mut merged = update.apply_to(&existing)?;
        merged.updated_at = Utc::now();
        let row = merged.clone();

        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE keywords SET
                           keyword = ?1,
                           priority = ?2,
                           category = ?3,
                           focus_score = ?4,
                           notes = ?5,
                           target_url = ?6,
                           content_status = ?7,
                           assigned_content_id = ?8,
                           updated_at = ?9
                       WHERE id = ?10"#,
                    params![
                        row.keyword,
                        row.priority,
                        row.category,
                        row.focus_score,
                        row.notes,
                        row.target_url,
                        row.content_status,
                        row.assigned_content_id,
                        row.updated_at.to_rfc3339(),
                        row.id,
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        // Deleted between the read and the write
        if changed == 0 {
            return Err(AppError::NotFound(format!("keyword {id}")));
        }

        Ok(merged)
    }

    /// Record an accepted auto-match: link the keyword to a content item.
    pub async fn assign_content(
        &self,
        id: i64,
        content_id: String,
        status: ContentStatus,
    ) -> Result<Keyword> {
        self.update_keyword(
            id,
            KeywordUpdate {
                assigned_content_id: Some(Some(content_id)),
                content_status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete_keyword(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM seo_analyses WHERE keyword_id = ?1", params![id])?;
                let deleted = tx.execute("DELETE FROM keywords WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(deleted)
            })
            .await?;

        if deleted == 0 {
            return Err(AppError::NotFound(format!("keyword {id}")));
        }
        Ok(())
    }

    pub async fn list_keywords(&self, filter: &KeywordFilter) -> Result<Vec<Keyword>> {
        let priority = filter.priority;
        let category = filter.category.clone();
        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut keywords = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {KEYWORD_COLUMNS} FROM keywords
                       WHERE (?1 IS NULL OR priority = ?1)
                         AND (?2 IS NULL OR category = ?2)
                       ORDER BY id"#
                ))?;
                let keywords = stmt
                    .query_map(params![priority, category], keyword_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(keywords)
            })
            .await?;

        // SQLite LIKE only folds ASCII case
        if let Some(needle) = needle {
            keywords.retain(|k| k.keyword.to_lowercase().contains(&needle));
        }
        Ok(keywords)
    }

    // Analysis operations

    /// Store an analysis, replacing whatever was recorded for the keyword before.
    pub async fn save_analysis(&self, analysis: &SeoAnalysis) -> Result<()> {
        let h1_matches = serde_json::to_string(&analysis.page.h1_matches)?;
        let recommendations = serde_json::to_string(&analysis.page.recommendations)?;
        let analysis = analysis.clone();

        self.conn
            .call(move |conn| {
                let page = &analysis.page;
                conn.execute(
                    r#"INSERT INTO seo_analyses (keyword_id, target_url, has_h1, h1_matches, has_meta_title,
                                                meta_title, meta_title_match, has_meta_description,
                                                meta_description, meta_description_match, keyword_density,
                                                word_count, keyword_count, seo_score, recommendations,
                                                analyzed_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                       ON CONFLICT(keyword_id) DO UPDATE SET
                           target_url = excluded.target_url,
                           has_h1 = excluded.has_h1,
                           h1_matches = excluded.h1_matches,
                           has_meta_title = excluded.has_meta_title,
                           meta_title = excluded.meta_title,
                           meta_title_match = excluded.meta_title_match,
                           has_meta_description = excluded.has_meta_description,
                           meta_description = excluded.meta_description,
                           meta_description_match = excluded.meta_description_match,
                           keyword_density = excluded.keyword_density,
                           word_count = excluded.word_count,
                           keyword_count = excluded.keyword_count,
                           seo_score = excluded.seo_score,
                           recommendations = excluded.recommendations,
                           analyzed_at = excluded.analyzed_at"#,
                    params![
                        analysis.keyword_id,
                        page.target_url,
                        page.has_h1,
                        h1_matches,
                        page.has_meta_title,
                        page.meta_title,
                        page.meta_title_match,
                        page.has_meta_description,
                        page.meta_description,
                        page.meta_description_match,
                        page.keyword_density,
                        page.word_count,
                        page.keyword_count,
                        page.seo_score,
                        recommendations,
                        analysis.analyzed_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_analysis(&self, keyword_id: i64) -> Result<Option<SeoAnalysis>> {
        let analysis = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT keyword_id, target_url, has_h1, h1_matches, has_meta_title, meta_title,
                              meta_title_match, has_meta_description, meta_description,
                              meta_description_match, keyword_density, word_count, keyword_count,
                              seo_score, recommendations, analyzed_at
                       FROM seo_analyses WHERE keyword_id = ?1"#,
                )?;
                let analysis = stmt
                    .query_row(params![keyword_id], analysis_from_row)
                    .optional()?;
                Ok(analysis)
            })
            .await?;
        Ok(analysis)
    }

    // Search Console tokens

    pub async fn get_gsc_tokens(&self) -> Result<Option<GscTokens>> {
        let tokens = self
            .conn
            .call(|conn| {
                let tokens = conn
                    .query_row(
                        "SELECT access_token, refresh_token, expires_at FROM gsc_tokens WHERE id = 1",
                        [],
                        |row| {
                            Ok(GscTokens {
                                access_token: row.get(0)?,
                                refresh_token: row.get(1)?,
                                expires_at: datetime_column(row, 2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(tokens)
            })
            .await?;
        Ok(tokens)
    }

    pub async fn save_gsc_tokens(&self, tokens: &GscTokens) -> Result<()> {
        let tokens = tokens.clone();
        self.conn
            .call(move |conn| {
                // Google omits the refresh token on refresh responses; keep the stored one.
                conn.execute(
                    r#"INSERT INTO gsc_tokens (id, access_token, refresh_token, expires_at)
                       VALUES (1, ?1, ?2, ?3)
                       ON CONFLICT(id) DO UPDATE SET
                           access_token = excluded.access_token,
                           refresh_token = COALESCE(excluded.refresh_token, gsc_tokens.refresh_token),
                           expires_at = excluded.expires_at,
                           updated_at = datetime('now')"#,
                    params![
                        tokens.access_token,
                        tokens.refresh_token,
                        tokens.expires_at.to_rfc3339()
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn clear_gsc_tokens(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM gsc_tokens", [])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {raw}").into(),
        )
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn keyword_from_row(row: &Row) -> rusqlite::Result<Keyword> {
    Ok(Keyword {
        id: row.get(0)?,
        keyword: row.get(1)?,
        priority: row.get(2)?,
        category: row.get(3)?,
        focus_score: row.get(4)?,
        notes: row.get(5)?,
        target_url: row.get(6)?,
        content_status: row.get(7)?,
        assigned_content_id: row.get(8)?,
        created_at: datetime_column(row, 9)?,
        updated_at: datetime_column(row, 10)?,
    })
}

fn analysis_from_row(row: &Row) -> rusqlite::Result<SeoAnalysis> {
    Ok(SeoAnalysis {
        keyword_id: row.get(0)?,
        analyzed_at: datetime_column(row, 15)?,
        page: PageAnalysis {
            target_url: row.get(1)?,
            has_h1: row.get(2)?,
            h1_matches: json_column(row, 3)?,
            has_meta_title: row.get(4)?,
            meta_title: row.get(5)?,
            meta_title_match: row.get(6)?,
            has_meta_description: row.get(7)?,
            meta_description: row.get(8)?,
            meta_description_match: row.get(9)?,
            keyword_density: row.get(10)?,
            word_count: row.get(11)?,
            keyword_count: row.get(12)?,
            seo_score: row.get(13)?,
            recommendations: json_column(row, 14)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{Priority, Recommendation, RecommendationKind};
    use chrono::Duration;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    async fn setup_repo() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("keywords.db");
        let repo = Repository::new(path.to_str().unwrap())
            .await
            .expect("Failed to open repository");
        (dir, repo)
    }

    fn sample_page(url: &str, score: u8) -> PageAnalysis {
        PageAnalysis {
            target_url: url.to_string(),
            has_h1: true,
            h1_matches: vec!["Best Creatine 2024".into()],
            has_meta_title: true,
            meta_title: Some("Best Creatine".into()),
            meta_title_match: true,
            has_meta_description: false,
            meta_description: None,
            meta_description_match: false,
            keyword_density: 1.25,
            word_count: 320,
            keyword_count: 2,
            seo_score: score,
            recommendations: vec![Recommendation {
                kind: RecommendationKind::MissingDescription,
                message: "Add a meta description".into(),
                priority: Priority::Medium,
            }],
        }
    }

    #[tokio::test]
    async fn test_create_then_list_round_trip() {
        let (_dir, repo) = setup_repo().await;

        let mut input = NewKeyword::new("best testosterone supplement", Priority::High)
            .with_focus_score(80)
            .with_target_url("https://example.com/testosterone");
        input.category = Some("supplements".into());
        let created = repo.create_keyword(input).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.content_status, ContentStatus::NotStarted);
        assert_eq!(created.assigned_content_id, None);
        assert_eq!(created.notes, None);

        let listed = repo.list_keywords(&KeywordFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        let fetched = &listed[0];
        assert_eq!(fetched.keyword, "best testosterone supplement");
        assert_eq!(fetched.priority, Priority::High);
        assert_eq!(fetched.category.as_deref(), Some("supplements"));
        assert_eq!(fetched.focus_score, 80);
        assert_eq!(
            fetched.target_url.as_deref(),
            Some("https://example.com/testosterone")
        );
        assert_eq!(fetched.content_status, ContentStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_create_validation_errors() {
        let (_dir, repo) = setup_repo().await;

        let err = repo
            .create_keyword(NewKeyword::new("", Priority::Low))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = repo
            .create_keyword(NewKeyword::new("test", Priority::Low).with_focus_score(150))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let listed = repo.list_keywords(&KeywordFilter::default()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_combine() {
        let (_dir, repo) = setup_repo().await;

        for (text, priority, category) in [
            ("Best Creatine", Priority::High, Some("supplements")),
            ("creatine side effects", Priority::Low, Some("supplements")),
            ("protein powder", Priority::High, Some("nutrition")),
            ("100% whey", Priority::Medium, None),
        ] {
            let mut input = NewKeyword::new(text, priority);
            input.category = category.map(str::to_string);
            assert_ok!(repo.create_keyword(input).await);
        }

        let by_search = repo
            .list_keywords(&KeywordFilter {
                search: Some("CREATINE".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_search.len(), 2);

        let high_creatine = repo
            .list_keywords(&KeywordFilter {
                priority: Some(Priority::High),
                search: Some("creatine".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(high_creatine.len(), 1);
        assert_eq!(high_creatine[0].keyword, "Best Creatine");

        let nutrition = repo
            .list_keywords(&KeywordFilter {
                category: Some("nutrition".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(nutrition.len(), 1);

        // % is matched literally, not as a wildcard
        let percent = repo
            .list_keywords(&KeywordFilter {
                search: Some("0%".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].keyword, "100% whey");
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let (_dir, repo) = setup_repo().await;
        assert_ok!(
            repo.create_keyword(NewKeyword::new("Тестостерон бустер", Priority::High))
                .await
        );
        assert_ok!(repo.create_keyword(NewKeyword::new("Größe Kreatin", Priority::Low)).await);

        let cyrillic = repo
            .list_keywords(&KeywordFilter {
                search: Some("тестостерон".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cyrillic.len(), 1);
        assert_eq!(cyrillic[0].keyword, "Тестостерон бустер");

        let german = repo
            .list_keywords(&KeywordFilter {
                search: Some("GRÖẞE".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(german.len(), 1);
    }

    #[tokio::test]
    async fn test_update_merges_and_reports_missing() {
        let (_dir, repo) = setup_repo().await;
        let created = repo
            .create_keyword(NewKeyword::new("zinc benefits", Priority::Medium))
            .await
            .unwrap();

        let updated = repo
            .update_keyword(
                created.id,
                KeywordUpdate {
                    priority: Some(Priority::High),
                    target_url: Some(Some("https://example.com/zinc".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.keyword, "zinc benefits");

        let reloaded = repo.get_keyword(created.id).await.unwrap().unwrap();
        assert_eq!(reloaded, updated);

        let err = repo
            .update_keyword(9999, KeywordUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_record_unchanged() {
        let (_dir, repo) = setup_repo().await;
        let created = repo
            .create_keyword(NewKeyword::new("magnesium sleep", Priority::Low).with_focus_score(10))
            .await
            .unwrap();

        let err = repo
            .update_keyword(
                created.id,
                KeywordUpdate {
                    priority: Some(Priority::High),
                    focus_score: Some(500),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let reloaded = repo.get_keyword(created.id).await.unwrap().unwrap();
        assert_eq!(reloaded, created);
    }

    #[tokio::test]
    async fn test_assign_content_sets_link_and_status() {
        let (_dir, repo) = setup_repo().await;
        let created = repo
            .create_keyword(NewKeyword::new("ashwagandha dosage", Priority::Medium))
            .await
            .unwrap();

        let updated = repo
            .assign_content(created.id, "article-42".into(), ContentStatus::Published)
            .await
            .unwrap();
        assert_eq!(updated.assigned_content_id.as_deref(), Some("article-42"));
        assert_eq!(updated.content_status, ContentStatus::Published);
    }

    #[tokio::test]
    async fn test_delete_removes_keyword_and_analysis() {
        let (_dir, repo) = setup_repo().await;
        let created = repo
            .create_keyword(NewKeyword::new("vitamin d", Priority::High))
            .await
            .unwrap();
        let analysis = SeoAnalysis::new(created.id, sample_page("https://example.com/d", 70));
        repo.save_analysis(&analysis).await.unwrap();

        assert_ok!(repo.delete_keyword(created.id).await);
        assert!(repo.get_keyword(created.id).await.unwrap().is_none());
        assert!(repo.get_analysis(created.id).await.unwrap().is_none());

        let err = assert_err!(repo.delete_keyword(created.id).await);
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_save_analysis_replaces_previous() {
        let (_dir, repo) = setup_repo().await;
        let created = repo
            .create_keyword(NewKeyword::new("best creatine", Priority::High))
            .await
            .unwrap();

        let first = SeoAnalysis::new(created.id, sample_page("https://example.com/a", 55));
        repo.save_analysis(&first).await.unwrap();

        let mut second = SeoAnalysis::new(created.id, sample_page("https://example.com/b", 90));
        second.analyzed_at = first.analyzed_at + Duration::minutes(5);
        second.page.recommendations.clear();
        repo.save_analysis(&second).await.unwrap();

        let stored = repo.get_analysis(created.id).await.unwrap().unwrap();
        assert_eq!(stored.page.seo_score, 90);
        assert_eq!(stored.page.target_url, "https://example.com/b");
        assert!(stored.page.recommendations.is_empty());
        assert_eq!(stored.page.h1_matches, vec!["Best Creatine 2024".to_string()]);
        assert_eq!(stored.analyzed_at.timestamp(), second.analyzed_at.timestamp());
    }

    #[tokio::test]
    async fn test_gsc_tokens_keep_refresh_token() {
        let (_dir, repo) = setup_repo().await;
        assert!(repo.get_gsc_tokens().await.unwrap().is_none());

        let expires_at = Utc::now() + Duration::hours(1);
        repo.save_gsc_tokens(&GscTokens {
            access_token: "first".into(),
            refresh_token: Some("refresh".into()),
            expires_at,
        })
        .await
        .unwrap();

        repo.save_gsc_tokens(&GscTokens {
            access_token: "second".into(),
            refresh_token: None,
            expires_at,
        })
        .await
        .unwrap();

        let stored = repo.get_gsc_tokens().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "second");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));

        repo.clear_gsc_tokens().await.unwrap();
        assert!(repo.get_gsc_tokens().await.unwrap().is_none());
    }
}
