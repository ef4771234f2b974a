use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ai::{KeywordSuggester, KeywordSuggestion};
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, ErrorKind, Result};
use crate::models::{
    AnalysisStatus, Keyword, KeywordFilter, KeywordUpdate, NewKeyword, PageAnalysis, Priority,
    SeoAnalysis, TrendStatus, TrendingQuery, MAX_FOCUS_SCORE,
};
use crate::services::{AnalysisJob, GscClient, SeoAnalyzer};
use crate::tui::{AppAction, InputMode};

const FOCUS_STEP: i32 = 5;

// Message for a finished page analysis
pub struct AnalysisResult {
    pub keyword_id: i64,
    pub result: Result<PageAnalysis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Keywords,
    Trending,
    Suggestions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
}

// Results received since the pending set was last empty
#[derive(Debug, Default)]
struct BatchTally {
    analyzed: usize,
    failed: usize,
    last_error: Option<String>,
}

/// Outcome of a headless analyze-all run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub analyzed: usize,
    pub failures: Vec<(i64, AppError)>,
}

pub struct App {
    // Data
    pub keywords: Vec<Keyword>,
    pub current_analysis: Option<SeoAnalysis>,
    pub trending: Vec<TrendingQuery>,
    pub suggestions: Vec<KeywordSuggestion>,

    // UI State
    pub view: View,
    pub selected_index: usize,
    pub trending_index: usize,
    pub suggestion_index: usize,
    pub filter: KeywordFilter,
    pub show_help: bool,
    pub input_mode: InputMode,
    pub input: String,
    pub status: Option<StatusLine>,

    // Lower-cased text of every stored keyword, regardless of filter
    tracked: HashSet<String>,

    // Async state
    pub analysis_status: AnalysisStatus,
    pub pending_analyses: HashSet<i64>,
    batch: BatchTally,
    pub trend_status: TrendStatus,
    pub suggestions_loading: bool,
    analysis_rx: mpsc::Receiver<AnalysisResult>,
    analysis_tx: mpsc::Sender<AnalysisResult>,
    trend_rx: mpsc::Receiver<Result<Vec<TrendingQuery>>>,
    trend_tx: mpsc::Sender<Result<Vec<TrendingQuery>>>,
    suggestion_rx: mpsc::Receiver<Result<Vec<KeywordSuggestion>>>,
    suggestion_tx: mpsc::Sender<Result<Vec<KeywordSuggestion>>>,
    cancel: CancellationToken,

    // Services
    pub repository: Repository,
    analyzer: Arc<SeoAnalyzer>,
    gsc: Arc<GscClient>,
    suggester: Option<Arc<KeywordSuggester>>,
    analysis_concurrency: usize,
    trending_days: u32,
    trending_limit: usize,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let analyzer = Arc::new(SeoAnalyzer::new(
            config.fetch_timeout(),
            config.max_page_bytes,
        )?);
        let gsc = Arc::new(GscClient::new(
            config.gsc.clone(),
            repository.clone(),
            config.fetch_timeout(),
        )?);

        let suggester = match &config.claude_api_key {
            Some(key) => Some(Arc::new(KeywordSuggester::new(key.clone())?)),
            None => None,
        };

        let filter = KeywordFilter::default();
        let keywords = repository.list_keywords(&filter).await?;
        let tracked = tracking_keys(&keywords);

        let (analysis_tx, analysis_rx) = mpsc::channel(64);
        let (trend_tx, trend_rx) = mpsc::channel(1);
        let (suggestion_tx, suggestion_rx) = mpsc::channel(1);

        let mut app = Self {
            keywords,
            current_analysis: None,
            trending: Vec::new(),
            suggestions: Vec::new(),
            view: View::Keywords,
            selected_index: 0,
            trending_index: 0,
            suggestion_index: 0,
            filter,
            show_help: false,
            input_mode: InputMode::Normal,
            input: String::new(),
            status: None,
            analysis_status: AnalysisStatus::NotAnalyzed,
            tracked,
            pending_analyses: HashSet::new(),
            batch: BatchTally::default(),
            trend_status: TrendStatus::Idle,
            suggestions_loading: false,
            analysis_rx,
            analysis_tx,
            trend_rx,
            trend_tx,
            suggestion_rx,
            suggestion_tx,
            cancel: CancellationToken::new(),
            repository,
            analyzer,
            gsc,
            suggester,
            analysis_concurrency: config.analysis_concurrency,
            trending_days: config.trending_days,
            trending_limit: config.trending_limit,
        };
        app.on_selection_changed().await?;
        Ok(app)
    }

    pub fn gsc(&self) -> &GscClient {
        &self.gsc
    }

    pub fn trending_days(&self) -> u32 {
        self.trending_days
    }

    pub fn selected_keyword(&self) -> Option<&Keyword> {
        self.keywords.get(self.selected_index)
    }

    pub fn is_busy(&self) -> bool {
        !self.pending_analyses.is_empty()
            || self.trend_status == TrendStatus::Syncing
            || self.suggestions_loading
    }

    /// Run an action, reporting failures in the status line instead of ending the session.
    pub async fn handle_action(&mut self, action: AppAction) -> Result<bool> {
        match self.dispatch(action).await {
            Ok(quit) => Ok(quit),
            Err(e) => {
                tracing::error!("Action failed ({}): {}", e.kind().as_str(), e);
                self.set_error(&e);
                Ok(false)
            }
        }
    }

    async fn dispatch(&mut self, action: AppAction) -> Result<bool> {
        match action {
            AppAction::Quit => {
                self.cancel.cancel();
                return Ok(true);
            }

            AppAction::MoveUp => self.move_selection(-1).await?,
            AppAction::MoveDown => self.move_selection(1).await?,
            AppAction::MoveToTop => self.move_selection(isize::MIN).await?,
            AppAction::MoveToBottom => self.move_selection(isize::MAX).await?,

            AppAction::Select => match self.view {
                View::Keywords => self.analyze_selected(),
                View::Trending => self.track_trending_query().await?,
                View::Suggestions => self.accept_suggestion().await?,
            },

            AppAction::AnalyzeAll => self.analyze_all().await?,

            AppAction::CancelAnalyses => {
                if !self.pending_analyses.is_empty() {
                    self.cancel.cancel();
                    self.cancel = CancellationToken::new();
                    self.set_info("Cancelling analyses...");
                }
            }

            AppAction::AddKeyword => self.begin_input(InputMode::AddKeyword, String::new()),

            AppAction::EditTargetUrl => {
                if let Some(keyword) = self.selected_keyword() {
                    let current = keyword.target_url.clone().unwrap_or_default();
                    self.begin_input(InputMode::TargetUrl, current);
                }
            }

            AppAction::Search => {
                let current = self.filter.search.clone().unwrap_or_default();
                self.begin_input(InputMode::Search, current);
            }

            AppAction::SuggestKeywords => {
                if self.suggester.is_none() {
                    self.set_info("Claude API key not configured; add claude_api_key to the config file");
                } else if !self.suggestions_loading {
                    self.begin_input(InputMode::FocusArea, String::new());
                }
            }

            AppAction::DeleteKeyword => {
                if self.view == View::Keywords && self.selected_keyword().is_some() {
                    self.begin_input(InputMode::ConfirmDelete, String::new());
                }
            }

            AppAction::CyclePriority => {
                if let Some(keyword) = self.selected_keyword() {
                    let update = KeywordUpdate {
                        priority: Some(keyword.priority.cycle()),
                        ..Default::default()
                    };
                    self.update_selected(update).await?;
                }
            }

            AppAction::CycleContentStatus => {
                if let Some(keyword) = self.selected_keyword() {
                    let update = KeywordUpdate {
                        content_status: Some(keyword.content_status.cycle()),
                        ..Default::default()
                    };
                    self.update_selected(update).await?;
                }
            }

            AppAction::IncreaseFocus => self.adjust_focus(FOCUS_STEP).await?,
            AppAction::DecreaseFocus => self.adjust_focus(-FOCUS_STEP).await?,

            AppAction::CycleFilter => {
                self.filter.cycle_priority();
                self.selected_index = 0;
                self.reload_keywords().await?;
            }

            AppAction::ShowTrending => {
                self.view = View::Trending;
                if self.trend_status != TrendStatus::Syncing {
                    self.sync_trending();
                }
            }

            AppAction::ShowKeywords => {
                self.view = View::Keywords;
            }

            AppAction::OpenInBrowser => {
                let url = match self.view {
                    View::Keywords => self.selected_keyword().and_then(|k| k.target_url.clone()),
                    _ => None,
                };
                if let Some(url) = url {
                    if let Err(e) = open::that(&url) {
                        tracing::warn!("Failed to open {}: {}", url, e);
                    }
                }
            }

            AppAction::ShowHelp => {
                self.show_help = true;
            }

            AppAction::HideHelp => {
                self.show_help = false;
            }

            AppAction::InputChar(c) => {
                if self.input_mode == InputMode::ConfirmDelete {
                    self.input_mode = InputMode::Normal;
                    if c.eq_ignore_ascii_case(&'y') {
                        self.delete_selected().await?;
                    }
                } else {
                    self.input.push(c);
                }
            }

            AppAction::InputBackspace => {
                self.input.pop();
            }

            AppAction::InputConfirm => {
                let mode = std::mem::take(&mut self.input_mode);
                let text = std::mem::take(&mut self.input);
                self.confirm_input(mode, text).await?;
            }

            AppAction::InputCancel => {
                self.input_mode = InputMode::Normal;
                self.input.clear();
            }
        }

        Ok(false)
    }

    fn begin_input(&mut self, mode: InputMode, initial: String) {
        self.input_mode = mode;
        self.input = initial;
    }

    async fn confirm_input(&mut self, mode: InputMode, text: String) -> Result<()> {
        match mode {
            InputMode::Normal | InputMode::ConfirmDelete => {}

            InputMode::AddKeyword => {
                let (keyword, url) = match text.split_once('|') {
                    Some((keyword, url)) => (keyword.trim(), Some(url.trim())),
                    None => (text.trim(), None),
                };
                let mut input = NewKeyword::new(keyword, Priority::Medium);
                if let Some(url) = url.filter(|u| !u.is_empty()) {
                    input = input.with_target_url(url);
                }
                let created = self.repository.create_keyword(input).await?;
                self.set_info(format!("Added \"{}\"", created.keyword));
                self.reload_keywords().await?;
                self.select_keyword_id(created.id).await?;
            }

            InputMode::TargetUrl => {
                let url = text.trim();
                let update = KeywordUpdate {
                    target_url: Some((!url.is_empty()).then(|| url.to_string())),
                    ..Default::default()
                };
                self.update_selected(update).await?;
            }

            InputMode::Search => {
                let search = text.trim();
                self.filter.search = (!search.is_empty()).then(|| search.to_string());
                self.selected_index = 0;
                self.reload_keywords().await?;
            }

            InputMode::FocusArea => {
                let focus = text.trim();
                self.request_suggestions((!focus.is_empty()).then(|| focus.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete_selected(&mut self) -> Result<()> {
        let Some(keyword) = self.selected_keyword() else {
            return Ok(());
        };
        let (id, label) = (keyword.id, keyword.keyword.clone());
        self.repository.delete_keyword(id).await?;
        self.pending_analyses.remove(&id);
        self.set_info(format!("Deleted \"{label}\""));
        self.reload_keywords().await
    }

    async fn move_selection(&mut self, delta: isize) -> Result<()> {
        let (index, len) = match self.view {
            View::Keywords => (&mut self.selected_index, self.keywords.len()),
            View::Trending => (&mut self.trending_index, self.trending.len()),
            View::Suggestions => (&mut self.suggestion_index, self.suggestions.len()),
        };
        if len == 0 {
            return Ok(());
        }

        let target = (*index as isize).saturating_add(delta).clamp(0, len as isize - 1) as usize;
        if target == *index {
            return Ok(());
        }
        *index = target;

        if self.view == View::Keywords {
            self.on_selection_changed().await?;
        }
        Ok(())
    }

    async fn on_selection_changed(&mut self) -> Result<()> {
        self.current_analysis = None;

        let Some(keyword) = self.selected_keyword() else {
            self.analysis_status = AnalysisStatus::NotAnalyzed;
            return Ok(());
        };
        let id = keyword.id;
        let has_url = keyword.target_url.is_some();

        if self.pending_analyses.contains(&id) {
            self.analysis_status = AnalysisStatus::Analyzing;
        } else if let Some(analysis) = self.repository.get_analysis(id).await? {
            self.current_analysis = Some(analysis);
            self.analysis_status = AnalysisStatus::Analyzed;
        } else if has_url {
            self.analysis_status = AnalysisStatus::NotAnalyzed;
        } else {
            self.analysis_status = AnalysisStatus::NoTargetUrl;
        }

        Ok(())
    }

    async fn reload_keywords(&mut self) -> Result<()> {
        let selected_id = self.selected_keyword().map(|k| k.id);
        self.keywords = self.repository.list_keywords(&self.filter).await?;
        self.tracked = if self.filter == KeywordFilter::default() {
            tracking_keys(&self.keywords)
        } else {
            tracking_keys(&self.repository.list_keywords(&KeywordFilter::default()).await?)
        };

        if let Some(index) = selected_id.and_then(|id| self.keywords.iter().position(|k| k.id == id)) {
            self.selected_index = index;
        } else if self.selected_index >= self.keywords.len() {
            self.selected_index = self.keywords.len().saturating_sub(1);
        }

        self.on_selection_changed().await
    }

    async fn select_keyword_id(&mut self, id: i64) -> Result<()> {
        if let Some(index) = self.keywords.iter().position(|k| k.id == id) {
            self.selected_index = index;
            self.on_selection_changed().await?;
        }
        Ok(())
    }

    async fn update_selected(&mut self, update: KeywordUpdate) -> Result<()> {
        let Some(keyword) = self.selected_keyword() else {
            return Ok(());
        };
        let id = keyword.id;
        self.repository.update_keyword(id, update).await?;
        self.reload_keywords().await
    }

    async fn adjust_focus(&mut self, delta: i32) -> Result<()> {
        let Some(keyword) = self.selected_keyword() else {
            return Ok(());
        };
        let score = (keyword.focus_score + delta).clamp(0, MAX_FOCUS_SCORE);
        if score == keyword.focus_score {
            return Ok(());
        }
        self.update_selected(KeywordUpdate {
            focus_score: Some(score),
            ..Default::default()
        })
        .await
    }

    // Analysis

    fn analyze_selected(&mut self) {
        let Some(keyword) = self.selected_keyword() else {
            return;
        };
        let Some(job) = AnalysisJob::from_keyword(keyword) else {
            self.analysis_status = AnalysisStatus::NoTargetUrl;
            return;
        };
        if self.pending_analyses.contains(&job.keyword_id) {
            return;
        }

        self.analysis_status = AnalysisStatus::Analyzing;
        self.pending_analyses.insert(job.keyword_id);

        // Spawn background task for the fetch
        let analyzer = Arc::clone(&self.analyzer);
        let tx = self.analysis_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let result = analyzer.analyze(&job.keyword, &job.target_url, &cancel).await;
            let _ = tx
                .send(AnalysisResult {
                    keyword_id: job.keyword_id,
                    result,
                })
                .await;
        });
    }

    async fn analyze_all(&mut self) -> Result<()> {
        let jobs: Vec<AnalysisJob> = self
            .repository
            .list_keywords(&KeywordFilter::default())
            .await?
            .iter()
            .filter(|k| !self.pending_analyses.contains(&k.id))
            .filter_map(AnalysisJob::from_keyword)
            .collect();

        if jobs.is_empty() {
            self.set_info("No keywords with a target URL to analyze");
            return Ok(());
        }

        self.set_info(format!("Analyzing {} pages...", jobs.len()));
        self.pending_analyses.extend(jobs.iter().map(|j| j.keyword_id));
        if self
            .selected_keyword()
            .is_some_and(|k| self.pending_analyses.contains(&k.id))
        {
            self.analysis_status = AnalysisStatus::Analyzing;
        }

        let analyzer = Arc::clone(&self.analyzer);
        let tx = self.analysis_tx.clone();
        let cancel = self.cancel.clone();
        let concurrency = self.analysis_concurrency;

        tokio::spawn(async move {
            let results = analyzer.analyze_all(jobs, concurrency, &cancel).await;
            for (keyword_id, result) in results {
                if tx.send(AnalysisResult { keyword_id, result }).await.is_err() {
                    break;
                }
            }
        });

        Ok(())
    }

    /// Drain finished analyses (non-blocking), persisting the successful ones.
    pub async fn poll_analysis_results(&mut self) -> Result<()> {
        while let Ok(message) = self.analysis_rx.try_recv() {
            self.pending_analyses.remove(&message.keyword_id);
            let is_selected = self.selected_keyword().map(|k| k.id) == Some(message.keyword_id);

            match store_result(&self.repository, message.keyword_id, message.result).await {
                Ok(Some(analysis)) => {
                    self.batch.analyzed += 1;
                    if is_selected {
                        self.set_info(format!("SEO score: {}", analysis.page.seo_score));
                        self.current_analysis = Some(analysis);
                        self.analysis_status = AnalysisStatus::Analyzed;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Analysis of keyword {} failed: {}", message.keyword_id, e);
                    self.batch.failed += 1;
                    self.batch.last_error = Some(e.to_string());
                    if is_selected {
                        // Keep showing the previous analysis, if any
                        self.analysis_status = if self.current_analysis.is_some() {
                            AnalysisStatus::Analyzed
                        } else {
                            AnalysisStatus::Failed
                        };
                    }
                    self.set_error(&e);
                }
            }

            if self.pending_analyses.is_empty() {
                self.finish_batch();
            }
        }
        Ok(())
    }

    fn finish_batch(&mut self) {
        let BatchTally {
            analyzed,
            failed,
            last_error,
        } = std::mem::take(&mut self.batch);

        // A lone result already left its own message
        if analyzed + failed <= 1 {
            return;
        }
        if failed > 0 {
            self.status = Some(StatusLine {
                text: format!(
                    "{analyzed} analyzed, {failed} failed (last: {})",
                    last_error.unwrap_or_default()
                ),
                is_error: true,
            });
        } else {
            self.set_info(format!("{analyzed} analyzed"));
        }
    }

    /// Headless analyze-all: waits for every page and persists results.
    pub async fn analyze_all_blocking(&mut self) -> Result<BatchReport> {
        let jobs: Vec<AnalysisJob> = self
            .repository
            .list_keywords(&KeywordFilter::default())
            .await?
            .iter()
            .filter_map(AnalysisJob::from_keyword)
            .collect();

        let results = self
            .analyzer
            .analyze_all(jobs, self.analysis_concurrency, &self.cancel)
            .await;

        let mut report = BatchReport::default();
        for (keyword_id, result) in results {
            match store_result(&self.repository, keyword_id, result).await {
                Ok(Some(_)) => report.analyzed += 1,
                Ok(None) => {}
                Err(e) => report.failures.push((keyword_id, e)),
            }
        }
        Ok(report)
    }

    // Trending

    fn sync_trending(&mut self) {
        self.trend_status = TrendStatus::Syncing;

        let gsc = Arc::clone(&self.gsc);
        let tx = self.trend_tx.clone();
        let (days, limit) = (self.trending_days, self.trending_limit);

        tokio::spawn(async move {
            let result = gsc.fetch_trending(days, limit, Utc::now().date_naive()).await;
            let _ = tx.send(result).await;
        });
    }

    pub async fn poll_trend_result(&mut self) -> Result<()> {
        if let Ok(result) = self.trend_rx.try_recv() {
            match result {
                Ok(trending) => {
                    self.set_info(format!("{} trending queries", trending.len()));
                    self.trending = trending;
                    self.trending_index = 0;
                    self.trend_status = TrendStatus::Ready;
                }
                Err(e) => {
                    tracing::error!("Search Console sync failed: {}", e);
                    self.trend_status = if e.kind() == ErrorKind::NotConnected {
                        TrendStatus::NotConnected
                    } else {
                        TrendStatus::Failed
                    };
                    self.set_error(&e);
                }
            }
        }
        Ok(())
    }

    /// Start tracking the highlighted trending query as a keyword.
    async fn track_trending_query(&mut self) -> Result<()> {
        let Some(query) = self.trending.get(self.trending_index) else {
            return Ok(());
        };
        let keyword = query.keyword.clone();
        if self.is_tracked(&keyword) {
            self.set_info(format!("\"{keyword}\" is already tracked"));
            return Ok(());
        }
        let created = self
            .repository
            .create_keyword(NewKeyword::new(keyword, Priority::Medium))
            .await?;
        self.set_info(format!("Now tracking \"{}\"", created.keyword));
        self.reload_keywords().await
    }

    pub fn is_tracked(&self, query: &str) -> bool {
        self.tracked.contains(&tracking_key(query))
    }

    // Suggestions

    async fn request_suggestions(&mut self, focus_area: Option<String>) -> Result<()> {
        let Some(suggester) = &self.suggester else {
            return Ok(());
        };

        let existing = self
            .repository
            .list_keywords(&KeywordFilter::default())
            .await?;
        self.suggestions_loading = true;
        self.view = View::Suggestions;

        let suggester = Arc::clone(suggester);
        let tx = self.suggestion_tx.clone();

        tokio::spawn(async move {
            let result = suggester.suggest(&existing, focus_area.as_deref()).await;
            let _ = tx.send(result).await;
        });

        Ok(())
    }

    pub async fn poll_suggestion_result(&mut self) -> Result<()> {
        if let Ok(result) = self.suggestion_rx.try_recv() {
            self.suggestions_loading = false;
            match result {
                Ok(suggestions) => {
                    self.set_info(format!("{} suggestions", suggestions.len()));
                    self.suggestions = suggestions;
                    self.suggestion_index = 0;
                }
                Err(e) => {
                    tracing::error!("Keyword suggestions failed: {}", e);
                    self.set_error(&e);
                }
            }
        }
        Ok(())
    }

    async fn accept_suggestion(&mut self) -> Result<()> {
        if self.suggestion_index >= self.suggestions.len() {
            return Ok(());
        }
        let suggestion = self.suggestions.remove(self.suggestion_index);
        let created = self
            .repository
            .create_keyword(suggestion.into_new_keyword())
            .await?;
        if self.suggestion_index >= self.suggestions.len() {
            self.suggestion_index = self.suggestions.len().saturating_sub(1);
        }
        self.set_info(format!("Added \"{}\"", created.keyword));
        self.reload_keywords().await
    }

    fn set_info(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: false,
        });
    }

    fn set_error(&mut self, err: &AppError) {
        self.status = Some(StatusLine {
            text: err.to_string(),
            is_error: true,
        });
    }
}

fn tracking_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn tracking_keys(keywords: &[Keyword]) -> HashSet<String> {
    keywords.iter().map(|k| tracking_key(&k.keyword)).collect()
}

/// Persist a successful analysis. Returns `None` when the keyword was
/// deleted while its page was being fetched.
async fn store_result(
    repository: &Repository,
    keyword_id: i64,
    result: Result<PageAnalysis>,
) -> Result<Option<SeoAnalysis>> {
    let page = result?;
    if repository.get_keyword(keyword_id).await?.is_none() {
        tracing::debug!("Keyword {} was deleted; discarding analysis", keyword_id);
        return Ok(None);
    }
    let analysis = SeoAnalysis::new(keyword_id, page);
    repository.save_analysis(&analysis).await?;
    tracing::info!(
        "Saved analysis for keyword {} (score {})",
        keyword_id,
        analysis.page.seo_score
    );
    Ok(Some(analysis))
}
