use std::sync::LazyLock;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{parse_target_url, Keyword, PageAnalysis, Priority, Recommendation, RecommendationKind};

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

// Rubric weights
const H1_PRESENT: i32 = 20;
const H1_KEYWORD: i32 = 15;
const TITLE_PRESENT: i32 = 15;
const TITLE_KEYWORD: i32 = 15;
const DESCRIPTION_PRESENT: i32 = 10;
const DESCRIPTION_KEYWORD: i32 = 10;
const DENSITY_IN_BAND: i32 = 15;
const DENSITY_LOW: i32 = 7;
const DENSITY_STUFFING_PENALTY: i32 = -10;

const DENSITY_MIN: f64 = 0.5;
const DENSITY_MAX: f64 = 2.5;

const TITLE_MAX_CHARS: usize = 60;
const DESCRIPTION_MAX_CHARS: usize = 160;

/// Elements whose text never renders as page copy.
const HIDDEN_TAGS: [&str; 5] = ["script", "style", "noscript", "template", "svg"];
/// Elements that flow within a line; every other element (and `br`) breaks words.
const INLINE_TAGS: [&str; 24] = [
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "del", "dfn", "em", "font", "i",
    "ins", "kbd", "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup",
];

static H1: LazyLock<Selector> = LazyLock::new(|| css("h1"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| css("title"));
static META_NAMED: LazyLock<Selector> = LazyLock::new(|| css("meta[name]"));
static BODY: LazyLock<Selector> = LazyLock::new(|| css("body"));

fn css(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector must parse")
}

/// One keyword/URL pair queued for a batch run.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub keyword_id: i64,
    pub keyword: String,
    pub target_url: String,
}

impl AnalysisJob {
    pub fn from_keyword(keyword: &Keyword) -> Option<Self> {
        keyword.target_url.as_ref().map(|url| Self {
            keyword_id: keyword.id,
            keyword: keyword.keyword.clone(),
            target_url: url.clone(),
        })
    }
}

pub struct SeoAnalyzer {
    client: Client,
    max_bytes: usize,
}

impl SeoAnalyzer {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT_STRING)
            .build()?;
        Ok(Self::with_client(client, max_bytes))
    }

    pub fn with_client(client: Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }

    /// Fetch `target_url` and score it for `keyword`.
    pub async fn analyze(
        &self,
        keyword: &str,
        target_url: &str,
        cancel: &CancellationToken,
    ) -> Result<PageAnalysis> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(AppError::validation("keyword must not be empty"));
        }
        let target_url = target_url.trim();
        let url = parse_target_url(target_url).map_err(AppError::InvalidTarget)?;

        let html = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            html = self.fetch_page(&url) => html?,
        };

        let analysis = analyze_html(keyword, target_url, &html);
        tracing::debug!(
            "Analyzed {} for \"{}\": score {}",
            target_url,
            keyword,
            analysis.seo_score
        );
        Ok(analysis)
    }

    /// Analyze many pages with at most `concurrency` fetches in flight.
    /// Yields exactly one result per job, in completion order.
    pub async fn analyze_all(
        &self,
        jobs: Vec<AnalysisJob>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<(i64, Result<PageAnalysis>)> {
        stream::iter(jobs)
            .map(|job| async move {
                let result = self.analyze(&job.keyword, &job.target_url, cancel).await;
                if let Err(e) = &result {
                    tracing::debug!("Failed to analyze {}: {}", job.target_url, e);
                }
                (job.keyword_id, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(url, e))?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!("{url}: HTTP {}", response.status())));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(AppError::Fetch(format!(
                    "{url}: response of {length} bytes exceeds the {} byte limit",
                    self.max_bytes
                )));
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| fetch_error(url, e))? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(AppError::Fetch(format!(
                    "{url}: response exceeds the {} byte limit",
                    self.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn fetch_error(url: &Url, err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Fetch(format!("{url}: request timed out"))
    } else {
        AppError::Fetch(format!("{url}: {err}"))
    }
}

/// Score an already-fetched document. Pure: same input, same output.
pub fn analyze_html(keyword: &str, target_url: &str, html: &str) -> PageAnalysis {
    let document = Html::parse_document(html);
    let phrase = normalize(keyword);

    let headings: Vec<String> = document
        .select(&H1)
        .map(|h| collapse_whitespace(&rendered_text(h)))
        .filter(|h| !h.is_empty())
        .collect();
    let h1_matches: Vec<String> = headings
        .iter()
        .filter(|h| contains_phrase(h, &phrase))
        .cloned()
        .collect();

    let meta_title = document
        .select(&TITLE)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let meta_description = document
        .select(&META_NAMED)
        .filter(|m| {
            m.value()
                .attr("name")
                .is_some_and(|name| name.trim().eq_ignore_ascii_case("description"))
        })
        .find_map(|m| m.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|d| !d.is_empty());

    let body_text = visible_text(&document);
    let word_count = count_words(&body_text);
    let keyword_count = if phrase.is_empty() {
        0
    } else {
        normalize(&body_text).matches(phrase.as_str()).count() as u32
    };
    let words_in_keyword = phrase.split(' ').filter(|w| !w.is_empty()).count() as u32;
    let keyword_density = keyword_density(keyword_count, words_in_keyword, word_count);

    let meta_title_match = meta_title
        .as_deref()
        .is_some_and(|t| contains_phrase(t, &phrase));
    let meta_description_match = meta_description
        .as_deref()
        .is_some_and(|d| contains_phrase(d, &phrase));

    let signals = Signals {
        h1_count: headings.len(),
        h1_match: !h1_matches.is_empty(),
        title: meta_title.as_deref(),
        title_match: meta_title_match,
        description: meta_description.as_deref(),
        description_match: meta_description_match,
        keyword_count,
        density: keyword_density,
    };
    let seo_score = score(&signals);
    let recommendations = recommendations(keyword.trim(), &signals);

    PageAnalysis {
        target_url: target_url.to_string(),
        has_h1: !headings.is_empty(),
        h1_matches,
        has_meta_title: meta_title.is_some(),
        meta_title,
        meta_title_match,
        has_meta_description: meta_description.is_some(),
        meta_description,
        meta_description_match,
        keyword_density,
        word_count,
        keyword_count,
        seo_score,
        recommendations,
    }
}

struct Signals<'a> {
    h1_count: usize,
    h1_match: bool,
    title: Option<&'a str>,
    title_match: bool,
    description: Option<&'a str>,
    description_match: bool,
    keyword_count: u32,
    density: f64,
}

fn score(s: &Signals) -> u8 {
    let mut points = 0;

    if s.h1_count > 0 {
        points += H1_PRESENT;
        if s.h1_match {
            points += H1_KEYWORD;
        }
    }
    if s.title.is_some() {
        points += TITLE_PRESENT;
        if s.title_match {
            points += TITLE_KEYWORD;
        }
    }
    if s.description.is_some() {
        points += DESCRIPTION_PRESENT;
        if s.description_match {
            points += DESCRIPTION_KEYWORD;
        }
    }

    points += if s.density > DENSITY_MAX {
        DENSITY_STUFFING_PENALTY
    } else if s.density >= DENSITY_MIN {
        DENSITY_IN_BAND
    } else if s.density > 0.0 {
        DENSITY_LOW
    } else {
        0
    };

    points.clamp(0, 100) as u8
}

fn recommendations(keyword: &str, s: &Signals) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    let mut push = |kind, priority, message: String| {
        recs.push(Recommendation {
            kind,
            message,
            priority,
        })
    };

    if s.h1_count == 0 {
        push(
            RecommendationKind::MissingH1,
            Priority::High,
            format!("Add an H1 heading that includes \"{keyword}\""),
        );
    } else if !s.h1_match {
        push(
            RecommendationKind::H1Keyword,
            Priority::High,
            format!("Include \"{keyword}\" in the H1 heading"),
        );
    }

    match s.title {
        None => push(
            RecommendationKind::MissingTitle,
            Priority::High,
            format!("Add a <title> tag that includes \"{keyword}\""),
        ),
        Some(_) if !s.title_match => push(
            RecommendationKind::TitleKeyword,
            Priority::High,
            format!("Include \"{keyword}\" in the page title"),
        ),
        Some(_) => {}
    }

    match s.description {
        None => push(
            RecommendationKind::MissingDescription,
            Priority::Medium,
            format!("Add a meta description that mentions \"{keyword}\""),
        ),
        Some(_) if !s.description_match => push(
            RecommendationKind::DescriptionKeyword,
            Priority::Medium,
            format!("Mention \"{keyword}\" in the meta description"),
        ),
        Some(_) => {}
    }

    if s.keyword_count == 0 {
        push(
            RecommendationKind::KeywordMissing,
            Priority::Medium,
            format!("\"{keyword}\" does not appear in the page copy"),
        );
    } else if s.density < DENSITY_MIN {
        push(
            RecommendationKind::LowDensity,
            Priority::Medium,
            format!(
                "Keyword density is {:.2}%; aim for {DENSITY_MIN}%-{DENSITY_MAX}%",
                s.density
            ),
        );
    } else if s.density > DENSITY_MAX {
        push(
            RecommendationKind::HighDensity,
            Priority::Medium,
            format!(
                "Keyword density is {:.2}%; above {DENSITY_MAX}% reads as keyword stuffing",
                s.density
            ),
        );
    }

    if s.h1_count > 1 {
        push(
            RecommendationKind::MultipleH1,
            Priority::Low,
            format!("Page has {} H1 headings; keep a single H1", s.h1_count),
        );
    }
    if let Some(title) = s.title {
        let len = title.chars().count();
        if len > TITLE_MAX_CHARS {
            push(
                RecommendationKind::TitleLength,
                Priority::Low,
                format!("Title is {len} characters; search results truncate after about {TITLE_MAX_CHARS}"),
            );
        }
    }
    if let Some(description) = s.description {
        let len = description.chars().count();
        if len > DESCRIPTION_MAX_CHARS {
            push(
                RecommendationKind::DescriptionLength,
                Priority::Low,
                format!(
                    "Meta description is {len} characters; keep it under {DESCRIPTION_MAX_CHARS}"
                ),
            );
        }
    }

    // Stable: rubric order is kept within each priority
    recs.sort_by_key(|r| r.priority);
    recs
}

fn visible_text(document: &Html) -> String {
    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());
    rendered_text(root)
}

/// Text as a browser lays it out: inline runs join, block boundaries separate.
fn rendered_text(element: ElementRef) -> String {
    let mut text = String::new();
    push_rendered_text(element, &mut text);
    text
}

fn push_rendered_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(fragment) = child.value().as_text() {
            out.push_str(fragment);
        } else if let Some(child) = ElementRef::wrap(child) {
            let name = child.value().name();
            if HIDDEN_TAGS.contains(&name) {
                continue;
            }
            let breaks = !INLINE_TAGS.contains(&name);
            if breaks {
                out.push(' ');
            }
            push_rendered_text(child, out);
            if breaks {
                out.push(' ');
            }
        }
    }
}

fn count_words(text: &str) -> u32 {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .count() as u32
}

fn keyword_density(keyword_count: u32, words_in_keyword: u32, word_count: u32) -> f64 {
    if word_count == 0 {
        return 0.0;
    }
    let raw = f64::from(keyword_count * words_in_keyword) * 100.0 / f64::from(word_count);
    (raw * 100.0).round() / 100.0
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    !phrase.is_empty() && normalize(haystack).contains(phrase)
}
