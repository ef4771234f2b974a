use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Keyword, NewKeyword, Priority, MAX_FOCUS_SCORE};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_MODEL: &str = "claude-3-5-haiku-20241022";

/// Existing keywords sent as context; the rest are only used for de-duplication.
const MAX_CONTEXT_KEYWORDS: usize = 200;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\[.*?\])\s*```").expect("static regex must compile")
});

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

/// Shape the model is asked to produce. Anything else is rejected.
#[derive(Debug, Deserialize)]
struct RawSuggestion {
    keyword: String,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    focus_score: Option<i64>,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordSuggestion {
    pub keyword: String,
    pub priority: Priority,
    pub category: Option<String>,
    pub focus_score: i32,
    pub rationale: Option<String>,
}

impl KeywordSuggestion {
    pub fn into_new_keyword(self) -> NewKeyword {
        let mut input =
            NewKeyword::new(self.keyword, self.priority).with_focus_score(self.focus_score);
        input.category = self.category;
        input.notes = self.rationale;
        input
    }
}

pub struct KeywordSuggester {
    client: Client,
    api_key: String,
    api_url: String,
}

impl KeywordSuggester {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_key,
            api_url: CLAUDE_API_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_endpoint(mut self, client: Client, api_url: String) -> Self {
        self.client = client;
        self.api_url = api_url;
        self
    }

    /// One round trip to the model. Failures are reported, never retried.
    pub async fn suggest(
        &self,
        existing: &[Keyword],
        focus_area: Option<&str>,
    ) -> Result<Vec<KeywordSuggestion>> {
        let system_prompt = r#"You are an SEO strategist for a supplement brand.
Suggest new target keywords that complement the ones already tracked.
Respond with a JSON array only. Each element must be an object with:
  "keyword" (string), "priority" ("high" | "medium" | "low"),
  "category" (string or null), "focus_score" (integer 0-100),
  "rationale" (one short sentence)."#;

        let tracked = existing
            .iter()
            .take(MAX_CONTEXT_KEYWORDS)
            .map(|k| format!("- {} ({})", k.keyword, k.priority))
            .collect::<Vec<_>>()
            .join("\n");

        let mut user_message = format!(
            "Keywords already tracked:\n{}\n\nSuggest 10 new keywords.",
            if tracked.is_empty() { "(none)" } else { tracked.as_str() }
        );
        if let Some(focus) = focus_area.map(str::trim).filter(|f| !f.is_empty()) {
            user_message.push_str(&format!(" Focus on: {focus}."));
        }

        let request = MessageRequest {
            model: CLAUDE_MODEL.to_string(),
            max_tokens: 2048,
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message,
            }],
            system: Some(system_prompt.to_string()),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("API error {status}: {error_text}")));
        }

        let message_response: MessageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("unreadable API response: {e}")))?;

        let text = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        parse_suggestions(&text, existing)
    }
}

/// Validate model output against the suggestion schema.
///
/// Entries with a blank keyword or that duplicate a tracked keyword are
/// dropped; a response with no parsable array is an error.
pub fn parse_suggestions(text: &str, existing: &[Keyword]) -> Result<Vec<KeywordSuggestion>> {
    let json = extract_json_array(text)
        .ok_or_else(|| AppError::Provider("response did not contain a JSON array".to_string()))?;

    let raw: Vec<RawSuggestion> = serde_json::from_str(json)
        .map_err(|e| AppError::Provider(format!("suggestions did not match the schema: {e}")))?;

    let mut seen: HashSet<String> = existing.iter().map(|k| dedupe_key(&k.keyword)).collect();
    let mut suggestions = Vec::new();

    for item in raw {
        let keyword = item.keyword.trim();
        if keyword.is_empty() {
            tracing::warn!("Dropping suggestion with empty keyword");
            continue;
        }
        if !seen.insert(dedupe_key(keyword)) {
            tracing::debug!("Dropping duplicate suggestion: {}", keyword);
            continue;
        }

        suggestions.push(KeywordSuggestion {
            keyword: keyword.to_string(),
            priority: item.priority.unwrap_or_default(),
            category: item
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            focus_score: item
                .focus_score
                .unwrap_or(0)
                .clamp(0, i64::from(MAX_FOCUS_SCORE)) as i32,
            rationale: item.rationale.filter(|r| !r.trim().is_empty()),
        });
    }

    Ok(suggestions)
}

fn extract_json_array(text: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(text) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn dedupe_key(keyword: &str) -> String {
    keyword.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
