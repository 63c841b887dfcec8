use std::env;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::calendar::format_duration_human;
use crate::config::InsightConfig;
use crate::stats::PeriodSummary;

pub const FALLBACK_INSIGHT: &str =
    "Insight is unavailable right now. Your tracked time is safe; try again later.";
pub const NO_ACTIVITY_INSIGHT: &str =
    "No focus time recorded for this period yet. Start a timer to get an insight.";

#[derive(Debug, Error)]
enum InsightError {
    #[error("no API key in ${0}")]
    MissingCredential(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned no text")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDigest {
    pub title: String,
    pub total_duration_human: String,
}

pub fn digests(summary: &PeriodSummary<'_>) -> Vec<TaskDigest> {
    summary
        .rows
        .iter()
        .map(|row| TaskDigest {
            title: row.task.title.clone(),
            total_duration_human: format_duration_human(row.duration),
        })
        .collect()
}

/// Produces a short text about where the time went. Implementations never
/// fail; any problem is reported through the returned text.
pub trait InsightService {
    fn summarize(&self, digests: &[TaskDigest], period_label: &str) -> String;
}

/// Gemini `generateContent` client.
pub struct GeminiInsight {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    timeout: Duration,
}

impl GeminiInsight {
    pub fn from_config(config: &InsightConfig) -> Self {
        let api_key = env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    fn request(&self, prompt: String) -> Result<String, InsightError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| InsightError::MissingCredential(self.api_key_env.clone()))?;

        let client = Client::builder().timeout(self.timeout).build()?;
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response: GenerateResponse = client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;

        response.text().ok_or(InsightError::EmptyResponse)
    }
}

impl InsightService for GeminiInsight {
    fn summarize(&self, digests: &[TaskDigest], period_label: &str) -> String {
        if digests.is_empty() {
            return NO_ACTIVITY_INSIGHT.to_string();
        }

        match self.request(build_prompt(digests, period_label)) {
            Ok(text) => {
                info!(model = %self.model, tasks = digests.len(), "insight generated");
                text
            }
            Err(err) => {
                warn!(%err, "insight request failed, using fallback");
                FALLBACK_INSIGHT.to_string()
            }
        }
    }
}

fn build_prompt(digests: &[TaskDigest], period_label: &str) -> String {
    let mut prompt = format!(
        "Here is how I spent my focus time ({period_label}). \
         In two or three encouraging sentences, summarise where my time went and suggest one improvement.\n\n"
    );
    for digest in digests {
        prompt.push_str(&format!("- {}: {}\n", digest.title, digest.total_duration_human));
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let text = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}
