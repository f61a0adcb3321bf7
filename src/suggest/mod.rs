//! # Suggest Module
//!
//! Asks an OpenAI-compatible chat completion endpoint for songs similar to a
//! seed song and pulls the numbered list out of the answer.
//!
//! The model answers in free text. [`extract_suggestions`] only keeps lines
//! that look like `1. Artist - Title`, so commentary around the list is
//! dropped.

use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::{
    config::LlmSettings,
    types::{ChatMessage, ChatRequest, ChatResponse},
};

pub const DEFAULT_SUGGESTIONS: u32 = 10;
pub const MAX_SUGGESTIONS: u32 = 50;

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("LLM_API_KEY is not set")]
    NotConfigured,

    #[error("completion request returned {0}")]
    Status(StatusCode),

    #[error("completion response contained no choices")]
    Empty,

    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SuggestError {
    pub fn is_unavailable(&self) -> bool {
        match self {
            SuggestError::Transport(e) => e.is_timeout() || e.is_connect(),
            SuggestError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionClient {
    http: Client,
    settings: LlmSettings,
}

impl SuggestionClient {
    pub fn new(http: Client, settings: LlmSettings) -> Self {
        SuggestionClient { http, settings }
    }

    pub fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }

    /// Sends `prompt` as a single user message and returns the first answer.
    pub async fn complete(&self, prompt: &str) -> Result<String, SuggestError> {
        let key = self
            .settings
            .api_key
            .as_deref()
            .ok_or(SuggestError::NotConfigured)?;

        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let res = self
            .http
            .post(url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(SuggestError::Status(res.status()));
        }

        let answer = res.json::<ChatResponse>().await?;
        answer
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(SuggestError::Empty)
    }
}

/// Clamps a requested suggestion count, falling back to [`DEFAULT_SUGGESTIONS`].
pub fn suggestion_count(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_SUGGESTIONS)
        .clamp(1, MAX_SUGGESTIONS)
}

pub fn build_prompt(song: &str, count: u32) -> String {
    format!(
        "Suggest {count} songs similar to \"{}\". \
         Answer with a numbered list, one song per line, formatted as \
         `1. Artist - Title`.",
        song.trim()
    )
}

/// Pulls the numbered suggestions out of a completion.
///
/// ```text
/// 1. **The Beatles - Let It Be**: same era
/// ```
/// becomes `The Beatles - Let It Be`.
pub fn extract_suggestions(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| is_numbered(line))
        .filter_map(|line| {
            let (_, rest) = line.split_once('.')?;
            let cleaned = rest.replace("**", "");
            let entry = match cleaned.split_once(':') {
                Some((head, _)) => head,
                None => cleaned.as_str(),
            };
            let entry = entry.trim();
            (!entry.is_empty()).then(|| entry.to_string())
        })
        .collect()
}

fn is_numbered(line: &str) -> bool {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && line[digits..].starts_with('.')
}
