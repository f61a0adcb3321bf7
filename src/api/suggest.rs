use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{AppState, required};
use crate::{
    error::JsonError,
    session::SessionStore,
    suggest::{build_prompt, extract_suggestions, suggestion_count},
};

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    #[serde(default)]
    pub song: String,
    /// Number or numeric string, as sent by a plain `<input type="number">`.
    #[serde(default, rename = "numSuggestions")]
    pub num_suggestions: Option<Value>,
}

impl SuggestRequest {
    fn count(&self) -> Option<u32> {
        match self.num_suggestions.as_ref()? {
            Value::Number(n) => n.as_u64().map(|n| n.min(u32::MAX as u64) as u32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Similar songs for `song`.
///
/// Answers in the chat completion shape the browser already understands,
/// plus the parsed `suggestions` list.
pub async fn generate_suggestions<S: SessionStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<SuggestRequest>,
) -> Result<Json<Value>, JsonError> {
    let song = required(Some(request.song.as_str()), "song")?;
    let prompt = build_prompt(&song, suggestion_count(request.count()));
    let content = state.suggest.complete(&prompt).await?;
    let suggestions = extract_suggestions(&content);

    Ok(Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "suggestions": suggestions,
    })))
}
