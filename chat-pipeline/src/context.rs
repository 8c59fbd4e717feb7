use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            insight::SourceInsight,
            message::{ChatMessage, ChatRole},
            note::Note,
            source::Source,
        },
    },
};
use serde::{Deserialize, Serialize};

use crate::model::PromptMessage;

/// Characters of full text shown for a `summary` selection with no insight to
/// fall back on.
const SUMMARY_HEAD_CHARS: usize = 500;

/// How much of each selected source to put in front of the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    Full,
    Summary,
    Excluded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSelection {
    pub source_id: String,
    pub mode: ContextMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteSelection {
    pub note_id: String,
    pub mode: ContextMode,
}

/// Per-request selection of which sources and notes feed the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectedContext {
    #[serde(default)]
    pub sources: Vec<ContextSelection>,
    #[serde(default)]
    pub notes: Vec<NoteSelection>,
}

/// Builds the context block from the caller's selections. Every referenced
/// source and note is ownership-checked against the session owner.
pub async fn build_context_block(
    db: &SurrealDbClient,
    user_id: &str,
    selected: &SelectedContext,
) -> Result<Option<String>, AppError> {
    let mut sections: Vec<String> = Vec::new();

    for selection in &selected.sources {
        if selection.mode == ContextMode::Excluded {
            continue;
        }

        let source = Source::get_owned(&selection.source_id, user_id, db).await?;
        let Some(full_text) = source.full_text.as_deref() else {
            continue;
        };

        let body = match selection.mode {
            ContextMode::Full => full_text.to_string(),
            ContextMode::Summary => summarize(db, &source, full_text).await?,
            ContextMode::Excluded => continue,
        };

        sections.push(format!("## {}\n{}", source.title, body));
    }

    for selection in &selected.notes {
        if selection.mode == ContextMode::Excluded {
            continue;
        }

        let note = Note::get_owned(&selection.note_id, user_id, db).await?;
        let body = match selection.mode {
            ContextMode::Full => note.content.clone(),
            ContextMode::Summary => note.content.chars().take(SUMMARY_HEAD_CHARS).collect(),
            ContextMode::Excluded => continue,
        };

        let title = note.title.as_deref().unwrap_or("Note");
        sections.push(format!("## {title}\n{body}"));
    }

    if sections.is_empty() {
        Ok(None)
    } else {
        Ok(Some(sections.join("\n\n")))
    }
}

/// Prefers a stored insight as the summary; falls back to the head of the
/// full text.
async fn summarize(
    db: &SurrealDbClient,
    source: &Source,
    full_text: &str,
) -> Result<String, AppError> {
    let insights = SourceInsight::list_by_source(&source.id, db).await?;
    if let Some(insight) = insights.into_iter().next() {
        return Ok(insight.content);
    }

    Ok(full_text.chars().take(SUMMARY_HEAD_CHARS).collect())
}

/// Assembles the prompt: optional context system message, then as much
/// history as the character budget allows (older messages dropped first),
/// then the new user message.
pub fn assemble_prompt(
    context_block: Option<&str>,
    history: &[ChatMessage],
    user_message: &str,
    budget_chars: usize,
) -> Vec<PromptMessage> {
    let mut messages = Vec::new();

    if let Some(block) = context_block {
        messages.push(PromptMessage {
            role: ChatRole::System,
            content: format!(
                "Use the following notebook context when answering.\n\n{block}"
            ),
        });
    }

    let fixed_cost: usize = messages
        .iter()
        .map(|m| m.content.chars().count())
        .sum::<usize>()
        + user_message.chars().count();
    let mut remaining = budget_chars.saturating_sub(fixed_cost);

    // Walk newest-first so the oldest turns fall off the budget.
    let mut kept: Vec<&ChatMessage> = Vec::new();
    for message in history.iter().rev() {
        let cost = message.content.chars().count();
        if cost > remaining {
            break;
        }
        remaining -= cost;
        kept.push(message);
    }

    for message in kept.into_iter().rev() {
        messages.push(PromptMessage {
            role: message.role.clone(),
            content: message.content.clone(),
        });
    }

    messages.push(PromptMessage {
        role: ChatRole::User,
        content: user_message.to_string(),
    });

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_message(role: ChatRole, content: &str) -> ChatMessage {
        ChatMessage::new("session".to_string(), role, content.to_string())
    }

    #[test]
    fn prompt_keeps_order_and_appends_user_message() {
        let history = vec![
            history_message(ChatRole::User, "first question"),
            history_message(ChatRole::Assistant, "first answer"),
        ];

        let prompt = assemble_prompt(Some("context"), &history, "next question", 10_000);

        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, ChatRole::System);
        assert_eq!(prompt[1].content, "first question");
        assert_eq!(prompt[2].content, "first answer");
        assert_eq!(prompt[3].role, ChatRole::User);
        assert_eq!(prompt[3].content, "next question");
    }

    #[test]
    fn budget_drops_oldest_history_first() {
        let history = vec![
            history_message(ChatRole::User, &"a".repeat(400)),
            history_message(ChatRole::Assistant, &"b".repeat(400)),
            history_message(ChatRole::User, &"c".repeat(400)),
        ];

        // Budget fits the new message plus roughly two history turns.
        let prompt = assemble_prompt(None, &history, "q", 900);

        assert_eq!(prompt.len(), 3);
        assert!(prompt[0].content.starts_with('b'));
        assert!(prompt[1].content.starts_with('c'));
        assert_eq!(prompt[2].content, "q");
    }

    #[test]
    fn zero_history_still_yields_user_message() {
        let prompt = assemble_prompt(None, &[], "hi", 10);
        assert_eq!(prompt.len(), 1);
        assert_eq!(prompt[0].content, "hi");
    }
}
