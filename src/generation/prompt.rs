//! Request construction for speaker-picking completions

use super::GenerationContext;
use crate::llm::{LlmMessage, LlmRequest, SystemContent};

/// Build the backend request for one turn.
///
/// History goes in as user-role lines of the form `Sender: content`; the
/// system prompt names every participant and the candidates allowed to
/// speak next.
pub fn build_request(
    context: &GenerationContext,
    candidates: &[String],
    temperature: f32,
    max_tokens: u32,
) -> LlmRequest {
    let messages = context
        .history
        .iter()
        .map(|line| LlmMessage::user(format!("{}: {}", line.sender, line.content)))
        .collect();

    LlmRequest {
        system: vec![SystemContent::new(system_prompt(
            &context.participants,
            candidates,
        ))],
        messages,
        max_tokens: Some(max_tokens),
        temperature: Some(temperature),
        json_output: true,
    }
}

fn system_prompt(participants: &[String], candidates: &[String]) -> String {
    format!(
        r#"You are taking part in a group chat between these people: {participants}.
Write the NEXT SINGLE message of the conversation, spoken by exactly one of: {candidates}.

Reply with one JSON object and nothing else:
{{"sender": "<one of: {candidates}>", "content": "<their message>"}}

Rules:
- Exactly one message, from one of the listed speakers
- Follow on naturally from the history
- Keep it short and conversational
- No quotes or markup inside the content"#,
        participants = participants.join(", "),
        candidates = candidates.join(", "),
    )
}
