//! Reply parsing: structured JSON first, `Speaker: content` text second

use super::{GeneratedReply, GenerationError};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
struct JsonReply {
    sender: String,
    content: String,
}

static SPEAKER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^([^:\n]+):\s*(.+)$").expect("valid speaker regex"));

/// Parse a raw completion and check the speaker against `candidates`
pub fn parse_reply(raw: &str, candidates: &[String]) -> Result<GeneratedReply, GenerationError> {
    let reply = parse_unchecked(raw).ok_or_else(|| GenerationError::MalformedResponse {
        raw: raw.to_string(),
    })?;

    if !candidates.iter().any(|c| c == &reply.speaker) {
        return Err(GenerationError::InvalidSender {
            sender: reply.speaker,
            candidates: candidates.to_vec(),
        });
    }
    Ok(reply)
}

fn parse_unchecked(raw: &str) -> Option<GeneratedReply> {
    let text = strip_code_fence(raw.trim());

    if let Ok(parsed) = serde_json::from_str::<JsonReply>(text) {
        return reply(&parsed.sender, &parsed.content);
    }

    let captures = SPEAKER_LINE.captures(text)?;
    reply(&captures[1], &captures[2])
}

fn reply(speaker: &str, content: &str) -> Option<GeneratedReply> {
    let speaker = speaker.trim();
    let content = content.trim();
    if speaker.is_empty() || content.is_empty() {
        return None;
    }
    Some(GeneratedReply {
        speaker: speaker.to_string(),
        content: content.to_string(),
    })
}

/// Unwrap a single ```-fenced block, with or without a language tag
fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}
