use serde::Serialize;

use crate::modules::migration::canonical::{UiChatSession, UiMessage, UiPart, UiRole};
use crate::modules::migration::model::{LegacyChatSession, LegacyContent, LegacyMessage, LegacyPart};

/// A stage between the fetcher and the envelope builder.
pub trait ChatTransform: Send + Sync {
    type Output: Serialize + Send;

    fn apply(&self, chats: Vec<LegacyChatSession>) -> Vec<Self::Output>;
}

/// Exports legacy records exactly as fetched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl ChatTransform for Passthrough {
    type Output = LegacyChatSession;

    fn apply(&self, chats: Vec<LegacyChatSession>) -> Vec<LegacyChatSession> {
        chats
    }
}

/// Rewrites legacy records into the closed canonical schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalNormalizer;

impl ChatTransform for CanonicalNormalizer {
    type Output = UiChatSession;

    fn apply(&self, chats: Vec<LegacyChatSession>) -> Vec<UiChatSession> {
        chats.iter().map(normalize_session).collect()
    }
}

pub fn normalize_session(chat: &LegacyChatSession) -> UiChatSession {
    UiChatSession {
        id: chat.id.clone(),
        title: chat.title.clone(),
        created_at: chat.created_at.clone(),
        updated_at: chat.updated_at.clone(),
        messages: chat
            .messages
            .iter()
            .enumerate()
            .map(|(index, message)| normalize_message(&chat.id, index, message))
            .collect(),
        metadata: None,
    }
}

pub fn normalize_message(chat_id: &str, index: usize, message: &LegacyMessage) -> UiMessage {
    UiMessage {
        id: message
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{chat_id}-{index}")),
        role: message.role().and_then(UiRole::parse).unwrap_or(UiRole::User),
        content: message_parts(message),
        created_at: message.created_at().map(str::to_string),
        metadata: message.metadata().cloned(),
    }
}

// First non-empty source wins: parts, content parts, content text, message.
fn message_parts(message: &LegacyMessage) -> Vec<UiPart> {
    if let Some(parts) = message.parts() {
        let parts = convert_parts(parts);
        if !parts.is_empty() {
            return parts;
        }
    }

    match message.content() {
        LegacyContent::Parts(parts) => {
            let parts = convert_parts(parts);
            if !parts.is_empty() {
                return parts;
            }
        }
        LegacyContent::Text(text) if !text.is_empty() => return vec![UiPart::Text { text }],
        _ => {}
    }

    message
        .message()
        .filter(|text| !text.is_empty())
        .map(|text| vec![UiPart::Text { text: text.to_string() }])
        .unwrap_or_default()
}

fn convert_parts(parts: Vec<LegacyPart>) -> Vec<UiPart> {
    parts
        .into_iter()
        .filter_map(|part| match part {
            LegacyPart::Text { text: Some(text) } if !text.is_empty() => {
                Some(UiPart::Text { text })
            }
            LegacyPart::ImageUrl { url: Some(url) } if !url.is_empty() => {
                Some(UiPart::ImageUrl { url })
            }
            _ => None,
        })
        .collect()
}
