use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::config::database::{PgResource, StorageError};
use crate::modules::migration::model::{LegacyChatRow, LegacyChatSession, LegacyMessage, RawTimestamp};
use crate::services::auth::OwnerId;

pub const UNTITLED_CHAT: &str = "Untitled chat";

const SELECT_BY_OWNER: &str = r#"
    SELECT id::text AS id, title, created_at, updated_at, messages
    FROM chat_sessions
    WHERE user_id = $1
    ORDER BY created_at ASC
"#;

/// Read access to the legacy chat table. Rows come back uncoerced.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn load_rows(&self, owner: &OwnerId) -> Result<Vec<LegacyChatRow>, StorageError>;
}

pub struct PgChatStore {
    db: Arc<PgResource>,
}

impl PgChatStore {
    pub fn new(db: Arc<PgResource>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn load_rows(&self, owner: &OwnerId) -> Result<Vec<LegacyChatRow>, StorageError> {
        let mut conn = self.db.acquire().await?;

        let rows: Vec<PgRow> = sqlx::query(SELECT_BY_OWNER)
            .bind(owner.as_str())
            .fetch(&mut *conn)
            .try_collect()
            .await?;

        Ok(rows.iter().map(decode_row).collect())
    }
}

fn decode_row(row: &PgRow) -> LegacyChatRow {
    LegacyChatRow {
        id: decode_id(row),
        title: row.try_get::<Option<String>, _>("title").ok().flatten(),
        created_at: decode_timestamp(row, "created_at"),
        updated_at: decode_timestamp(row, "updated_at"),
        messages: decode_messages(row),
    }
}

fn decode_id(row: &PgRow) -> String {
    match row.try_get::<Option<String>, _>("id") {
        Ok(Some(id)) => id,
        _ => {
            tracing::debug!("chat row has no usable id, exporting an empty one");
            String::new()
        }
    }
}

fn decode_timestamp(row: &PgRow, column: &str) -> RawTimestamp {
    if let Ok(Some(ts)) = row.try_get::<Option<DateTime<Utc>>, _>(column) {
        return RawTimestamp::Native(ts);
    }
    if let Ok(Some(ts)) = row.try_get::<Option<NaiveDateTime>, _>(column) {
        return RawTimestamp::Native(ts.and_utc());
    }
    if let Ok(Some(text)) = row.try_get::<Option<String>, _>(column) {
        return RawTimestamp::Text(text);
    }
    RawTimestamp::Missing
}

fn decode_messages(row: &PgRow) -> Option<Value> {
    if let Ok(value) = row.try_get::<Option<Value>, _>("messages") {
        return value;
    }
    row.try_get::<Option<String>, _>("messages")
        .ok()
        .flatten()
        .map(Value::String)
}

/// Loads an owner's chats and coerces every row into a `LegacyChatSession`.
pub struct LegacyChatFetcher {
    store: Arc<dyn ChatStore>,
    timeout: Duration,
}

impl LegacyChatFetcher {
    pub fn new(store: Arc<dyn ChatStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn fetch(&self, owner: &OwnerId) -> Result<Vec<LegacyChatSession>, StorageError> {
        let rows = tokio::time::timeout(self.timeout, self.store.load_rows(owner))
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))??;

        Ok(coerce_rows(rows, Utc::now()))
    }
}

/// Coerces rows field by field and orders them by creation time.
///
/// `now` stands in for a creation time the row does not have. Rows whose
/// creation time cannot be read as an instant stay in their storage slot;
/// the others are stably sorted around them.
pub fn coerce_rows(rows: Vec<LegacyChatRow>, now: DateTime<Utc>) -> Vec<LegacyChatSession> {
    let sessions: Vec<LegacyChatSession> =
        rows.into_iter().map(|row| coerce_row(row, now)).collect();
    let keys: Vec<Option<DateTime<Utc>>> = sessions
        .iter()
        .map(|session| parse_instant(&session.created_at))
        .collect();

    let slots: Vec<usize> = (0..sessions.len()).filter(|&i| keys[i].is_some()).collect();
    let mut sorted = slots.clone();
    sorted.sort_by_key(|&i| keys[i]);

    let mut taken: Vec<Option<LegacyChatSession>> = sessions.into_iter().map(Some).collect();
    let mut ordered: Vec<Option<LegacyChatSession>> = (0..taken.len()).map(|_| None).collect();
    for (slot, from) in slots.iter().zip(&sorted) {
        ordered[*slot] = taken[*from].take();
    }
    for (slot, session) in taken.into_iter().enumerate() {
        if session.is_some() {
            ordered[slot] = session;
        }
    }

    ordered.into_iter().flatten().collect()
}

pub fn coerce_row(row: LegacyChatRow, now: DateTime<Utc>) -> LegacyChatSession {
    let title = row.title.unwrap_or_else(|| {
        tracing::debug!(chat_id = %row.id, "chat has no title, using placeholder");
        UNTITLED_CHAT.to_string()
    });

    let created_at = resolve_timestamp(&row.created_at).unwrap_or_else(|| {
        tracing::debug!(chat_id = %row.id, "chat has no creation time, using now");
        format_instant(now)
    });
    let updated_at = resolve_timestamp(&row.updated_at).unwrap_or_else(|| created_at.clone());

    LegacyChatSession {
        messages: coerce_messages(row.messages, &row.id),
        id: row.id,
        title,
        created_at,
        updated_at,
    }
}

fn resolve_timestamp(raw: &RawTimestamp) -> Option<String> {
    match raw {
        RawTimestamp::Native(ts) => Some(format_instant(*ts)),
        RawTimestamp::Text(text) => Some(text.clone()),
        RawTimestamp::Missing => None,
    }
}

fn coerce_messages(raw: Option<Value>, chat_id: &str) -> Vec<LegacyMessage> {
    match raw {
        Some(Value::Array(items)) => items.into_iter().map(LegacyMessage).collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            tracing::debug!(chat_id, "messages column is not an array, exporting none");
            Vec::new()
        }
    }
}

/// RFC 3339 in UTC with milliseconds, e.g. `2024-01-01T00:00:00.000Z`.
pub fn format_instant(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Accepts RFC 3339, Postgres text output (`2024-01-01 00:00:00+00`),
// offset-less date-times and bare dates. Offset-less values are UTC.
fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(text, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(id: &str, created_at: RawTimestamp) -> LegacyChatRow {
        LegacyChatRow {
            id: id.to_string(),
            title: Some("t".to_string()),
            created_at,
            updated_at: RawTimestamp::Missing,
            messages: Some(json!([])),
        }
    }

    fn text(ts: &str) -> RawTimestamp {
        RawTimestamp::Text(ts.to_string())
    }

    #[test]
    fn native_timestamps_render_with_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let session = coerce_row(row("c1", RawTimestamp::Native(ts)), Utc::now());
        assert_eq!(session.created_at, "2024-03-05T10:00:00.000Z");
        assert_eq!(session.updated_at, session.created_at);
    }

    #[test]
    fn missing_creation_time_uses_now() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let session = coerce_row(row("c1", RawTimestamp::Missing), now);
        assert_eq!(session.created_at, "2025-01-01T00:00:00.000Z");
        assert_eq!(session.updated_at, "2025-01-01T00:00:00.000Z");
    }

    #[test]
    fn non_array_messages_become_empty() {
        for raw in [json!(null), json!({}), json!(42), json!("[]")] {
            let mut r = row("c1", text("2024-01-01T00:00:00Z"));
            r.messages = Some(raw);
            assert!(coerce_row(r, Utc::now()).messages.is_empty());
        }
    }

    #[test]
    fn sorts_by_instant_not_by_text() {
        let rows = vec![
            row("late", text("2024-01-01T12:00:00+00:00")),
            row("early", text("2024-01-01T10:00:00+02:00")),
            row("broken", text("yesterday")),
            row("native", RawTimestamp::Native(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap())),
        ];
        let ids: Vec<_> = coerce_rows(rows, Utc::now()).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["native", "early", "broken", "late"]);
    }

    #[test]
    fn sorts_postgres_text_naive_and_date_only_timestamps() {
        let rows = vec![
            row("jun", text("2024-06-01T00:00:00Z")),
            row("mar-pg", text("2024-03-01 00:00:00+00")),
            row("jan-naive", text("2024-01-01T00:00:00")),
            row("feb-date", text("2024-02-01")),
            row("apr-naive-space", text("2024-04-01 12:30:00.250")),
            row("may-pg-offset", text("2024-05-01 02:00:00+02")),
        ];
        let ids: Vec<_> = coerce_rows(rows, Utc::now()).into_iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            ["jan-naive", "feb-date", "mar-pg", "apr-naive-space", "may-pg-offset", "jun"]
        );
    }

    #[test]
    fn already_ordered_text_timestamps_stay_put() {
        let rows = vec![
            row("jan", text("2024-01-01T00:00:00")),
            row("jun", text("2024-06-01T00:00:00Z")),
        ];
        let ids: Vec<_> = coerce_rows(rows, Utc::now()).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["jan", "jun"]);

        let rows = vec![
            row("jan", text("2024-01-01 00:00:00+00")),
            row("jun", text("2024-06-01T00:00:00Z")),
        ];
        let ids: Vec<_> = coerce_rows(rows, Utc::now()).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["jan", "jun"]);
    }

    #[test]
    fn unreadable_timestamps_keep_their_storage_slot() {
        let rows = vec![
            row("b", text("2024-02-01T00:00:00Z")),
            row("odd", text("sometime in spring")),
            row("a", text("2024-01-01T00:00:00Z")),
        ];
        let ids: Vec<_> = coerce_rows(rows, Utc::now()).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["a", "odd", "b"]);
    }

    #[test]
    fn equal_timestamps_keep_storage_order() {
        let rows = vec![
            row("a", text("2024-01-01T00:00:00Z")),
            row("b", text("2024-01-01T00:00:00Z")),
        ];
        let ids: Vec<_> = coerce_rows(rows, Utc::now()).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["a", "b"]);
    }
}
