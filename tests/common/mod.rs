#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::Router;
use axum_test::TestServer;
use serde_json::Value;

use deni_export::config::database::StorageError;
use deni_export::modules::migration::crud::ChatStore;
use deni_export::modules::migration::model::{LegacyChatRow, RawTimestamp};
use deni_export::services::auth::{session_token, OwnerId, SessionResolver};
use deni_export::services::export::ExportService;
use deni_export::{modules, AppState};

/// Chat rows held in memory, keyed by owner, returned in insertion order.
#[derive(Default)]
pub struct MemoryChatStore {
    rows: HashMap<String, Vec<LegacyChatRow>>,
    delay: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
}

impl MemoryChatStore {
    pub fn with_rows(owner: &str, rows: Vec<LegacyChatRow>) -> Self {
        let mut store = Self::default();
        store.rows.insert(owner.to_string(), rows);
        store
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn load_rows(&self, owner: &OwnerId) -> Result<Vec<LegacyChatRow>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.rows.get(owner.as_str()).cloned().unwrap_or_default())
    }
}

/// Accepts a fixed set of session tokens.
pub struct StaticSessions {
    tokens: HashMap<String, String>,
}

impl StaticSessions {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            tokens: pairs
                .iter()
                .map(|(token, owner)| (token.to_string(), owner.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl SessionResolver for StaticSessions {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<OwnerId>, StorageError> {
        Ok(session_token(headers)
            .and_then(|token| self.tokens.get(&token).cloned())
            .and_then(OwnerId::new))
    }
}

pub fn text(ts: &str) -> RawTimestamp {
    RawTimestamp::Text(ts.to_string())
}

pub fn chat_row(
    id: &str,
    title: Option<&str>,
    created_at: RawTimestamp,
    updated_at: RawTimestamp,
    messages: Option<Value>,
) -> LegacyChatRow {
    LegacyChatRow {
        id: id.to_string(),
        title: title.map(str::to_string),
        created_at,
        updated_at,
        messages,
    }
}

pub fn owner(id: &str) -> OwnerId {
    OwnerId::new(id).unwrap()
}

pub fn test_server(store: Arc<MemoryChatStore>, normalize: bool) -> TestServer {
    let state = AppState {
        export: ExportService::new(store, Duration::from_secs(5), normalize),
        sessions: Arc::new(StaticSessions::new(&[("token-u1", "u1"), ("token-u2", "u2")])),
    };

    let app = Router::new()
        .merge(modules::migration::routes::routes())
        .with_state(state);

    TestServer::new(app).unwrap()
}
