//! Conversation history storage.
//!
//! [`ConversationStore`] is the injected interface; [`MemoryConversationStore`]
//! is a bounded in-process implementation on a `moka` cache (LRU eviction
//! plus an idle TTL). [`TurnLocks`] serializes whole turns per conversation
//! id so a read-analyze-append cycle cannot interleave with another one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::future::BoxFuture;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::CollaboratorError;
use crate::model::{ConversationHistory, ConversationTurn, NewTurn};

/// Append-only per-conversation turn storage.
pub trait ConversationStore: Send + Sync {
    /// Full ordered history, or `None` if unknown (or expired).
    fn get<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ConversationHistory>, CollaboratorError>>;

    /// Appends a turn, creating the conversation on first use.
    fn append<'a>(
        &'a self,
        conversation_id: &'a str,
        turn: NewTurn,
    ) -> BoxFuture<'a, Result<ConversationTurn, CollaboratorError>>;

    /// Drops one conversation; returns whether it existed.
    fn clear<'a>(&'a self, conversation_id: &'a str) -> BoxFuture<'a, Result<bool, CollaboratorError>>;

    fn conversation_ids(&self) -> BoxFuture<'_, Result<Vec<String>, CollaboratorError>>;
}

/// moka rejects idle times above 1000 years.
const MAX_IDLE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Bounds for [`MemoryConversationStore`].
#[derive(Clone, Copy, Debug)]
pub struct StoreLimits {
    /// Least recently used conversations are evicted beyond this count.
    pub max_conversations: usize,
    /// Conversations idle for longer than this are dropped.
    pub ttl: Duration,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_conversations: 1024,
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// In-memory store with eviction.
pub struct MemoryConversationStore {
    cache: Cache<String, ConversationHistory>,
    /// Makes read-modify-write of one conversation atomic.
    appends: TurnLocks,
}

impl MemoryConversationStore {
    pub fn new(limits: StoreLimits) -> Self {
        let cache = Cache::builder()
            .max_capacity(limits.max_conversations.max(1) as u64)
            .time_to_idle(limits.ttl.min(MAX_IDLE))
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(|id: Arc<String>, _, cause| {
                debug!(conversation_id = %id, ?cause, "conversation dropped from store");
            })
            .build();
        Self {
            cache,
            appends: TurnLocks::default(),
        }
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new(StoreLimits::default())
    }
}

impl ConversationStore for MemoryConversationStore {
    fn get<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ConversationHistory>, CollaboratorError>> {
        Box::pin(async move { Ok(self.cache.get(conversation_id).await) })
    }

    fn append<'a>(
        &'a self,
        conversation_id: &'a str,
        turn: NewTurn,
    ) -> BoxFuture<'a, Result<ConversationTurn, CollaboratorError>> {
        Box::pin(async move {
            let _guard = self.appends.acquire(conversation_id).await;
            let now = Utc::now();
            let mut history = self
                .cache
                .get(conversation_id)
                .await
                .unwrap_or_else(|| ConversationHistory::new(conversation_id, now));

            // Turn ids carry the millisecond timestamp, so it must strictly
            // increase at millisecond precision within a conversation.
            let timestamp = match history.turns().last() {
                Some(last) if now.timestamp_millis() <= last.timestamp.timestamp_millis() => {
                    last.timestamp + TimeDelta::milliseconds(1)
                }
                _ => now,
            };
            let created = ConversationTurn {
                id: format!("{conversation_id}-{}", timestamp.timestamp_millis()),
                timestamp,
                query: turn.query,
                response: turn.response,
                nodes: turn.nodes,
                sources: turn.sources,
            };
            history.push(created.clone());
            let turns = history.turns().len();
            self.cache.insert(conversation_id.to_string(), history).await;
            debug!(conversation_id, turn_id = %created.id, turns, "turn appended");
            Ok(created)
        })
    }

    fn clear<'a>(&'a self, conversation_id: &'a str) -> BoxFuture<'a, Result<bool, CollaboratorError>> {
        Box::pin(async move { Ok(self.cache.remove(conversation_id).await.is_some()) })
    }

    fn conversation_ids(&self) -> BoxFuture<'_, Result<Vec<String>, CollaboratorError>> {
        Box::pin(async move {
            self.cache.run_pending_tasks().await;
            let mut ids: Vec<String> = self.cache.iter().map(|(k, _)| k.as_ref().clone()).collect();
            ids.sort();
            Ok(ids)
        })
    }
}

/// Per-conversation mutual exclusion for whole turns.
#[derive(Default)]
pub struct TurnLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one turn; released on drop.
pub struct TurnGuard {
    _guard: OwnedMutexGuard<()>,
}

impl TurnLocks {
    /// Waits until no other turn of `conversation_id` is in flight.
    pub async fn acquire(&self, conversation_id: &str) -> TurnGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // Forget locks nobody holds or waits on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        TurnGuard {
            _guard: lock.lock_owned().await,
        }
    }
}
