//! Core data model shared by every pipeline stage.

use chrono::{DateTime, Utc};
use rag_store::{FILENAME_KEY, MetadataFilters};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder used wherever a passage has no readable content.
pub const CONTENT_UNAVAILABLE: &str = "Content not available";

/// Filename reported when a node carries no filename metadata.
pub const UNKNOWN_FILENAME: &str = "Unknown";

/// A user query plus optional per-request filters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Document-name allow-list; empty means "search everything".
    #[serde(default)]
    pub filenames: Vec<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filenames: Vec::new(),
        }
    }

    pub fn with_filenames<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filenames = names.into_iter().map(Into::into).collect();
        self
    }

    /// Retrieval filters derived from the filename allow-list.
    pub fn filters(&self) -> Option<MetadataFilters> {
        MetadataFilters::from_filenames(self.filenames.as_slice())
    }
}

/// A scored passage with its source metadata.
///
/// The score scale is backend-defined; rerankers replace it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceNode {
    pub id: String,
    pub content: Option<String>,
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EvidenceNode {
    pub fn new(id: impl Into<String>, content: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            content: Some(content.into()),
            score,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_filename(self, filename: impl Into<String>) -> Self {
        self.with_metadata(FILENAME_KEY, filename.into())
    }

    /// Passage text, or [`CONTENT_UNAVAILABLE`] when missing or blank.
    pub fn content(&self) -> &str {
        match self.content.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => CONTENT_UNAVAILABLE,
        }
    }

    pub fn filename(&self) -> &str {
        self.metadata
            .get(FILENAME_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(UNKNOWN_FILENAME)
    }

    pub(crate) fn rescored(mut self, score: f32) -> Self {
        self.score = score;
        self
    }
}

/// Citation record derived from a node's filename.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// One answered exchange. Never mutated after the store creates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
    pub nodes: Vec<EvidenceNode>,
    pub sources: Vec<Source>,
}

/// Turn payload handed to a store; id and timestamp are assigned on append.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewTurn {
    pub query: String,
    pub response: String,
    pub nodes: Vec<EvidenceNode>,
    pub sources: Vec<Source>,
}

/// Ordered, append-only history of one conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    conversation_id: String,
    turns: Vec<ConversationTurn>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationHistory {
    pub fn new(conversation_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Turns in chronological order.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Every evidence node of every turn, in turn order.
    pub fn all_evidence(&self) -> Vec<EvidenceNode> {
        self.turns.iter().flat_map(|t| t.nodes.iter().cloned()).collect()
    }

    /// Sources of all turns, unique by id (later turns win), first-seen order.
    pub fn all_sources(&self) -> Vec<Source> {
        let mut out: Vec<Source> = Vec::new();
        for s in self.turns.iter().flat_map(|t| t.sources.iter()) {
            match out.iter_mut().find(|o| o.id == s.id) {
                Some(existing) => *existing = s.clone(),
                None => out.push(s.clone()),
            }
        }
        out
    }

    pub(crate) fn push(&mut self, turn: ConversationTurn) {
        self.updated_at = turn.timestamp;
        self.turns.push(turn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_content_uses_sentinel() {
        let mut n = EvidenceNode::new("1", "  ", 0.5);
        assert_eq!(n.content(), CONTENT_UNAVAILABLE);
        n.content = None;
        assert_eq!(n.content(), CONTENT_UNAVAILABLE);
        assert_eq!(n.filename(), UNKNOWN_FILENAME);
    }

    #[test]
    fn query_filenames_become_filters() {
        assert!(Query::new("q").filters().is_none());
        let f = Query::new("q").with_filenames(["a.md", "b.md"]).filters().unwrap();
        assert_eq!(f.filters.len(), 2);
    }

    #[test]
    fn all_sources_are_unique_by_id() {
        let now = Utc::now();
        let mut h = ConversationHistory::new("c", now);
        let src = |id: &str, title: &str| Source {
            id: id.into(),
            title: title.into(),
            url: format!("u/{id}"),
        };
        for sources in [vec![src("1", "old"), src("2", "b")], vec![src("1", "new")]] {
            h.push(ConversationTurn {
                id: "t".into(),
                timestamp: now,
                query: "q".into(),
                response: "r".into(),
                nodes: vec![EvidenceNode::new("n", "x", 0.1)],
                sources,
            });
        }
        let all = h.all_sources();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "new");
        assert_eq!(h.all_evidence().len(), 2);
        assert_eq!(h.recent(1).len(), 1);
    }
}
