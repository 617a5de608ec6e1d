//! Evidence drawn from prior turns: extraction, boosting and merging with
//! fresh retrieval results.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::debug;

use crate::model::{ConversationHistory, EvidenceNode};

/// Which duplicate survives when the same id shows up twice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DedupPolicy {
    /// The first occurrence is kept regardless of score. Context nodes are
    /// inserted first, so they shadow fresh hits with the same id.
    #[default]
    FirstSeen,
    /// The occurrence with the higher (boosted) score is kept, in the
    /// position of the first occurrence.
    MaxScore,
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "first-seen" => Ok(DedupPolicy::FirstSeen),
            "max-score" => Ok(DedupPolicy::MaxScore),
            other => Err(format!("unknown dedup policy: {other}")),
        }
    }
}

/// Result of merging context and fresh nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct Combined {
    pub nodes: Vec<EvidenceNode>,
    /// Length of the leading slots of `nodes` opened by context nodes.
    pub context_count: usize,
    /// Per entry of `nodes`: whether the surviving copy came from context.
    /// Under [`DedupPolicy::MaxScore`] a fresh duplicate can take over a
    /// context slot, so this can be `false` inside the prefix.
    pub from_context: Vec<bool>,
}

#[derive(Clone, Debug)]
pub struct ContextManager {
    /// Multiplier applied to context nodes when merging.
    pub context_boost: f32,
    /// Whether newer turns weigh more during extraction.
    pub recency_boost: bool,
    pub dedup: DedupPolicy,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self {
            context_boost: 1.2,
            recency_boost: true,
            dedup: DedupPolicy::FirstSeen,
        }
    }
}

impl ContextManager {
    /// Flattens the nodes of every turn, optionally boosts by recency,
    /// sorts by score (descending) and keeps the best `max_nodes`.
    ///
    /// The newest turn has `turn_index` 0 and receives
    /// `1 + 0.1 × (turn_count − turn_index)`. A node repeated across turns
    /// keeps its best score, so returned ids are unique.
    pub fn extract_from_history(
        &self,
        history: &ConversationHistory,
        max_nodes: usize,
    ) -> Vec<EvidenceNode> {
        let turns = history.turns();
        let turn_count = turns.len();

        let mut nodes: Vec<EvidenceNode> = turns
            .iter()
            .enumerate()
            .flat_map(|(pos, turn)| {
                let turn_index = turn_count - 1 - pos;
                let boost = if self.recency_boost {
                    1.0 + 0.1 * (turn_count - turn_index) as f32
                } else {
                    1.0
                };
                turn.nodes.iter().map(move |n| {
                    let score = n.score * boost;
                    n.clone().rescored(score)
                })
            })
            .collect();

        nodes.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut seen = std::collections::HashSet::new();
        nodes.retain(|n| seen.insert(n.id.clone()));
        nodes.truncate(max_nodes);

        debug!(
            turns = turn_count,
            extracted = nodes.len(),
            max_nodes,
            "context nodes extracted"
        );
        nodes
    }

    /// Merges context nodes (boosted, inserted first) with fresh nodes.
    ///
    /// Ids in the result are unique; which duplicate survives is decided by
    /// [`DedupPolicy`].
    pub fn combine_and_dedupe(
        &self,
        context_nodes: Vec<EvidenceNode>,
        fresh_nodes: Vec<EvidenceNode>,
    ) -> Combined {
        let mut out: Vec<EvidenceNode> = Vec::with_capacity(context_nodes.len() + fresh_nodes.len());
        let mut from_context: Vec<bool> = Vec::with_capacity(out.capacity());
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut dropped = 0usize;

        let boosted = context_nodes.into_iter().map(|n| {
            let score = n.score * self.context_boost;
            n.rescored(score)
        });

        let mut insert = |node: EvidenceNode, is_context: bool, out: &mut Vec<EvidenceNode>, origin: &mut Vec<bool>| {
            match index.get(&node.id) {
                None => {
                    index.insert(node.id.clone(), out.len());
                    out.push(node);
                    origin.push(is_context);
                }
                Some(&at) => {
                    dropped += 1;
                    if self.dedup == DedupPolicy::MaxScore && node.score > out[at].score {
                        out[at] = node;
                        origin[at] = is_context;
                    }
                }
            }
        };

        for n in boosted {
            insert(n, true, &mut out, &mut from_context);
        }
        let context_count = out.len();
        for n in fresh_nodes {
            insert(n, false, &mut out, &mut from_context);
        }

        debug!(
            context = context_count,
            combined = out.len(),
            duplicates = dropped,
            policy = ?self.dedup,
            "context and fresh nodes combined"
        );

        Combined {
            nodes: out,
            context_count,
            from_context,
        }
    }
}
