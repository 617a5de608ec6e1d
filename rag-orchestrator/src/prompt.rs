//! Generation prompt builder: role, analysis context, evidence within a byte
//! budget, recent history, the query and format guidance.

use crate::model::{ConversationTurn, EvidenceNode};
use crate::schema::{Decision, FormatType, ResponsePlan, SourcingStrategy};
use crate::sources::DomainProfile;

/// Everything the prompt is assembled from.
pub struct PromptInput<'a> {
    pub query: &'a str,
    pub nodes: &'a [EvidenceNode],
    pub plan: &'a ResponsePlan,
    pub decision: Option<&'a Decision>,
    pub history: &'a [ConversationTurn],
    pub domain: &'a DomainProfile,
    /// Upper bound for the evidence section, in bytes.
    pub max_evidence_bytes: usize,
}

/// Builds the final prompt. Sections with nothing to say are omitted.
///
/// # Example
/// ```
/// # use rag_orchestrator::prompt::{build_prompt, PromptInput};
/// # use rag_orchestrator::{DomainProfile, ResponsePlan};
/// let plan = ResponsePlan::fallback();
/// let domain = DomainProfile::generic();
/// let prompt = build_prompt(&PromptInput {
///     query: "How do I reset my password?",
///     nodes: &[],
///     plan: &plan,
///     decision: None,
///     history: &[],
///     domain: &domain,
///     max_evidence_bytes: 2000,
/// });
/// assert!(prompt.contains("Question: How do I reset my password?"));
/// ```
pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let mut out = String::new();
    out.push_str(input.domain.role_instruction.trim());
    out.push_str("\n\n");

    let analysis = analysis_block(input.plan, input.decision);
    if !analysis.is_empty() {
        out.push_str("Analysis Context:\n");
        out.push_str(&analysis);
        out.push('\n');
    }

    out.push_str(&input.domain.evidence_label);
    out.push_str(":\n");
    out.push_str(&evidence_block(input.nodes, input.max_evidence_bytes).0);
    out.push_str("\n\n");

    if !input.history.is_empty() {
        out.push_str("Conversation History:\n");
        out.push_str(&history_block(input.history));
        out.push('\n');
    }

    out.push_str("Question: ");
    out.push_str(input.query.trim());
    out.push_str("\n\n");
    out.push_str(format_guidance(input.plan.format_type));
    if input.plan.citation_required {
        out.push_str("\nReference the documents you relied on.");
    }
    out.push('\n');
    out
}

fn analysis_block(plan: &ResponsePlan, decision: Option<&Decision>) -> String {
    let mut lines = Vec::new();
    if let Some(d) = decision {
        lines.push(format!("Evidence Strategy: {} (confidence {:.2})", d.strategy, d.confidence));
    }
    lines.push(format!("Response Format: {}", format_label(plan.format_type)));
    lines.push(format!("Sourcing Strategy: {}", sourcing_label(plan.sourcing_strategy)));
    lines.push(format!(
        "Citations Required: {}",
        if plan.citation_required { "Yes" } else { "No" }
    ));
    let mut push_list = |label: &str, items: &[String]| {
        if !items.is_empty() {
            lines.push(format!("{label}: {}", items.join(", ")));
        }
    };
    push_list("Key Focus Areas", &plan.main_points);
    push_list("Contextual Enhancements", &plan.contextual_enhancements);
    if let Some(d) = decision {
        push_list("Suggested Actions", &d.suggested_actions);
    }
    lines.iter().map(|l| format!("- {l}\n")).collect()
}

fn format_label(f: FormatType) -> &'static str {
    match f {
        FormatType::Text => "text",
        FormatType::List => "list",
        FormatType::Summary => "summary",
        FormatType::Detailed => "detailed",
        FormatType::Comparison => "comparison",
    }
}

fn sourcing_label(s: SourcingStrategy) -> &'static str {
    match s {
        SourcingStrategy::DirectQuote => "direct-quote",
        SourcingStrategy::Synthesis => "synthesis",
        SourcingStrategy::Hybrid => "hybrid",
    }
}

/// The leading nodes whose content reaches the prompt under `max_bytes`,
/// including one that is cut short.
pub fn evidence_within_budget(nodes: &[EvidenceNode], max_bytes: usize) -> &[EvidenceNode] {
    &nodes[..evidence_block(nodes, max_bytes).1]
}

/// Node contents in final order, joined by blank lines, cut at `max_bytes`
/// on a char boundary. Also returns how many nodes contributed text.
fn evidence_block(nodes: &[EvidenceNode], max_bytes: usize) -> (String, usize) {
    let mut out = String::new();
    let mut used = 0;
    for node in nodes {
        let sep = if out.is_empty() { "" } else { "\n\n" };
        let text = node.content().trim();
        let budget = max_bytes.saturating_sub(out.len() + sep.len());
        let cut = safe_truncate(text, budget);
        if cut.is_empty() {
            break;
        }
        out.push_str(sep);
        out.push_str(cut);
        used += 1;
        if cut.len() < text.len() {
            break;
        }
    }
    (out, used)
}

fn history_block(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "<message id={i}>\n<user>{}</user>\n<assistant>{}</assistant>\n</message>\n",
                t.query, t.response
            )
        })
        .collect()
}

pub fn format_guidance(format: FormatType) -> &'static str {
    match format {
        FormatType::List => {
            "If the request asks for a list of items, present them in bullet points or numbered \
             format, including every relevant item found in the excerpts."
        }
        FormatType::Summary => {
            "If the request asks for a summary, provide it concisely using only information from \
             the excerpts, focusing on key points and main themes."
        }
        FormatType::Detailed => {
            "Provide a comprehensive and detailed response that thoroughly addresses all aspects \
             of the query using the excerpts."
        }
        FormatType::Comparison => {
            "When comparing items or concepts, clearly structure your response to highlight \
             similarities, differences, and relative importance based on the document content."
        }
        FormatType::Text => {
            "Structure your response appropriately based on the nature of the request, ensuring \
             clarity and completeness."
        }
    }
}

/// Longest prefix of `s` that fits in `max` bytes and ends on a char boundary.
pub(crate) fn safe_truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StrategyName;
    use chrono::Utc;

    fn input<'a>(
        nodes: &'a [EvidenceNode],
        plan: &'a ResponsePlan,
        history: &'a [ConversationTurn],
        domain: &'a DomainProfile,
        max: usize,
    ) -> PromptInput<'a> {
        PromptInput {
            query: "What is the leave policy?",
            nodes,
            plan,
            decision: None,
            history,
            domain,
            max_evidence_bytes: max,
        }
    }

    #[test]
    fn sections_appear_in_order() {
        let plan = ResponsePlan::fallback();
        let domain = DomainProfile::confluence();
        let nodes = vec![EvidenceNode::new("1", "first passage", 0.9), EvidenceNode::new("2", "second passage", 0.8)];
        let history = vec![ConversationTurn {
            id: "c-1".into(),
            timestamp: Utc::now(),
            query: "hi".into(),
            response: "hello".into(),
            nodes: vec![],
            sources: vec![],
        }];
        let p = build_prompt(&input(&nodes, &plan, &history, &domain, 10_000));

        let role = p.find("Confluence knowledge base").unwrap();
        let analysis = p.find("Analysis Context:").unwrap();
        let evidence = p.find("first passage\n\nsecond passage").unwrap();
        let hist = p.find("<message id=0>\n<user>hi</user>").unwrap();
        let question = p.find("Question: What is the leave policy?").unwrap();
        let guidance = p.find("Structure your response appropriately").unwrap();
        assert!(role < analysis && analysis < evidence && evidence < hist);
        assert!(hist < question && question < guidance);
        assert!(p.contains("- Citations Required: Yes"));
        assert!(p.contains("- Key Focus Areas: direct-answer"));
        assert!(!p.contains("Contextual Enhancements"));
    }

    #[test]
    fn empty_history_is_omitted() {
        let plan = ResponsePlan::fallback();
        let domain = DomainProfile::generic();
        let p = build_prompt(&input(&[], &plan, &[], &domain, 100));
        assert!(!p.contains("Conversation History"));
    }

    #[test]
    fn evidence_respects_the_budget() {
        let plan = ResponsePlan::fallback();
        let domain = DomainProfile::generic();
        let nodes = vec![EvidenceNode::new("1", "aaaaaaaaaa", 0.9), EvidenceNode::new("2", "bbbbbbbbbb", 0.8)];
        let (block, used) = evidence_block(&nodes, 15);
        assert_eq!(block, "aaaaaaaaaa\n\nbbb");
        assert_eq!(used, 2);
        let p = build_prompt(&input(&nodes, &plan, &[], &domain, 10));
        assert!(p.contains("aaaaaaaaaa"));
        assert!(!p.contains("bb"));
    }

    #[test]
    fn missing_content_degrades_to_sentinel() {
        let mut node = EvidenceNode::new("1", "", 0.9);
        node.content = None;
        assert_eq!(evidence_block(&[node], 100).0, crate::model::CONTENT_UNAVAILABLE);
    }

    #[test]
    fn nodes_past_the_budget_are_not_in_the_prompt() {
        let nodes = vec![
            EvidenceNode::new("1", "aaaaaaaaaa", 0.9),
            EvidenceNode::new("2", "bbbbbbbbbb", 0.8),
            EvidenceNode::new("3", "cccccccccc", 0.7),
        ];
        let ids = |max| -> Vec<String> { evidence_within_budget(&nodes, max).iter().map(|n| n.id.clone()).collect() };
        assert_eq!(ids(10), vec!["1"]);
        assert_eq!(ids(13), vec!["1", "2"]);
        assert_eq!(ids(1000), vec!["1", "2", "3"]);
        assert!(ids(0).is_empty());
    }

    #[test]
    fn decision_and_format_shape_the_prompt() {
        let mut plan = ResponsePlan::fallback();
        plan.format_type = FormatType::Comparison;
        plan.citation_required = false;
        let decision = Decision {
            strategy: StrategyName::Hybrid,
            confidence: 0.5,
            reasoning: "r".into(),
            suggested_actions: vec!["check dates".into()],
        };
        let domain = DomainProfile::pdf();
        let mut i = input(&[], &plan, &[], &domain, 100);
        i.decision = Some(&decision);
        let p = build_prompt(&i);
        assert!(p.contains("- Evidence Strategy: hybrid (confidence 0.50)"));
        assert!(p.contains("- Response Format: comparison"));
        assert!(p.contains("- Suggested Actions: check dates"));
        assert!(p.contains("- Citations Required: No"));
        assert!(p.contains("highlight similarities, differences"));
    }

    #[test]
    fn truncation_keeps_char_boundaries() {
        assert_eq!(safe_truncate("héllo", 2), "h");
        assert_eq!(safe_truncate("abc", 10), "abc");
    }
}
