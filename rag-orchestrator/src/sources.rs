//! Citation extraction and per-domain prompt settings.

use std::str::FromStr;

use crate::model::{EvidenceNode, Source};

/// Placeholder replaced by the source id in URL templates.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Domain-specific wording and citation rules for one deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainProfile {
    pub name: String,
    /// Opening instruction of the generation prompt.
    pub role_instruction: String,
    /// How evidence passages are referred to in the prompt.
    pub evidence_label: String,
    /// Canonical source URL; `{id}` is replaced by the source id.
    pub source_url_template: String,
}

impl DomainProfile {
    pub fn confluence() -> Self {
        Self {
            name: "confluence".into(),
            role_instruction: "You are a knowledgeable assistant answering questions about the \
                company's Confluence knowledge base. Answer using only the provided page excerpts. \
                If the excerpts do not contain the answer, say so."
                .into(),
            evidence_label: "Confluence page excerpts".into(),
            source_url_template: "https://confluence.example.com/pages/viewpage.action?pageId={id}".into(),
        }
    }

    pub fn pdf() -> Self {
        Self {
            name: "pdf".into(),
            role_instruction: "You are a document analysis assistant. Answer questions using only \
                the provided PDF excerpts. If the excerpts do not contain the answer, say so."
                .into(),
            evidence_label: "Document excerpts".into(),
            source_url_template: "/documents/{id}".into(),
        }
    }

    pub fn generic() -> Self {
        Self {
            name: "generic".into(),
            role_instruction: "You are a helpful assistant. Answer the question using only the \
                provided excerpts. If they are insufficient, say what is missing."
                .into(),
            evidence_label: "Excerpts".into(),
            source_url_template: "{id}".into(),
        }
    }

    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.source_url_template = template.into();
        self
    }

    pub fn source_url(&self, id: &str) -> String {
        self.source_url_template.replace(ID_PLACEHOLDER, id)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.role_instruction.trim().is_empty() {
            return Err(format!("domain '{}' has an empty role instruction", self.name));
        }
        if !self.source_url_template.contains(ID_PLACEHOLDER) {
            return Err(format!(
                "source url template '{}' has no {ID_PLACEHOLDER} placeholder",
                self.source_url_template
            ));
        }
        Ok(())
    }
}

impl Default for DomainProfile {
    fn default() -> Self {
        Self::generic()
    }
}

impl FromStr for DomainProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "confluence" => Ok(Self::confluence()),
            "pdf" => Ok(Self::pdf()),
            "generic" => Ok(Self::generic()),
            other => Err(format!("unknown domain: {other}")),
        }
    }
}

/// Title and id derived from a filename.
///
/// - `Name_12345.md` → title `Name` (underscores become spaces), id `12345`
/// - `42.md` → title and id `42`
/// - anything else → extension stripped, title with dashes as spaces, id = stem
pub fn title_and_id(filename: &str) -> (String, String) {
    let stem = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => stem,
        _ => filename,
    };

    if let Some((name, id)) = stem.rsplit_once('_') {
        if !name.is_empty() && is_numeric(id) {
            return (name.replace('_', " "), id.to_string());
        }
    }
    if is_numeric(stem) {
        return (stem.to_string(), stem.to_string());
    }
    (stem.replace('-', " "), stem.to_string())
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Citations for `nodes`, in node order.
///
/// A [`Source`] names a document, not a chunk: its id is derived from the
/// node's filename (see [`title_and_id`]) rather than copied from the node
/// id, so the id also keys [`DomainProfile::source_url`]. Several chunks of
/// one file therefore yield a single source, the first one seen.
pub fn extract_sources(nodes: &[EvidenceNode], domain: &DomainProfile) -> Vec<Source> {
    let mut out: Vec<Source> = Vec::new();
    for node in nodes {
        let (title, id) = title_and_id(node.filename());
        if out.iter().any(|s| s.id == id) {
            continue;
        }
        out.push(Source {
            url: domain.source_url(&id),
            title,
            id,
        });
    }
    out
}
