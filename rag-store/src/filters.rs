//! Metadata filters and their conversion to Qdrant `Filter`.
//!
//! A filter set is a flat list of `{key, value, operator}` clauses joined by
//! one conjunction. Equality clauses go to `must` (AND) or `should` (OR);
//! inequality clauses always go to `must_not`.

use qdrant_client::qdrant::{
    Condition, FieldCondition, Filter, Match, condition::ConditionOneOf, r#match::MatchValue,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RagError;

/// Payload key that stores the source document name.
pub const FILENAME_KEY: &str = "filename";

/// Comparison applied to a single metadata key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    #[default]
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Ne,
}

/// How clauses of a [`MetadataFilters`] combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCondition {
    #[default]
    And,
    Or,
}

/// One `{key, value, operator}` clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub operator: FilterOperator,
}

impl MetadataFilter {
    /// Exact-match clause.
    pub fn eq(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            operator: FilterOperator::Eq,
        }
    }
}

/// A set of clauses joined by a single conjunction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilters {
    pub filters: Vec<MetadataFilter>,
    #[serde(default)]
    pub condition: FilterCondition,
}

impl MetadataFilters {
    /// Document-name allow-list.
    ///
    /// No names means no filter; one name is a single exact match; several
    /// names are exact matches joined by OR.
    pub fn from_filenames<S: AsRef<str>>(filenames: &[S]) -> Option<Self> {
        match filenames {
            [] => None,
            [one] => Some(Self {
                filters: vec![MetadataFilter::eq(FILENAME_KEY, one.as_ref())],
                condition: FilterCondition::And,
            }),
            many => Some(Self {
                filters: many
                    .iter()
                    .map(|f| MetadataFilter::eq(FILENAME_KEY, f.as_ref()))
                    .collect(),
                condition: FilterCondition::Or,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Converts [`MetadataFilters`] to a Qdrant [`Filter`].
///
/// Values are matched as keyword (`String`), integer (`Number` with an
/// `i64` representation) or boolean. Any other value type is a
/// [`RagError::Config`]: dropping the clause would widen the search.
pub fn to_qdrant_filter(f: &MetadataFilters) -> Result<Filter, RagError> {
    debug!(
        clauses = f.filters.len(),
        condition = ?f.condition,
        "filters::to_qdrant_filter"
    );

    let mut out = Filter::default();

    for clause in &f.filters {
        let cond = field_condition(&clause.key, &clause.value).ok_or_else(|| {
            RagError::Config(format!(
                "unsupported value for filter key '{}': {}",
                clause.key, clause.value
            ))
        })?;
        match (clause.operator, f.condition) {
            (FilterOperator::Ne, _) => out.must_not.push(cond),
            (FilterOperator::Eq, FilterCondition::And) => out.must.push(cond),
            (FilterOperator::Eq, FilterCondition::Or) => out.should.push(cond),
        }
    }

    Ok(out)
}

fn field_condition(key: &str, value: &serde_json::Value) -> Option<Condition> {
    let match_value = match value {
        serde_json::Value::String(s) => MatchValue::Keyword(s.clone()),
        serde_json::Value::Number(n) => MatchValue::Integer(n.as_i64()?),
        serde_json::Value::Bool(b) => MatchValue::Boolean(*b),
        _ => return None,
    };

    Some(Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(match_value),
            }),
            ..Default::default()
        })),
    })
}
