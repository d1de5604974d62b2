//! The parsed query tree.

use serde::{Deserialize, Serialize};

/// A parsed query expression.
///
/// Literals hold raw bytes: queries run against file contents, not text,
/// so non-UTF-8 patterns are first-class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    /// Match files containing this byte sequence.
    Literal(Vec<u8>),
    /// Match files matching every subquery.
    And(Vec<Query>),
    /// Match files matching any subquery.
    Or(Vec<Query>),
    /// Match files matching at least `needed` of the subqueries.
    MinOf { needed: usize, queries: Vec<Query> },
}

impl Query {
    /// Convenience constructor for a literal query.
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        Query::Literal(bytes.into())
    }

    /// Number of nodes in the tree. Used for counters and logging.
    pub fn node_count(&self) -> usize {
        match self {
            Query::Literal(_) => 1,
            Query::And(subs) | Query::Or(subs) => {
                1 + subs.iter().map(Query::node_count).sum::<usize>()
            }
            Query::MinOf { queries, .. } => {
                1 + queries.iter().map(Query::node_count).sum::<usize>()
            }
        }
    }
}
