use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Comparison operators a store adapter can translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Typed literal carried by a comparison node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Text(value) => write!(f, "{value}"),
            QueryValue::Integer(value) => write!(f, "{value}"),
            QueryValue::Boolean(value) => write!(f, "{value}"),
        }
    }
}

/// Store-translatable form of a specification.
///
/// A concrete store adapter walks this tree to build its native filter; the
/// in-memory predicate on [`Specification`] is the reference semantics the
/// translation must agree with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryExpr {
    Compare {
        field: &'static str,
        op: CompareOp,
        value: QueryValue,
    },
    And(Box<QueryExpr>, Box<QueryExpr>),
    Or(Box<QueryExpr>, Box<QueryExpr>),
    Not(Box<QueryExpr>),
}

impl QueryExpr {
    pub fn compare(field: &'static str, op: CompareOp, value: QueryValue) -> Self {
        Self::Compare { field, op, value }
    }

    /// Validate every referenced field against a store adapter's supported
    /// set. Adapters call this when the query is built, so an unsupported
    /// specification is rejected before it ever reaches the store.
    pub fn ensure_supported(&self, supported: &[&str]) -> Result<(), SpecificationError> {
        match self {
            QueryExpr::Compare { field, .. } => {
                if supported.contains(field) {
                    Ok(())
                } else {
                    Err(SpecificationError::UnsupportedField { field })
                }
            }
            QueryExpr::And(left, right) | QueryExpr::Or(left, right) => {
                left.ensure_supported(supported)?;
                right.ensure_supported(supported)
            }
            QueryExpr::Not(inner) => inner.ensure_supported(supported),
        }
    }
}

/// Build-time failures raised while translating a specification for a store.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SpecificationError {
    #[error("field '{field}' is not supported by this store adapter")]
    UnsupportedField { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// Ordering hint a repository may honor when materializing results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: &'static str,
    pub direction: OrderDirection,
}

/// Reusable, composable query over one aggregate type.
///
/// Pairs a pure in-memory predicate with the [`QueryExpr`] a store adapter
/// translates. Combinators keep the two representations in lockstep, and
/// `and`/`or` short-circuit exactly like `&&`/`||` when evaluated in memory.
pub struct Specification<T> {
    expr: QueryExpr,
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
    ordering: Vec<OrderBy>,
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            predicate: Arc::clone(&self.predicate),
            ordering: self.ordering.clone(),
        }
    }
}

impl<T> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("expr", &self.expr)
            .field("ordering", &self.ordering)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Specification<T> {
    pub fn new(
        expr: QueryExpr,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            expr,
            predicate: Arc::new(predicate),
            ordering: Vec::new(),
        }
    }

    /// Pure, side-effect-free evaluation against a candidate aggregate.
    pub fn is_satisfied_by(&self, candidate: &T) -> bool {
        (self.predicate)(candidate)
    }

    pub fn expr(&self) -> &QueryExpr {
        &self.expr
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.ordering
    }

    pub fn order_by(mut self, field: &'static str, direction: OrderDirection) -> Self {
        self.ordering.push(OrderBy { field, direction });
        self
    }

    pub fn and(self, other: Self) -> Self {
        let left = Arc::clone(&self.predicate);
        let right = Arc::clone(&other.predicate);
        Self {
            expr: QueryExpr::And(Box::new(self.expr), Box::new(other.expr)),
            predicate: Arc::new(move |candidate| left(candidate) && right(candidate)),
            ordering: merge_ordering(self.ordering, other.ordering),
        }
    }

    pub fn or(self, other: Self) -> Self {
        let left = Arc::clone(&self.predicate);
        let right = Arc::clone(&other.predicate);
        Self {
            expr: QueryExpr::Or(Box::new(self.expr), Box::new(other.expr)),
            predicate: Arc::new(move |candidate| left(candidate) || right(candidate)),
            ordering: merge_ordering(self.ordering, other.ordering),
        }
    }

    pub fn not(self) -> Self {
        let inner = Arc::clone(&self.predicate);
        Self {
            expr: QueryExpr::Not(Box::new(self.expr)),
            predicate: Arc::new(move |candidate| !inner(candidate)),
            ordering: self.ordering,
        }
    }
}

fn merge_ordering(mut left: Vec<OrderBy>, right: Vec<OrderBy>) -> Vec<OrderBy> {
    for order in right {
        if !left.iter().any(|existing| existing.field == order.field) {
            left.push(order);
        }
    }
    left
}
