use crate::error::QueryError;
use crate::id::Id;
use crate::query::pattern::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum nesting depth for expressions to prevent stack overflow
pub const MAX_EXPR_DEPTH: usize = 32;

/// Predicate on a single tag key.
///
/// The inverted variants (`Ne`, `NotIn`, `NotRe`, `NotHas`) exist so the
/// expression tree is closed under negation: DNF expansion pushes `not`
/// down to the leaves. `Composite` is a same-key conjunction formed by the
/// index while inserting a sorted clause; it never appears in user-built
/// expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyQuery {
    Eq(String, String),
    Ne(String, String),
    Lt(String, String),
    Lte(String, String),
    Gt(String, String),
    Gte(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Re(String, Pattern),
    NotRe(String, Pattern),
    Has(String),
    NotHas(String),
    Composite(String, Vec<KeyQuery>),
}

impl KeyQuery {
    pub fn key(&self) -> &str {
        match self {
            KeyQuery::Eq(key, _)
            | KeyQuery::Ne(key, _)
            | KeyQuery::Lt(key, _)
            | KeyQuery::Lte(key, _)
            | KeyQuery::Gt(key, _)
            | KeyQuery::Gte(key, _)
            | KeyQuery::In(key, _)
            | KeyQuery::NotIn(key, _)
            | KeyQuery::Re(key, _)
            | KeyQuery::NotRe(key, _)
            | KeyQuery::Has(key)
            | KeyQuery::NotHas(key)
            | KeyQuery::Composite(key, _) => key,
        }
    }

    /// Check a present tag value against this predicate.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            KeyQuery::Eq(_, v) => value == v,
            KeyQuery::Ne(_, v) => value != v,
            KeyQuery::Lt(_, v) => value < v.as_str(),
            KeyQuery::Lte(_, v) => value <= v.as_str(),
            KeyQuery::Gt(_, v) => value > v.as_str(),
            KeyQuery::Gte(_, v) => value >= v.as_str(),
            KeyQuery::In(_, values) => values.contains(value),
            KeyQuery::NotIn(_, values) => !values.contains(value),
            KeyQuery::Re(_, pattern) => pattern.matches(value),
            KeyQuery::NotRe(_, pattern) => !pattern.matches(value),
            KeyQuery::Has(_) => true,
            KeyQuery::NotHas(_) => false,
            KeyQuery::Composite(_, queries) => queries.iter().all(|q| q.matches(value)),
        }
    }

    /// True iff the predicate is satisfied when the key is absent. Inverted
    /// predicates match absence; everything else requires a value.
    pub fn matches_empty(&self) -> bool {
        match self {
            KeyQuery::Ne(_, _)
            | KeyQuery::NotIn(_, _)
            | KeyQuery::NotRe(_, _)
            | KeyQuery::NotHas(_) => true,
            KeyQuery::Composite(_, queries) => queries.iter().all(|q| q.matches_empty()),
            _ => false,
        }
    }

    /// Literal prefix every possible match must begin with; empty when the
    /// predicate has no fixed start. `In` members are registered in the
    /// prefix tree individually (see `in_members`), so `In` reports an empty
    /// prefix here.
    pub fn prefix(&self) -> &str {
        match self {
            KeyQuery::Eq(_, value) => value,
            KeyQuery::Re(_, pattern) => pattern.prefix(),
            KeyQuery::Composite(_, queries) => queries
                .iter()
                .map(|q| q.prefix())
                .max_by_key(|p| p.len())
                .unwrap_or(""),
            _ => "",
        }
    }

    /// Member set of an `In` predicate (or of the first `In` member of a
    /// composite). The prefix tree stores these predicates once per member,
    /// matched exactly, so membership pruning stays sound.
    pub(crate) fn in_members(&self) -> Option<&BTreeSet<String>> {
        match self {
            KeyQuery::In(_, values) => Some(values),
            KeyQuery::Composite(_, queries) => queries.iter().find_map(|q| q.in_members()),
            _ => None,
        }
    }

    pub fn is_eq(&self) -> bool {
        matches!(self, KeyQuery::Eq(_, _))
    }

    pub fn is_has(&self) -> bool {
        matches!(self, KeyQuery::Has(_))
    }

    pub fn is_in(&self) -> bool {
        matches!(self, KeyQuery::In(_, _))
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, KeyQuery::Re(_, _))
    }

    fn invert(self) -> KeyQuery {
        match self {
            KeyQuery::Eq(k, v) => KeyQuery::Ne(k, v),
            KeyQuery::Ne(k, v) => KeyQuery::Eq(k, v),
            KeyQuery::Lt(k, v) => KeyQuery::Gte(k, v),
            KeyQuery::Lte(k, v) => KeyQuery::Gt(k, v),
            KeyQuery::Gt(k, v) => KeyQuery::Lte(k, v),
            KeyQuery::Gte(k, v) => KeyQuery::Lt(k, v),
            KeyQuery::In(k, vs) => KeyQuery::NotIn(k, vs),
            KeyQuery::NotIn(k, vs) => KeyQuery::In(k, vs),
            KeyQuery::Re(k, p) => KeyQuery::NotRe(k, p),
            KeyQuery::NotRe(k, p) => KeyQuery::Re(k, p),
            KeyQuery::Has(k) => KeyQuery::NotHas(k),
            KeyQuery::NotHas(k) => KeyQuery::Has(k),
            KeyQuery::Composite(_, _) => {
                unreachable!("composite key queries are internal to the index")
            }
        }
    }
}

impl fmt::Display for KeyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyQuery::Eq(k, v) => write!(f, "{k},{v},:eq"),
            KeyQuery::Ne(k, v) => write!(f, "{k},{v},:eq,:not"),
            KeyQuery::Lt(k, v) => write!(f, "{k},{v},:lt"),
            KeyQuery::Lte(k, v) => write!(f, "{k},{v},:le"),
            KeyQuery::Gt(k, v) => write!(f, "{k},{v},:gt"),
            KeyQuery::Gte(k, v) => write!(f, "{k},{v},:ge"),
            KeyQuery::In(k, vs) => write_in(f, k, vs, ""),
            KeyQuery::NotIn(k, vs) => write_in(f, k, vs, ",:not"),
            KeyQuery::Re(k, p) => write!(f, "{k},{p},:re"),
            KeyQuery::NotRe(k, p) => write!(f, "{k},{p},:re,:not"),
            KeyQuery::Has(k) => write!(f, "{k},:has"),
            KeyQuery::NotHas(k) => write!(f, "{k},:has,:not"),
            KeyQuery::Composite(_, queries) => {
                for q in queries {
                    write!(f, "{q},")?;
                }
                write!(f, ":and")
            }
        }
    }
}

fn write_in(
    f: &mut fmt::Formatter<'_>,
    key: &str,
    values: &BTreeSet<String>,
    suffix: &str,
) -> fmt::Result {
    write!(f, "{key},(")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, "),:in{suffix}")
}

/// Boolean predicate tree over tag keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    True,
    False,
    Key(KeyQuery),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::Key(KeyQuery::Eq(key.into(), value.into()))
    }

    pub fn ne(key: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::Key(KeyQuery::Ne(key.into(), value.into()))
    }

    pub fn lt(key: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::Key(KeyQuery::Lt(key.into(), value.into()))
    }

    pub fn lte(key: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::Key(KeyQuery::Lte(key.into(), value.into()))
    }

    pub fn gt(key: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::Key(KeyQuery::Gt(key.into(), value.into()))
    }

    pub fn gte(key: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::Key(KeyQuery::Gte(key.into(), value.into()))
    }

    pub fn in_set<I>(key: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Expr::Key(KeyQuery::In(
            key.into(),
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn not_in_set<I>(key: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Expr::Key(KeyQuery::NotIn(
            key.into(),
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn re(key: impl Into<String>, pattern: &str) -> Result<Expr, QueryError> {
        Ok(Expr::Key(KeyQuery::Re(key.into(), Pattern::new(pattern)?)))
    }

    pub fn has(key: impl Into<String>) -> Expr {
        Expr::Key(KeyQuery::Has(key.into()))
    }

    pub fn not_has(key: impl Into<String>) -> Expr {
        Expr::Key(KeyQuery::NotHas(key.into()))
    }

    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Calculates the maximum nesting depth of this expression tree.
    /// Used to prevent stack overflow from deeply nested expressions.
    pub fn depth(&self) -> usize {
        match self {
            Expr::True | Expr::False | Expr::Key(_) => 1,
            Expr::Not(inner) => 1 + inner.depth(),
            Expr::And(left, right) | Expr::Or(left, right) => 1 + left.depth().max(right.depth()),
        }
    }

    /// Validates that the expression depth does not exceed MAX_EXPR_DEPTH.
    /// Returns an error if the expression is too deeply nested.
    pub fn validate_depth(&self) -> Result<(), QueryError> {
        let depth = self.depth();
        if depth > MAX_EXPR_DEPTH {
            return Err(QueryError::TooDeep {
                depth,
                max: MAX_EXPR_DEPTH,
            });
        }
        Ok(())
    }

    /// Expand to disjunctive normal form. Each returned expression is
    /// `True`, `False`, or a conjunction of key predicates; negation has
    /// been pushed down to the leaves.
    pub fn dnf_list(&self) -> Vec<Expr> {
        self.clone().into_nnf().into_dnf_clauses()
    }

    fn into_nnf(self) -> Expr {
        match self {
            Expr::Not(inner) => inner.invert(),
            Expr::And(a, b) => Expr::And(Box::new(a.into_nnf()), Box::new(b.into_nnf())),
            Expr::Or(a, b) => Expr::Or(Box::new(a.into_nnf()), Box::new(b.into_nnf())),
            leaf => leaf,
        }
    }

    fn invert(self) -> Expr {
        match self {
            Expr::True => Expr::False,
            Expr::False => Expr::True,
            Expr::Key(kq) => Expr::Key(kq.invert()),
            Expr::And(a, b) => Expr::Or(Box::new(a.invert()), Box::new(b.invert())),
            Expr::Or(a, b) => Expr::And(Box::new(a.invert()), Box::new(b.invert())),
            Expr::Not(inner) => inner.into_nnf(),
        }
    }

    fn into_dnf_clauses(self) -> Vec<Expr> {
        match self {
            Expr::Or(a, b) => {
                let mut clauses = a.into_dnf_clauses();
                clauses.extend(b.into_dnf_clauses());
                clauses
            }
            Expr::And(a, b) => {
                let lhs = a.into_dnf_clauses();
                let rhs = b.into_dnf_clauses();
                let mut clauses = Vec::with_capacity(lhs.len() * rhs.len());
                for l in &lhs {
                    for r in &rhs {
                        clauses.push(Expr::conjoin(l.clone(), r.clone()));
                    }
                }
                clauses
            }
            other => vec![other],
        }
    }

    fn conjoin(a: Expr, b: Expr) -> Expr {
        match (a, b) {
            (Expr::False, _) | (_, Expr::False) => Expr::False,
            (Expr::True, x) => x,
            (x, Expr::True) => x,
            (a, b) => Expr::And(Box::new(a), Box::new(b)),
        }
    }

    /// Flatten a DNF conjunction into its key predicates. Panics if called
    /// on anything but a conjunction of leaves; the index only invokes this
    /// on clauses produced by `dnf_list`.
    pub fn and_list(&self) -> Vec<KeyQuery> {
        let mut out = Vec::new();
        self.push_and_terms(&mut out);
        out
    }

    fn push_and_terms(&self, out: &mut Vec<KeyQuery>) {
        match self {
            Expr::And(a, b) => {
                a.push_and_terms(out);
                b.push_and_terms(out);
            }
            Expr::Key(kq) => out.push(kq.clone()),
            other => panic!("conjunction leaf is not a key query: {other}"),
        }
    }

    /// Evaluate directly against a tag lookup function. `None` means the
    /// key is absent.
    pub fn matches_tags<'v>(&self, tags: &impl Fn(&str) -> Option<&'v str>) -> bool {
        match self {
            Expr::True => true,
            Expr::False => false,
            Expr::Key(kq) => match tags(kq.key()) {
                Some(value) => kq.matches(value),
                None => kq.matches_empty(),
            },
            Expr::And(a, b) => a.matches_tags(tags) && b.matches_tags(tags),
            Expr::Or(a, b) => a.matches_tags(tags) || b.matches_tags(tags),
            Expr::Not(inner) => !inner.matches_tags(tags),
        }
    }

    /// Evaluate directly against an identity.
    pub fn matches_id(&self, id: &Id) -> bool {
        self.matches_tags(&|key| id.tag(key))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::True => write!(f, ":true"),
            Expr::False => write!(f, ":false"),
            Expr::Key(kq) => write!(f, "{kq}"),
            Expr::And(a, b) => write!(f, "{a},{b},:and"),
            Expr::Or(a, b) => write!(f, "{a},{b},:or"),
            Expr::Not(inner) => write!(f, "{inner},:not"),
        }
    }
}
