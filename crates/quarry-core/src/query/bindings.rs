//! Binding buckets.
//!
//! Bindings are kept per clause kind and flattened in a fixed order that
//! matches the order in which the select grammar emits clauses, so each
//! marker in the SQL text lines up with its value.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::value::SqlValue;

/// The clause a binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Select list (sub-selects, raw selects).
    Select,
    /// Join conditions.
    Join,
    /// Where predicates.
    Where,
    /// Having predicates.
    Having,
    /// Raw order clauses.
    Order,
    /// Union branches and union-level ordering.
    Union,
}

impl BindingKind {
    /// Every kind, in flatten order.
    pub const ALL: [Self; 6] = [
        Self::Select,
        Self::Join,
        Self::Where,
        Self::Having,
        Self::Order,
        Self::Union,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Select => 0,
            Self::Join => 1,
            Self::Where => 2,
            Self::Having => 3,
            Self::Order => 4,
            Self::Union => 5,
        }
    }

    /// Returns the bucket name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Join => "join",
            Self::Where => "where",
            Self::Having => "having",
            Self::Order => "order",
            Self::Union => "union",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::invalid(format!("invalid binding type: {s}")))
    }
}

/// Bindings grouped by clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    buckets: [Vec<SqlValue>; 6],
}

impl Bindings {
    /// Creates empty buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to a bucket.
    pub fn add(&mut self, kind: BindingKind, value: SqlValue) {
        self.buckets[kind.index()].push(value);
    }

    /// Appends several values to a bucket.
    pub fn extend<I: IntoIterator<Item = SqlValue>>(&mut self, kind: BindingKind, values: I) {
        self.buckets[kind.index()].extend(values);
    }

    /// Replaces a bucket.
    pub fn set(&mut self, kind: BindingKind, values: Vec<SqlValue>) {
        self.buckets[kind.index()] = values;
    }

    /// Empties a bucket and returns its previous content.
    pub fn take(&mut self, kind: BindingKind) -> Vec<SqlValue> {
        std::mem::take(&mut self.buckets[kind.index()])
    }

    /// Returns a bucket.
    #[must_use]
    pub fn get(&self, kind: BindingKind) -> &[SqlValue] {
        &self.buckets[kind.index()]
    }

    /// Appends every bucket of `other` to the matching bucket of `self`.
    pub fn merge(&mut self, other: &Self) {
        for (mine, theirs) in self.buckets.iter_mut().zip(&other.buckets) {
            mine.extend(theirs.iter().cloned());
        }
    }

    /// Returns the values of the given kinds concatenated in that order.
    #[must_use]
    pub fn collect(&self, kinds: &[BindingKind]) -> Vec<SqlValue> {
        kinds
            .iter()
            .flat_map(|kind| self.get(*kind).iter().cloned())
            .collect()
    }

    /// Returns every binding in select-emission order.
    #[must_use]
    pub fn flatten(&self) -> Vec<SqlValue> {
        self.collect(&BindingKind::ALL)
    }

    /// Total number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Returns `true` when every bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_follows_clause_order() {
        let mut b = Bindings::new();
        b.add(BindingKind::Order, SqlValue::Int(5));
        b.add(BindingKind::Where, SqlValue::Int(3));
        b.add(BindingKind::Select, SqlValue::Int(1));
        b.add(BindingKind::Having, SqlValue::Int(4));
        b.add(BindingKind::Join, SqlValue::Int(2));
        b.add(BindingKind::Union, SqlValue::Int(6));
        let flat: Vec<i64> = b.flatten().iter().filter_map(SqlValue::as_i64).collect();
        assert_eq!(flat, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(b.len(), 6);
    }

    #[test]
    fn test_unknown_bucket_name_is_rejected() {
        assert_eq!("having".parse::<BindingKind>().ok(), Some(BindingKind::Having));
        let err = "bogus".parse::<BindingKind>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_merge_and_take() {
        let mut a = Bindings::new();
        a.add(BindingKind::Where, SqlValue::Int(1));
        let mut b = Bindings::new();
        b.add(BindingKind::Where, SqlValue::Int(2));
        a.merge(&b);
        assert_eq!(a.get(BindingKind::Where).len(), 2);
        assert_eq!(a.take(BindingKind::Where).len(), 2);
        assert!(a.is_empty());
    }
}
