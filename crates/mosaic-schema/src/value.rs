//! Typed configuration values and their per-tag merge rules.

use crate::fragment::Priority;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("type mismatch: cannot merge {left} with {right}")]
    TypeMismatch { left: Tag, right: Tag },
    #[error(
        "conflicting enable flags under exclusive policy: {left} (priority {left_priority}) vs {right} (priority {right_priority})"
    )]
    ConflictingEnable {
        left: bool,
        left_priority: Priority,
        right: bool,
        right_priority: Priority,
    },
    #[error("ambiguous override at priority {priority}: '{left}' vs '{right}'")]
    AmbiguousOverride {
        left: Scalar,
        right: Scalar,
        priority: Priority,
    },
    #[error("at key '{key}': {source}")]
    InKey {
        key: String,
        source: Box<ValueError>,
    },
}

impl ValueError {
    /// The failure underneath any `InKey` wrappers.
    pub fn root(&self) -> &ValueError {
        match self {
            ValueError::InKey { source, .. } => source.root(),
            other => other,
        }
    }

    /// Mapping keys leading from the merged value down to the failure.
    pub fn key_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = self;
        while let ValueError::InKey { key, source } = current {
            path.push(key.as_str());
            current = &**source;
        }
        path
    }
}

/// Discriminant of a [`Value`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Scalar,
    List,
    Set,
    Mapping,
    EnableFlag,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tag::Scalar => "scalar",
            Tag::List => "list",
            Tag::Set => "set",
            Tag::Mapping => "mapping",
            Tag::EnableFlag => "enable flag",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

/// A configuration value. The tag is fixed once a fragment produces it.
///
/// Values are totally ordered by structure so that sets deduplicate by
/// equality and sort keys stay deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Mapping(BTreeMap<String, Value>),
    EnableFlag(bool),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::Str(s.into()))
    }

    pub fn int(i: i64) -> Self {
        Value::Scalar(Scalar::Int(i))
    }

    pub fn bool(b: bool) -> Self {
        Value::Scalar(Scalar::Bool(b))
    }

    pub fn flag(enabled: bool) -> Self {
        Value::EnableFlag(enabled)
    }

    /// A set of string scalars.
    pub fn string_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Set(items.into_iter().map(Value::str).collect())
    }

    /// A list of string scalars, in the given order.
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(Value::str).collect())
    }

    pub fn tag(&self) -> Tag {
        match self {
            Value::Scalar(_) => Tag::Scalar,
            Value::List(_) => Tag::List,
            Value::Set(_) => Tag::Set,
            Value::Mapping(_) => Tag::Mapping,
            Value::EnableFlag(_) => Tag::EnableFlag,
        }
    }

    /// True for `EnableFlag(true)` and a `true` boolean scalar.
    pub fn is_true(&self) -> bool {
        matches!(
            self,
            Value::EnableFlag(true) | Value::Scalar(Scalar::Bool(true))
        )
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// String items of a list or set, or `None` if any item is not a string scalar.
    pub fn string_items(&self) -> Option<Vec<&str>> {
        let items: Box<dyn Iterator<Item = &Value> + '_> = match self {
            Value::List(items) => Box::new(items.iter()),
            Value::Set(items) => Box::new(items.iter()),
            _ => return None,
        };
        items
            .map(|v| match v {
                Value::Scalar(Scalar::Str(s)) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Untagged JSON view, for human-facing output.
    pub fn to_plain_json(&self) -> serde_json::Value {
        match self {
            Value::Scalar(Scalar::Bool(b)) | Value::EnableFlag(b) => serde_json::Value::Bool(*b),
            Value::Scalar(Scalar::Int(i)) => serde_json::Value::from(*i),
            Value::Scalar(Scalar::Str(s)) => serde_json::Value::String(s.clone()),
            Value::List(items) => items.iter().map(Value::to_plain_json).collect(),
            Value::Set(items) => items.iter().map(Value::to_plain_json).collect(),
            Value::Mapping(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_plain_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(Scalar::Str(s)) => write!(f, "{s:?}"),
            Value::Scalar(s) => write!(f, "{s}"),
            Value::EnableFlag(b) => write!(f, "{b}"),
            Value::List(items) => {
                f.write_str("[")?;
                write_joined(f, items.iter())?;
                f.write_str("]")
            }
            Value::Set(items) => {
                f.write_str("{")?;
                write_joined(f, items.iter())?;
                f.write_str("}")
            }
            Value::Mapping(entries) => {
                f.write_str("{ ")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

fn write_joined<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = &'a Value>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// How enable flags targeting the same id combine.
///
/// Ordered from most to least permissive; a group of fragments uses the
/// strictest policy any member declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnablePolicy {
    /// Logical OR.
    #[default]
    Any,
    /// The higher-precedence flag wins; at equal priority the later one does.
    Precedence,
    /// Any disagreement is a conflict.
    Exclusive,
}

impl fmt::Display for EnablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnablePolicy::Any => "any",
            EnablePolicy::Precedence => "precedence",
            EnablePolicy::Exclusive => "exclusive",
        };
        f.write_str(s)
    }
}

/// A value together with the priority it was contributed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked {
    pub value: Value,
    pub priority: Priority,
}

impl Ranked {
    pub fn new(value: Value, priority: Priority) -> Self {
        Self { value, priority }
    }
}

/// Merge two contributions to the same id.
///
/// `a` is the earlier contributor in fold order: lists append `b` after `a`,
/// and a precedence tie between flags goes to `b`. The result carries the
/// better (lower) of the two priorities, so fold more than two
/// contributions with [`merge_all`].
pub fn merge(a: Ranked, b: Ranked, policy: EnablePolicy) -> Result<Ranked, ValueError> {
    let priority = a.priority.min(b.priority);
    let value = merge_values(a.value, a.priority, b.value, b.priority, policy)?;
    Ok(Ranked { value, priority })
}

/// Fold every contribution to one id, given in fold order.
///
/// When all contributions are mappings they are folded key by key, so each
/// nested entry is ranked only against the contributors that set that key.
/// Anything else folds pairwise with [`merge`]. Returns `None` for no input.
pub fn merge_all(
    contributions: Vec<Ranked>,
    policy: EnablePolicy,
) -> Result<Option<Ranked>, ValueError> {
    let Some(priority) = contributions.iter().map(|c| c.priority).min() else {
        return Ok(None);
    };
    let all_mappings = contributions
        .iter()
        .all(|c| matches!(c.value, Value::Mapping(_)));

    if contributions.len() < 2 || !all_mappings {
        let mut rest = contributions.into_iter();
        let Some(first) = rest.next() else {
            return Ok(None);
        };
        return rest
            .try_fold(first, |acc, next| merge(acc, next, policy))
            .map(Some);
    }

    let mut per_key: BTreeMap<String, Vec<Ranked>> = BTreeMap::new();
    for contribution in contributions {
        if let Value::Mapping(entries) = contribution.value {
            for (key, value) in entries {
                per_key
                    .entry(key)
                    .or_default()
                    .push(Ranked::new(value, contribution.priority));
            }
        }
    }

    let mut merged = BTreeMap::new();
    for (key, values) in per_key {
        let folded = merge_all(values, policy).map_err(|e| ValueError::InKey {
            key: key.clone(),
            source: Box::new(e),
        })?;
        if let Some(ranked) = folded {
            merged.insert(key, ranked.value);
        }
    }
    Ok(Some(Ranked::new(Value::Mapping(merged), priority)))
}

fn merge_values(
    a: Value,
    pa: Priority,
    b: Value,
    pb: Priority,
    policy: EnablePolicy,
) -> Result<Value, ValueError> {
    match (a, b) {
        (Value::List(mut left), Value::List(right)) => {
            left.extend(right);
            Ok(Value::List(left))
        }
        (Value::Set(mut left), Value::Set(right)) => {
            left.extend(right);
            Ok(Value::Set(left))
        }
        (Value::Mapping(mut left), Value::Mapping(right)) => {
            for (key, incoming) in right {
                let merged = match left.remove(&key) {
                    Some(existing) => merge_values(existing, pa, incoming, pb, policy).map_err(
                        |e| ValueError::InKey {
                            key: key.clone(),
                            source: Box::new(e),
                        },
                    )?,
                    None => incoming,
                };
                left.insert(key, merged);
            }
            Ok(Value::Mapping(left))
        }
        (Value::EnableFlag(x) | Value::Scalar(Scalar::Bool(x)), Value::EnableFlag(y))
        | (Value::EnableFlag(x), Value::Scalar(Scalar::Bool(y))) => {
            merge_flags(x, pa, y, pb, policy).map(Value::EnableFlag)
        }
        (Value::Scalar(x), Value::Scalar(y)) => merge_scalars(x, pa, y, pb).map(Value::Scalar),
        (left, right) => Err(ValueError::TypeMismatch {
            left: left.tag(),
            right: right.tag(),
        }),
    }
}

fn merge_flags(
    x: bool,
    pa: Priority,
    y: bool,
    pb: Priority,
    policy: EnablePolicy,
) -> Result<bool, ValueError> {
    match policy {
        EnablePolicy::Any => Ok(x || y),
        EnablePolicy::Precedence => Ok(if pa < pb { x } else { y }),
        EnablePolicy::Exclusive if x == y => Ok(x),
        EnablePolicy::Exclusive => Err(ValueError::ConflictingEnable {
            left: x,
            left_priority: pa,
            right: y,
            right_priority: pb,
        }),
    }
}

fn merge_scalars(x: Scalar, pa: Priority, y: Scalar, pb: Priority) -> Result<Scalar, ValueError> {
    match pa.cmp(&pb) {
        Ordering::Less => Ok(x),
        Ordering::Greater => Ok(y),
        Ordering::Equal if x == y => Ok(x),
        Ordering::Equal => Err(ValueError::AmbiguousOverride {
            left: x,
            right: y,
            priority: pa,
        }),
    }
}
