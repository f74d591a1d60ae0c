//! Fragments: named, immutable configuration contributions.

use crate::value::{EnablePolicy, Value};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("fragment id must not be empty")]
    EmptyId,
    #[error("invalid fragment id '{0}': expected dot-separated segments of [A-Za-z0-9_-]")]
    InvalidId(String),
    #[error("priority {priority} is outside the configured bounds {min}..={max}")]
    PriorityOutOfBounds {
        priority: Priority,
        min: Priority,
        max: Priority,
    },
}

/// Dotted path naming the descriptor entry a fragment contributes to,
/// e.g. `packages` or `languages.rust.enable`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FragmentId(String);

impl FragmentId {
    pub fn parse(s: &str) -> Result<Self, FragmentError> {
        if s.is_empty() {
            return Err(FragmentError::EmptyId);
        }
        let valid = s.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
        if !valid {
            return Err(FragmentError::InvalidId(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// True if this id is `namespace` itself or lives below it.
    pub fn is_within(&self, namespace: &str) -> bool {
        self.0 == namespace
            || self
                .0
                .strip_prefix(namespace)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl TryFrom<String> for FragmentId {
    type Error = FragmentError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<FragmentId> for String {
    fn from(id: FragmentId) -> Self {
        id.0
    }
}

impl Borrow<str> for FragmentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Merge precedence. Lower numbers take precedence over higher ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(u32);

impl Priority {
    /// Overrides ordinary declarations.
    pub const FORCE: Self = Self(50);
    /// Priority of a fragment that does not declare one.
    pub const NORMAL: Self = Self(100);
    /// Yields to any ordinary declaration.
    pub const FALLBACK: Self = Self(1000);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of priorities a composition accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorityBounds {
    pub min: Priority,
    pub max: Priority,
}

impl PriorityBounds {
    pub const fn new(min: Priority, max: Priority) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, priority: Priority) -> bool {
        self.min <= priority && priority <= self.max
    }

    pub fn check(&self, priority: Priority) -> Result<(), FragmentError> {
        if self.contains(priority) {
            Ok(())
        } else {
            Err(FragmentError::PriorityOutOfBounds {
                priority,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl Default for PriorityBounds {
    fn default() -> Self {
        Self::new(Priority::new(0), Priority::new(1500))
    }
}

/// Where a fragment was declared: a source label and the declaration index
/// within it. The ordering of origins is the declaration order used to break
/// priority ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub source: String,
    pub position: u32,
}

impl Origin {
    pub fn new(source: impl Into<String>, position: u32) -> Self {
        Self {
            source: source.into(),
            position,
        }
    }

    /// Origin for fragments constructed in code without a module.
    pub fn inline() -> Self {
        Self::new("<inline>", 0)
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::inline()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.position)
    }
}

/// Read access to already-resolved descriptor entries.
pub trait Lookup {
    /// The merged value of `id`, or `None` if it resolved to nothing.
    fn lookup(&self, id: &str) -> Option<&Value>;
}

pub type DeriveFn = dyn Fn(&dyn Lookup) -> Result<Option<Value>, String> + Send + Sync;

/// A fragment value computed from the merged values of other ids.
#[derive(Clone)]
pub enum Thunk {
    /// The merged value of another id.
    Ref(FragmentId),
    /// `then` when `flag` resolved true, nothing otherwise.
    When { flag: FragmentId, then: Value },
    /// Arbitrary derivation over the declared dependencies.
    Custom {
        depends_on: Vec<FragmentId>,
        derive: Arc<DeriveFn>,
    },
}

impl Thunk {
    pub fn custom<F>(depends_on: Vec<FragmentId>, derive: F) -> Self
    where
        F: Fn(&dyn Lookup) -> Result<Option<Value>, String> + Send + Sync + 'static,
    {
        Thunk::Custom {
            depends_on,
            derive: Arc::new(derive),
        }
    }

    pub fn dependencies(&self) -> Vec<&FragmentId> {
        match self {
            Thunk::Ref(id) => vec![id],
            Thunk::When { flag, .. } => vec![flag],
            Thunk::Custom { depends_on, .. } => depends_on.iter().collect(),
        }
    }

    pub fn evaluate(&self, resolved: &dyn Lookup) -> Result<Option<Value>, String> {
        match self {
            Thunk::Ref(id) => Ok(resolved.lookup(id.as_str()).cloned()),
            Thunk::When { flag, then } => Ok(resolved
                .lookup(flag.as_str())
                .filter(|v| v.is_true())
                .map(|_| then.clone())),
            Thunk::Custom { derive, .. } => derive(resolved),
        }
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thunk::Ref(id) => f.debug_tuple("Ref").field(id).finish(),
            Thunk::When { flag, then } => f
                .debug_struct("When")
                .field("flag", flag)
                .field("then", then)
                .finish(),
            Thunk::Custom { depends_on, .. } => f
                .debug_struct("Custom")
                .field("depends_on", depends_on)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    Literal(Value),
    Derived(Thunk),
}

/// One named, immutable contribution to an environment.
#[derive(Debug, Clone)]
pub struct Fragment {
    id: FragmentId,
    body: Body,
    priority: Priority,
    policy: EnablePolicy,
    origin: Origin,
}

impl Fragment {
    pub fn builder(id: impl Into<String>, body: Body) -> FragmentBuilder {
        FragmentBuilder {
            id: id.into(),
            body,
            priority: Priority::NORMAL,
            policy: EnablePolicy::default(),
            origin: Origin::inline(),
        }
    }

    /// A literal fragment at normal priority.
    pub fn literal(id: impl Into<String>, value: Value) -> Result<Self, FragmentError> {
        Self::builder(id, Body::Literal(value)).build(&PriorityBounds::default())
    }

    /// A derived fragment at normal priority.
    pub fn derived(id: impl Into<String>, thunk: Thunk) -> Result<Self, FragmentError> {
        Self::builder(id, Body::Derived(thunk)).build(&PriorityBounds::default())
    }

    pub fn id(&self) -> &FragmentId {
        &self.id
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn policy(&self) -> EnablePolicy {
        self.policy
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Ids this fragment must see resolved before it can be evaluated.
    pub fn dependencies(&self) -> Vec<&FragmentId> {
        match &self.body {
            Body::Literal(_) => Vec::new(),
            Body::Derived(thunk) => thunk.dependencies(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FragmentBuilder {
    id: String,
    body: Body,
    priority: Priority,
    policy: EnablePolicy,
    origin: Origin,
}

impl FragmentBuilder {
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: EnablePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Validate the id and priority and freeze the fragment.
    pub fn build(self, bounds: &PriorityBounds) -> Result<Fragment, FragmentError> {
        let id = FragmentId::parse(&self.id)?;
        bounds.check(self.priority)?;
        Ok(Fragment {
            id,
            body: self.body,
            priority: self.priority,
            policy: self.policy,
            origin: self.origin,
        })
    }
}
