use crate::config::ComposeConfig;
use crate::eval::{DependencyGraph, Evaluator};
use mosaic_schema::{
    merge_all, EnablePolicy, EnvironmentDescriptor, Fragment, FragmentError, FragmentId, Origin,
    Ranked, Value, ValueError,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a single id failed to compose.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeCause {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error("references unknown id '{0}'")]
    UnknownReference(FragmentId),
    #[error("dependency '{0}' failed to resolve")]
    DependencyFailed(FragmentId),
    #[error("derivation failed: {0}")]
    Derivation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{id}': {cause}")]
pub struct MergeError {
    pub id: FragmentId,
    #[source]
    pub cause: MergeCause,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("cyclic dependency between {}", join_ids(.ids))]
    CyclicDependency { ids: Vec<FragmentId> },
    #[error("{} id(s) failed: {}", .0.len(), join_failures(.0))]
    Conflicts(Vec<MergeError>),
}

impl ComposeError {
    /// Every id named by this error, in id order.
    pub fn ids(&self) -> Vec<&FragmentId> {
        match self {
            ComposeError::CyclicDependency { ids } => ids.iter().collect(),
            ComposeError::Conflicts(failures) => failures.iter().map(|f| &f.id).collect(),
        }
    }
}

fn join_ids(ids: &[FragmentId]) -> String {
    ids.iter()
        .map(FragmentId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_failures(failures: &[MergeError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// All fragments targeting one id.
#[derive(Debug, Default)]
pub(crate) struct Group {
    pub(crate) members: Vec<Fragment>,
}

impl Group {
    /// The strictest enable policy any member declares.
    pub(crate) fn policy(&self) -> EnablePolicy {
        self.members
            .iter()
            .map(Fragment::policy)
            .max()
            .unwrap_or_default()
    }
}

/// Sort contributions by priority, then declaration origin, then value,
/// and fold them left to right.
///
/// Returns `None` when nothing was contributed.
pub(crate) fn fold_group(
    mut contributions: Vec<(Ranked, Origin)>,
    policy: EnablePolicy,
) -> Result<Option<Value>, ValueError> {
    contributions.sort_by(|(a, a_origin), (b, b_origin)| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a_origin.cmp(b_origin))
            .then_with(|| a.value.cmp(&b.value))
    });

    let ranked = contributions.into_iter().map(|(r, _)| r).collect();
    Ok(merge_all(ranked, policy)?.map(|merged| merged.value))
}

/// Merges fragments into one [`EnvironmentDescriptor`].
///
/// A composer holds only its configuration; independent runs may share one
/// across threads.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    config: ComposeConfig,
}

impl Composer {
    pub fn new(config: ComposeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Compose every fragment into a descriptor.
    ///
    /// Either every id resolves or the run fails. A cycle aborts immediately;
    /// otherwise failures from all ids are collected and returned together.
    pub fn compose(
        &self,
        fragments: impl IntoIterator<Item = Fragment>,
    ) -> Result<EnvironmentDescriptor, ComposeError> {
        let (groups, mut prefailed) = self.group(fragments);
        info!(ids = groups.len(), "composing fragments");

        let (graph, unknown) = DependencyGraph::build(&groups);
        for failure in unknown {
            prefailed.entry(failure.id).or_insert(failure.cause);
        }
        let layers = graph.layers()?;
        debug!(layers = layers.len(), "evaluation order resolved");

        let outcomes = Evaluator::new(&groups, &graph, &prefailed)
            .run(&layers, self.config.parallelism);

        let mut entries = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(Some(value)) => entries.push((id, value)),
                Ok(None) => debug!(%id, "no contributions resolved; omitting"),
                Err(cause) => failures.push(MergeError { id, cause }),
            }
        }

        if failures.is_empty() {
            info!(entries = entries.len(), "composition complete");
            Ok(entries.into_iter().collect())
        } else {
            warn!(failed = failures.len(), "composition failed");
            Err(ComposeError::Conflicts(failures))
        }
    }

    /// Layered evaluation order of the ids these fragments target. Ids within
    /// a layer are independent of each other.
    pub fn evaluation_order(
        &self,
        fragments: &[Fragment],
    ) -> Result<Vec<Vec<FragmentId>>, ComposeError> {
        let (groups, _) = self.group(fragments.iter().cloned());
        let (graph, _) = DependencyGraph::build(&groups);
        graph.layers()
    }

    fn group(
        &self,
        fragments: impl IntoIterator<Item = Fragment>,
    ) -> (
        BTreeMap<FragmentId, Group>,
        BTreeMap<FragmentId, MergeCause>,
    ) {
        let mut groups: BTreeMap<FragmentId, Group> = BTreeMap::new();
        let mut prefailed = BTreeMap::new();

        for fragment in fragments {
            let group = groups.entry(fragment.id().clone()).or_default();
            if let Err(e) = self.config.bounds.check(fragment.priority()) {
                prefailed
                    .entry(fragment.id().clone())
                    .or_insert(MergeCause::Fragment(e));
                continue;
            }
            group.members.push(fragment);
        }
        (groups, prefailed)
    }
}
