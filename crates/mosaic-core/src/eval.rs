//! Dependency ordering and memoized evaluation of fragment groups.

use crate::compose::{fold_group, ComposeError, Group, MergeCause, MergeError};
use crate::config::Parallelism;
use mosaic_schema::{Body, FragmentId, Lookup, Ranked, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use std::thread;
use tracing::{debug, trace};

pub(crate) type Outcome = Result<Option<Value>, MergeCause>;

/// Edges from each id to the ids its derived fragments read.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<FragmentId, BTreeSet<FragmentId>>,
}

impl DependencyGraph {
    /// Build the graph over grouped ids. References to ids with no group are
    /// returned as failures instead of becoming edges.
    pub(crate) fn build(groups: &BTreeMap<FragmentId, Group>) -> (Self, Vec<MergeError>) {
        let mut edges = BTreeMap::new();
        let mut unknown = Vec::new();

        for (id, group) in groups {
            let deps: &mut BTreeSet<FragmentId> = edges.entry(id.clone()).or_default();
            for fragment in &group.members {
                for dep in fragment.dependencies() {
                    if groups.contains_key(dep) {
                        deps.insert(dep.clone());
                    } else {
                        unknown.push(MergeError {
                            id: id.clone(),
                            cause: MergeCause::UnknownReference(dep.clone()),
                        });
                    }
                }
            }
        }
        (Self { edges }, unknown)
    }

    pub fn dependencies_of(&self, id: &FragmentId) -> impl Iterator<Item = &FragmentId> {
        self.edges.get(id).into_iter().flatten()
    }

    /// Kahn's algorithm, grouped into layers. Every id in a layer depends
    /// only on ids in earlier layers. Ids within a layer are sorted.
    pub fn layers(&self) -> Result<Vec<Vec<FragmentId>>, ComposeError> {
        let mut pending: BTreeMap<&FragmentId, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id, deps.len()))
            .collect();

        let mut dependents: BTreeMap<&FragmentId, Vec<&FragmentId>> = BTreeMap::new();
        for (id, deps) in &self.edges {
            for dep in deps {
                dependents.entry(dep).or_default().push(id);
            }
        }

        let mut ready: Vec<&FragmentId> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut layers = Vec::new();

        while !ready.is_empty() {
            for id in &ready {
                pending.remove(id);
            }
            let mut next = BTreeSet::new();
            for id in &ready {
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(n) = pending.get_mut(dependent) {
                        *n -= 1;
                        if *n == 0 {
                            next.insert(*dependent);
                        }
                    }
                }
            }
            layers.push(ready.iter().map(|id| (*id).clone()).collect());
            ready = next.into_iter().collect();
        }

        if pending.is_empty() {
            return Ok(layers);
        }

        let leftover: BTreeSet<&FragmentId> = pending.keys().copied().collect();
        let ids: Vec<FragmentId> = leftover
            .iter()
            .filter(|id| self.on_cycle(id, &leftover))
            .map(|id| (*id).clone())
            .collect();
        Err(ComposeError::CyclicDependency { ids })
    }

    /// Leftover ids are either on a cycle or downstream of one; only the
    /// former can reach themselves.
    fn on_cycle(&self, start: &FragmentId, within: &BTreeSet<&FragmentId>) -> bool {
        let mut stack: Vec<&FragmentId> = self
            .dependencies_of(start)
            .filter(|d| within.contains(d))
            .collect();
        let mut seen = BTreeSet::new();

        while let Some(id) = stack.pop() {
            if id == start {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.dependencies_of(id).filter(|d| within.contains(d)));
            }
        }
        false
    }
}

/// Evaluates each id at most once, reading earlier results from a shared memo.
pub(crate) struct Evaluator<'a> {
    groups: &'a BTreeMap<FragmentId, Group>,
    graph: &'a DependencyGraph,
    prefailed: &'a BTreeMap<FragmentId, MergeCause>,
    memo: BTreeMap<FragmentId, OnceLock<Outcome>>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(
        groups: &'a BTreeMap<FragmentId, Group>,
        graph: &'a DependencyGraph,
        prefailed: &'a BTreeMap<FragmentId, MergeCause>,
    ) -> Self {
        let memo = groups
            .keys()
            .map(|id| (id.clone(), OnceLock::new()))
            .collect();
        Self {
            groups,
            graph,
            prefailed,
            memo,
        }
    }

    /// Evaluate layer by layer and return the outcome for every id.
    pub(crate) fn run(
        &self,
        layers: &[Vec<FragmentId>],
        parallelism: Parallelism,
    ) -> BTreeMap<FragmentId, Outcome> {
        for (depth, layer) in layers.iter().enumerate() {
            let workers = parallelism.workers_for(layer.len());
            debug!(depth, ids = layer.len(), workers, "evaluating layer");

            if workers <= 1 {
                for id in layer {
                    self.resolve(id);
                }
                continue;
            }

            let chunk_size = layer.len().div_ceil(workers);
            thread::scope(|scope| {
                for chunk in layer.chunks(chunk_size) {
                    scope.spawn(move || {
                        for id in chunk {
                            self.resolve(id);
                        }
                    });
                }
            });
        }

        self.memo
            .keys()
            .map(|id| (id.clone(), self.resolve(id).clone()))
            .collect()
    }

    fn resolve(&self, id: &FragmentId) -> &Outcome {
        match self.memo.get(id) {
            Some(cell) => cell.get_or_init(|| self.evaluate(id)),
            None => &UNTRACKED,
        }
    }

    fn evaluate(&self, id: &FragmentId) -> Outcome {
        if let Some(cause) = self.prefailed.get(id) {
            return Err(cause.clone());
        }
        for dep in self.graph.dependencies_of(id) {
            if self.resolve(dep).is_err() {
                return Err(MergeCause::DependencyFailed(dep.clone()));
            }
        }

        let Some(group) = self.groups.get(id) else {
            return Ok(None);
        };

        let mut contributions = Vec::with_capacity(group.members.len());
        for fragment in &group.members {
            let value = match fragment.body() {
                Body::Literal(value) => Some(value.clone()),
                Body::Derived(thunk) => {
                    let view = ScopedLookup {
                        memo: &self.memo,
                        allowed: fragment.dependencies(),
                    };
                    thunk.evaluate(&view).map_err(MergeCause::Derivation)?
                }
            };
            match value {
                Some(value) => contributions.push((
                    Ranked::new(value, fragment.priority()),
                    fragment.origin().clone(),
                )),
                None => trace!(%id, origin = %fragment.origin(), "fragment resolved to nothing"),
            }
        }

        let merged = fold_group(contributions, group.policy())?;
        trace!(%id, "evaluated");
        Ok(merged)
    }
}

static UNTRACKED: Outcome = Ok(None);

/// Lookup limited to a fragment's declared dependencies.
struct ScopedLookup<'m> {
    memo: &'m BTreeMap<FragmentId, OnceLock<Outcome>>,
    allowed: Vec<&'m FragmentId>,
}

impl Lookup for ScopedLookup<'_> {
    fn lookup(&self, id: &str) -> Option<&Value> {
        if !self.allowed.iter().any(|allowed| allowed.as_str() == id) {
            return None;
        }
        match self.memo.get(id)?.get()? {
            Ok(Some(value)) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_schema::{Fragment, Thunk};

    fn id(s: &str) -> FragmentId {
        FragmentId::parse(s).unwrap()
    }

    fn groups(fragments: Vec<Fragment>) -> BTreeMap<FragmentId, Group> {
        let mut groups: BTreeMap<FragmentId, Group> = BTreeMap::new();
        for f in fragments {
            groups.entry(f.id().clone()).or_default().members.push(f);
        }
        groups
    }

    fn reference(from: &str, to: &str) -> Fragment {
        Fragment::derived(from, Thunk::Ref(id(to))).unwrap()
    }

    #[test]
    fn layers_follow_dependencies() {
        let groups = groups(vec![
            reference("c", "b"),
            reference("b", "a"),
            Fragment::literal("a", Value::int(1)).unwrap(),
            Fragment::literal("z", Value::int(2)).unwrap(),
        ]);
        let (graph, unknown) = DependencyGraph::build(&groups);
        assert!(unknown.is_empty());

        let layers = graph.layers().unwrap();
        assert_eq!(
            layers,
            vec![vec![id("a"), id("z")], vec![id("b")], vec![id("c")]]
        );
    }

    #[test]
    fn cycle_reports_only_members() {
        let groups = groups(vec![
            reference("A", "B"),
            reference("B", "A"),
            reference("C", "A"),
            Fragment::literal("D", Value::int(1)).unwrap(),
        ]);
        let (graph, _) = DependencyGraph::build(&groups);

        let err = graph.layers().unwrap_err();
        assert_eq!(
            err,
            ComposeError::CyclicDependency {
                ids: vec![id("A"), id("B")]
            }
        );
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let groups = groups(vec![reference("A", "A")]);
        let (graph, _) = DependencyGraph::build(&groups);
        assert_eq!(
            graph.layers().unwrap_err(),
            ComposeError::CyclicDependency { ids: vec![id("A")] }
        );
    }

    #[test]
    fn unknown_references_are_not_edges() {
        let groups = groups(vec![reference("shell", "login.shell")]);
        let (graph, unknown) = DependencyGraph::build(&groups);

        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].id, id("shell"));
        assert_eq!(
            unknown[0].cause,
            MergeCause::UnknownReference(id("login.shell"))
        );
        assert_eq!(graph.layers().unwrap(), vec![vec![id("shell")]]);
    }

    #[test]
    fn scoped_lookup_hides_undeclared_ids() {
        let groups = groups(vec![
            Fragment::literal("shell", Value::str("zsh")).unwrap(),
            Fragment::literal("editor", Value::str("vi")).unwrap(),
            Fragment::derived(
                "login",
                Thunk::custom(vec![id("shell")], |r| {
                    Ok(Some(Value::bool(r.lookup("editor").is_some())))
                }),
            )
            .unwrap(),
        ]);
        let (graph, _) = DependencyGraph::build(&groups);
        let layers = graph.layers().unwrap();
        let prefailed = BTreeMap::new();

        let outcomes =
            Evaluator::new(&groups, &graph, &prefailed).run(&layers, Parallelism::Sequential);
        assert_eq!(outcomes[&id("login")], Ok(Some(Value::bool(false))));
    }
}
