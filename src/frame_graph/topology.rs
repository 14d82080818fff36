use std::collections::{BTreeSet, HashSet};
use std::iter;
use std::num::NonZeroUsize;

use itertools::Itertools;

use super::planner::{Planner, WakeupState};
use super::{StageGraph, StageId, StageRunner};

/// Index of a stage in a [`Topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct StageIndex(pub(crate) usize);

/// What a stage does when it runs.
pub(crate) enum Runnable {
    /// Anchors only order other stages.
    Noop,
    /// Dispatches to the update stage of a component type.
    ComponentUpdate(crate::component::ComponentTypeIdentifier),
    Custom(StageRunner),
}

/// The compiled form of a [`StageGraph`].
pub(crate) struct Topology {
    /// The stage identifiers, indexed by [`StageIndex`].
    stages:          Vec<StageId>,
    runnables:       Vec<Runnable>,
    /// If `dependents[a].contains(b)`, `b` depends on `a`.
    /// This means `b` is a wakeup candidate when `a` completes.
    dependents:      Vec<Vec<StageIndex>>,
    /// The [`Planner`] reset state every frame.
    initial_planner: Planner,
}

impl Topology {
    /// Compiles `graph`.
    ///
    /// # Panics
    /// Panics if the graph contains a cycle.
    pub(crate) fn init(graph: &StageGraph) -> Self {
        let stages: Vec<StageId> = graph.stages.keys().copied().collect();

        let runnables = graph
            .stages
            .iter()
            .map(|(&id, entry)| match (id, &entry.runner) {
                (_, Some(runner)) => Runnable::Custom(runner.clone()),
                (StageId::ComponentUpdate(ty), None) => Runnable::ComponentUpdate(ty),
                _ => Runnable::Noop,
            })
            .collect();

        let dependents: Vec<Vec<StageIndex>> = graph
            .stages
            .values()
            .map(|entry| {
                entry
                    .subsequent
                    .iter()
                    .map(|after| {
                        StageIndex(graph.stages.get_index_of(after).expect("edge to removed stage"))
                    })
                    .collect()
            })
            .collect();

        scan_cycles(&dependents, |index| stages[index.0].to_string());
        let initial_planner = build_initial_planner(&dependents);

        Self { stages, runnables, dependents, initial_planner }
    }

    pub(crate) fn dependents_of(&self, index: StageIndex) -> &[StageIndex] {
        self.dependents.get(index.0).expect("invalid stage index")
    }

    pub(crate) fn stage(&self, index: StageIndex) -> StageId {
        *self.stages.get(index.0).expect("invalid stage index")
    }

    pub(crate) fn runnable(&self, index: StageIndex) -> &Runnable {
        self.runnables.get(index.0).expect("invalid stage index")
    }

    pub(crate) fn initial_planner(&self) -> &Planner { &self.initial_planner }

    pub(crate) fn len(&self) -> usize { self.stages.len() }

    /// Returns the stages in the order a single-threaded frame runs them.
    pub(crate) fn sequential_order(&self) -> Vec<StageId> {
        let mut planner = self.initial_planner.clone();
        let mut order = Vec::with_capacity(self.len());
        while let Some(index) = planner.runnable.pop_first() {
            order.push(self.stage(index));
            planner.complete_sequential(index, self);
        }
        order
    }
}

fn scan_cycles(dependents: &[Vec<StageIndex>], describe: impl Fn(StageIndex) -> String) {
    let mut remaining: BTreeSet<StageIndex> = (0..dependents.len()).map(StageIndex).collect();
    let mut exited = HashSet::new();
    let mut stack = Vec::new();

    while let Some(&node) = remaining.iter().next() {
        scan_cycles_from(dependents, node, &mut remaining, &mut exited, &mut stack, &describe);
    }
}

fn scan_cycles_from(
    dependents: &[Vec<StageIndex>],
    node: StageIndex,
    remaining: &mut BTreeSet<StageIndex>,
    exited: &mut HashSet<StageIndex>,
    stack: &mut Vec<StageIndex>,
    describe: &impl Fn(StageIndex) -> String,
) {
    if exited.contains(&node) {
        return; // already scanned
    }

    if !remaining.remove(&node) {
        let cycle = stack
            .iter()
            .skip_while(|&&ancestor| ancestor != node)
            .chain(iter::once(&node))
            .map(|&stage| describe(stage))
            .join(" -> ");
        panic!("Frame graph stages have a cyclic dependency: {cycle}");
    }

    stack.push(node);

    for &dependent in dependents.get(node.0).expect("invalid stage index") {
        scan_cycles_from(dependents, dependent, remaining, exited, stack, describe);
    }

    let popped = stack.pop();
    debug_assert_eq!(Some(node), popped);

    let new_exit = exited.insert(node);
    assert!(new_exit, "exited is inserted recursively but no cycles were detected");
}

fn build_initial_planner(dependents: &[Vec<StageIndex>]) -> Planner {
    let mut dependency_counts = vec![0_usize; dependents.len()];
    for after in dependents.iter().flatten() {
        dependency_counts[after.0] += 1;
    }

    let runnable: BTreeSet<StageIndex> = dependency_counts
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == 0)
        .map(|(index, _)| StageIndex(index))
        .collect();

    let wakeup_state = dependency_counts
        .into_iter()
        .map(|count| match NonZeroUsize::new(count) {
            Some(count) => WakeupState::Blocked { count },
            None => WakeupState::Pending,
        })
        .collect();

    Planner { wakeup_state, runnable, remaining_stages: dependents.len() }
}
