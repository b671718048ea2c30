//! Wave partitioning.
//!
//! The planner turns a dependency-analyzed task list into an ordered list of
//! waves: batches whose tasks may run together. The algorithm is a stable,
//! level-based topological sort with conflict avoidance — each round takes
//! the ready set in source order and packs it into file-lock-disjoint waves
//! by greedy first-fit.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{DomainError, DomainResult};
use crate::graph::{DependencyGraph, find_cycle_path};
use crate::tasks::TaskRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How the tasks of a wave are launched.
pub enum WaveStrategy {
    /// All tasks at once; requires pairwise-disjoint file locks.
    ParallelSwarm,
    /// Strictly in order, one task at a time.
    SequentialMerge,
}

impl WaveStrategy {
    /// Stable wire label (`PARALLEL_SWARM` / `SEQUENTIAL_MERGE`).
    pub fn as_str(self) -> &'static str {
        match self {
            WaveStrategy::ParallelSwarm => "PARALLEL_SWARM",
            WaveStrategy::SequentialMerge => "SEQUENTIAL_MERGE",
        }
    }

    /// Parse a wire label.
    pub fn from_str_label(s: &str) -> Option<Self> {
        match s {
            "PARALLEL_SWARM" => Some(WaveStrategy::ParallelSwarm),
            "SEQUENTIAL_MERGE" => Some(WaveStrategy::SequentialMerge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One planned wave: a batch of task ids plus execution strategy.
pub struct PlannedWave {
    /// Dense 1-based wave number.
    pub wave_id: u32,
    /// Launch strategy.
    pub strategy: WaveStrategy,
    /// Informational explanation of why the wave looks the way it does.
    pub rationale: String,
    /// Task ids in source order.
    pub tasks: Vec<String>,
    /// Whether a checkpoint must commit when the wave completes.
    pub checkpoint_after: bool,
}

/// Partition `tasks` into an ordered list of waves.
///
/// `tasks` is the plannable set (typically everything not yet complete) in
/// source order, and `graph` the dependency DAG built over exactly that set.
///
/// Invariants of the output:
/// - wave ids are dense, 1-based, in emission order;
/// - every task id appears in exactly one wave;
/// - every dependency of a task in wave N lives in some wave M < N;
/// - no two tasks of a PARALLEL_SWARM wave share a file lock.
pub fn plan_waves(
    tasks: &[TaskRecord],
    graph: &DependencyGraph,
) -> DomainResult<Vec<PlannedWave>> {
    let by_id: BTreeMap<&str, &TaskRecord> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut remaining_deps: BTreeMap<&str, usize> = tasks
        .iter()
        .map(|t| (t.id.as_str(), graph.in_degree(&t.id)))
        .collect();
    let mut placed: BTreeSet<&str> = BTreeSet::new();

    let mut waves: Vec<PlannedWave> = Vec::new();
    let mut next_wave_id: u32 = 1;

    while placed.len() < tasks.len() {
        // Ready set: zero remaining in-degree, in source order.
        let ready: Vec<&TaskRecord> = tasks
            .iter()
            .filter(|t| !placed.contains(t.id.as_str()))
            .filter(|t| remaining_deps.get(t.id.as_str()).copied() == Some(0))
            .collect();

        if ready.is_empty() {
            // Unreachable when the graph was cycle-checked, but never loop
            // forever on a bad graph.
            let stuck: Vec<(String, String)> = tasks
                .iter()
                .filter(|t| !placed.contains(t.id.as_str()))
                .flat_map(|t| {
                    graph
                        .deps_of(&t.id)
                        .map(|d| (t.id.clone(), d.to_string()))
                        .collect::<Vec<_>>()
                })
                .collect();
            let path = find_cycle_path(&stuck).unwrap_or_else(|| "unresolved".to_string());
            let participants = path.split(" -> ").map(str::to_string).collect();
            return Err(DomainError::DependencyCycle { participants, path });
        }

        // Greedy source-order first-fit into file-lock-disjoint subsets.
        let mut subsets: Vec<Vec<&TaskRecord>> = Vec::new();
        for &task in &ready {
            let slot = subsets.iter_mut().find(|subset| {
                subset
                    .iter()
                    .all(|other| task.file_locks.is_disjoint(&other.file_locks))
            });
            match slot {
                Some(subset) => subset.push(task),
                None => subsets.push(vec![task]),
            }
        }

        let conflicted = subsets.len() > 1;
        for subset in subsets {
            let strategy = choose_strategy(&subset, graph);
            let rationale = rationale_for(&subset, strategy, conflicted);
            waves.push(PlannedWave {
                wave_id: next_wave_id,
                strategy,
                rationale,
                tasks: subset.iter().map(|t| t.id.clone()).collect(),
                checkpoint_after: true,
            });
            next_wave_id += 1;
            for task in subset {
                placed.insert(task.id.as_str());
            }
        }

        // Unlock successors of everything placed this round.
        for (id, count) in remaining_deps.iter_mut() {
            if placed.contains(id) {
                continue;
            }
            let task = by_id[id];
            *count = graph
                .deps_of(&task.id)
                .filter(|d| !placed.contains(d))
                .count();
        }
    }

    Ok(waves)
}

/// Strategy rule: a single-task wave whose task sits downstream of other
/// planned work merges sequentially; everything else swarms in parallel.
fn choose_strategy(subset: &[&TaskRecord], graph: &DependencyGraph) -> WaveStrategy {
    if subset.len() == 1 && graph.is_downstream(&subset[0].id) {
        WaveStrategy::SequentialMerge
    } else {
        WaveStrategy::ParallelSwarm
    }
}

fn rationale_for(subset: &[&TaskRecord], strategy: WaveStrategy, conflicted: bool) -> String {
    match strategy {
        WaveStrategy::SequentialMerge => {
            let deps: Vec<&str> = subset[0].dependencies.iter().map(String::as_str).collect();
            if deps.is_empty() {
                "single task serialized behind earlier writers of its files".to_string()
            } else {
                format!("single task downstream of {}", deps.join(", "))
            }
        }
        WaveStrategy::ParallelSwarm => {
            if conflicted {
                format!(
                    "{} ready task(s) with disjoint file locks (conflicting peers deferred)",
                    subset.len()
                )
            } else {
                format!("{} ready task(s) with disjoint file locks", subset.len())
            }
        }
    }
}
