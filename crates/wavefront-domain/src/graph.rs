//! Dependency analysis: explicit references plus file-lock conflicts.
//!
//! The graph is a derived, throwaway structure: it is built from the flat
//! task records, consumed by the planner, and never persisted. Relationships
//! stay flat id strings; nothing here holds live references between tasks.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{DomainError, DomainResult};
use crate::tasks::TaskRecord;

#[derive(Debug, Clone, Default)]
/// The dependency DAG over a set of task records.
pub struct DependencyGraph {
    /// task id -> ids it depends on (must complete first).
    deps: BTreeMap<String, BTreeSet<String>>,
    /// task id -> ids that depend on it.
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Dependencies of `id` (empty set when unknown).
    pub fn deps_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.deps.get(id).into_iter().flatten().map(String::as_str)
    }

    /// Tasks that depend on `id`.
    pub fn dependents_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Number of dependencies `id` has.
    pub fn in_degree(&self, id: &str) -> usize {
        self.deps.get(id).map_or(0, BTreeSet::len)
    }

    /// Return `true` when `id` depends on at least one other task.
    pub fn is_downstream(&self, id: &str) -> bool {
        self.in_degree(id) > 0
    }
}

/// Build the dependency graph for `tasks`.
///
/// Two edge sources are combined:
/// - explicit textual references carried on the records, and
/// - implicit file-lock conflicts: when an earlier task and a later task
///   share a file lock, the later one depends on the earlier one. This keeps
///   conflict resolution order-stable with respect to the author's list.
///
/// Edges referencing ids outside `tasks` are ignored (the caller has already
/// validated references against the full list; tasks filtered out here are
/// complete and their dependencies count as satisfied). Self-dependencies
/// are dropped silently. A cycle is an error naming every participant.
pub fn build_graph(tasks: &[TaskRecord]) -> DomainResult<DependencyGraph> {
    let ids: BTreeSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    let mut graph = DependencyGraph::default();
    for task in tasks {
        graph.deps.entry(task.id.clone()).or_default();
        graph.dependents.entry(task.id.clone()).or_default();
    }

    let add_edge = |from: &str, to: &str, graph: &mut DependencyGraph| {
        // `from` depends on `to`.
        if from == to || !ids.contains(to) {
            return;
        }
        if let Some(deps) = graph.deps.get_mut(from) {
            deps.insert(to.to_string());
        }
        if let Some(dependents) = graph.dependents.get_mut(to) {
            dependents.insert(from.to_string());
        }
    };

    for task in tasks {
        for dep in &task.dependencies {
            add_edge(&task.id, dep, &mut graph);
        }
    }

    for (earlier_idx, earlier) in tasks.iter().enumerate() {
        for later in &tasks[earlier_idx + 1..] {
            if earlier.file_locks.intersection(&later.file_locks).count() > 0 {
                add_edge(&later.id, &earlier.id, &mut graph);
            }
        }
    }

    if let Some(path) = find_cycle_path(&edge_list(&graph)) {
        let participants: Vec<String> = {
            let mut seen = Vec::new();
            for part in path.split(" -> ") {
                if !seen.contains(&part.to_string()) {
                    seen.push(part.to_string());
                }
            }
            seen
        };
        return Err(DomainError::DependencyCycle { participants, path });
    }

    Ok(graph)
}

fn edge_list(graph: &DependencyGraph) -> Vec<(String, String)> {
    let mut edges = Vec::new();
    for (from, deps) in &graph.deps {
        for to in deps {
            edges.push((from.clone(), to.clone()));
        }
    }
    edges
}

/// Find one cycle in a directed edge list, rendered as `a -> b -> a`.
///
/// Returns `None` for acyclic (or empty) input. When several cycles exist,
/// one of them is returned; which one is unspecified but deterministic.
pub fn find_cycle_path(edges: &[(String, String)]) -> Option<String> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (from, to) in edges {
        adjacency.entry(from.as_str()).or_default().push(to.as_str());
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<String> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut path: Vec<&str> = stack[start..].to_vec();
                path.push(node);
                return Some(path.join(" -> "));
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        if let Some(nexts) = adjacency.get(node) {
            for next in nexts {
                if let Some(found) = visit(next, adjacency, marks, stack) {
                    return Some(found);
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let roots: Vec<&str> = adjacency.keys().copied().collect();
    for root in roots {
        if let Some(found) = visit(root, &adjacency, &mut marks, &mut stack) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::parse_task_list;

    fn graph_for(src: &str) -> DomainResult<DependencyGraph> {
        let parsed = parse_task_list(src).unwrap();
        build_graph(&parsed.tasks)
    }

    #[test]
    fn explicit_and_implicit_edges_combine() {
        let graph = graph_for(
            "\
- [ ] TASK-001: Add login in `auth.py`
- [ ] TASK-002: Update docs in `README.md`
- [ ] TASK-003: Refactor `auth.py` after TASK-001
",
        )
        .unwrap();

        let deps: Vec<_> = graph.deps_of("TASK-003").collect();
        assert_eq!(deps, vec!["TASK-001"]);
        assert_eq!(graph.in_degree("TASK-002"), 0);
        let dependents: Vec<_> = graph.dependents_of("TASK-001").collect();
        assert_eq!(dependents, vec!["TASK-003"]);
    }

    #[test]
    fn file_lock_conflicts_follow_source_order() {
        let graph = graph_for(
            "\
- [ ] TASK-010: First writer of `shared.rs`
- [ ] TASK-020: Second writer of `shared.rs`
- [ ] TASK-030: Third writer of `shared.rs`
",
        )
        .unwrap();

        assert_eq!(graph.in_degree("TASK-010"), 0);
        let deps20: Vec<_> = graph.deps_of("TASK-020").collect();
        assert_eq!(deps20, vec!["TASK-010"]);
        let deps30: Vec<_> = graph.deps_of("TASK-030").collect();
        assert_eq!(deps30, vec!["TASK-010", "TASK-020"]);
    }

    #[test]
    fn cycle_is_an_error_listing_participants() {
        let err = graph_for(
            "\
- [ ] TASK-001: One after TASK-002
- [ ] TASK-002: Two after TASK-001
",
        )
        .unwrap_err();

        let DomainError::DependencyCycle { participants, path } = err else {
            panic!("expected cycle error");
        };
        assert!(participants.contains(&"TASK-001".to_string()));
        assert!(participants.contains(&"TASK-002".to_string()));
        assert!(path.contains(" -> "));
    }

    #[test]
    fn find_cycle_path_returns_none_for_acyclic_graph() {
        let edges = vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string()),
        ];
        assert!(find_cycle_path(&edges).is_none());
    }

    #[test]
    fn find_cycle_path_detects_self_loop() {
        let edges = vec![("a".to_string(), "a".to_string())];
        let path = find_cycle_path(&edges).unwrap();
        assert!(path.contains('a'));
    }

    #[test]
    fn find_cycle_path_handles_diamond_without_cycle() {
        let edges = vec![
            ("a".to_string(), "b".to_string()),
            ("a".to_string(), "c".to_string()),
            ("b".to_string(), "d".to_string()),
            ("c".to_string(), "d".to_string()),
        ];
        assert!(find_cycle_path(&edges).is_none());
    }

    #[test]
    fn edges_to_excluded_tasks_are_ignored() {
        // TASK-002's dependency on TASK-001 disappears when TASK-001 is
        // filtered out of the planned set (already complete).
        let parsed = parse_task_list(
            "\
- [x] TASK-001: Done work on `auth.py`
- [ ] TASK-002: Follow-up after TASK-001
",
        )
        .unwrap();
        let open: Vec<_> = parsed
            .tasks
            .iter()
            .filter(|t| t.status != crate::tasks::TaskStatus::Complete)
            .cloned()
            .collect();
        let graph = build_graph(&open).unwrap();
        assert_eq!(graph.in_degree("TASK-002"), 0);
    }
}
