//! Dependency graph over convoy tasks.
//!
//! Builds a task-name → dependency-names map from each task's `depends`
//! note, detects cycles with a depth-first search, and computes the ready
//! and blocked sets the scheduler and trigger work from.
//!
//! A dependency that names no known task is treated as unmet: the
//! depending task stays pending forever rather than erroring. That is a
//! defensive default; `unresolved_dependencies` surfaces such references
//! so callers can warn.

use crate::plan::{Task, TaskStatus};
use std::collections::{HashMap, HashSet};

/// Build the dependency graph for a set of tasks.
///
/// Keys and edges are normalized (lowercase) task names. Every task gets
/// an entry, even with no dependencies.
pub fn build(tasks: &[&Task]) -> HashMap<String, Vec<String>> {
    let mut graph = HashMap::with_capacity(tasks.len());
    for task in tasks {
        graph.insert(task.name.clone(), task.dependencies());
    }
    graph
}

/// Detect a cycle in a dependency graph, returning the path that closed
/// it, or `None` for an acyclic graph.
///
/// Classic DFS cycle detection: a visited set for nodes fully explored
/// and an on-stack set for the current path; any edge back into the
/// on-stack set reports a cycle.
pub fn find_cycle(graph: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut path = Vec::new();

    // Deterministic iteration order keeps the reported path stable.
    let mut nodes: Vec<&String> = graph.keys().collect();
    nodes.sort();

    for node in nodes {
        if dfs_cycle(node, graph, &mut visited, &mut on_stack, &mut path) {
            return Some(path);
        }
    }

    None
}

/// Whether a dependency graph contains a cycle.
pub fn has_cycle(graph: &HashMap<String, Vec<String>>) -> bool {
    find_cycle(graph).is_some()
}

fn dfs_cycle(
    node: &str,
    graph: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    on_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    if on_stack.contains(node) {
        path.push(node.to_string());
        return true;
    }

    if visited.contains(node) {
        return false;
    }

    visited.insert(node.to_string());
    on_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            if dfs_cycle(dep, graph, visited, on_stack, path) {
                return true;
            }
        }
    }

    on_stack.remove(node);
    path.pop();
    false
}

/// The ready set: every Pending task whose dependencies are all Completed.
///
/// A task with zero dependencies is trivially ready. A dependency naming
/// no known task is unmet, so the depending task never becomes ready.
/// Order follows the input order (the plan's stable enumeration order).
pub fn ready_set<'a>(tasks: &[&'a Task]) -> Vec<&'a Task> {
    let completed: HashSet<&str> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.name.as_str())
        .collect();

    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| {
            t.dependencies()
                .iter()
                .all(|dep| completed.contains(dep.as_str()))
        })
        .copied()
        .collect()
}

/// The blocked set: Pending tasks that directly depend on a task
/// currently in Blocked status.
///
/// Diagnostics only: ready-set membership depends solely on
/// Completed-ness, never on this.
pub fn blocked_set<'a>(tasks: &[&'a Task]) -> Vec<&'a Task> {
    let blocked: HashSet<&str> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Blocked)
        .map(|t| t.name.as_str())
        .collect();

    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| {
            t.dependencies()
                .iter()
                .any(|dep| blocked.contains(dep.as_str()))
        })
        .copied()
        .collect()
}

/// Dependency references that resolve to no known task.
///
/// Returns `(task_name, missing_dependency)` pairs. Such a task is
/// permanently starved of readiness; callers should warn.
pub fn unresolved_dependencies(tasks: &[&Task]) -> Vec<(String, String)> {
    let known: HashSet<&str> = tasks.iter().map(|t| t.name.as_str()).collect();

    let mut missing = Vec::new();
    for task in tasks {
        for dep in task.dependencies() {
            if !known.contains(dep.as_str()) {
                missing.push((task.name.clone(), dep));
            }
        }
    }
    missing
}
