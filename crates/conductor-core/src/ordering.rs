//! Task dependency ordering.
//!
//! `order_tasks_by_dependency` turns a flat list of task events with
//! free-text "blocked by" references into a stable display order: what is
//! actively running first, then what is unblocked-and-next in dependency
//! order, then finished work. The function is total: cycles, dangling
//! references, and unparseable dependency strings degrade gracefully and
//! never drop a task or panic.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

/// One task event row. Multiple rows may share a `task_id` (event
/// history); ordering dedupes to the first occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub subject: String,
    /// Free-text lifecycle status as recorded by the worker.
    pub status: String,
    /// Raw dependency reference: a JSON array of ids, a comma-separated id
    /// list, or an opaque human-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Status buckets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Running,
    Waiting,
    Completed,
}

fn bucket(status: &str) -> Bucket {
    match status.to_ascii_lowercase().as_str() {
        "in_progress" | "executing" | "active" | "reviewing" | "running" => Bucket::Running,
        "completed" | "complete" | "done" => Bucket::Completed,
        _ => Bucket::Waiting,
    }
}

// ---------------------------------------------------------------------------
// blocked_by parsing
// ---------------------------------------------------------------------------

fn id_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"))
}

/// Parse a raw `blocked_by` string into dependency task ids.
///
/// JSON array first (numbers coerced to strings), then comma-split
/// tokenization accepted only when every token looks like an id. `None`
/// means the string is an opaque display reason: no edges are derived.
pub fn parse_blocked_by(raw: &str) -> Option<Vec<String>> {
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            match item {
                serde_json::Value::String(s) => ids.push(s),
                serde_json::Value::Number(n) => ids.push(n.to_string()),
                _ => return None,
            }
        }
        return Some(ids);
    }

    let tokens: Vec<&str> = raw.split(',').map(str::trim).collect();
    if !tokens.is_empty() && tokens.iter().all(|t| id_token_re().is_match(t)) {
        return Some(tokens.iter().map(|t| t.to_string()).collect());
    }

    None
}

// ---------------------------------------------------------------------------
// Comparator
// ---------------------------------------------------------------------------

/// Deterministic tie-break: numeric when both ids are pure integers, else
/// lexical, else original insertion index.
fn compare_ids(a: &str, ai: usize, b: &str, bi: usize) -> Ordering {
    let by_id = match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    };
    by_id.then(ai.cmp(&bi))
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Order tasks for display: running (oldest first), then not-yet-started in
/// dependency order, then completed (oldest first).
///
/// Pure and terminating for any input. Nodes on a dependency cycle are
/// appended after the topological walk in comparator order rather than
/// dropped.
pub fn order_tasks_by_dependency(tasks: &[TaskEvent]) -> Vec<TaskEvent> {
    // 1. Dedup to first occurrence, keeping the insertion index as the
    //    final tie-break key.
    let mut seen: HashMap<&str, ()> = HashMap::new();
    let mut deduped: Vec<(usize, &TaskEvent)> = Vec::new();
    for (idx, task) in tasks.iter().enumerate() {
        if seen.insert(task.task_id.as_str(), ()).is_none() {
            deduped.push((idx, task));
        }
    }

    // 2. Partition by lifecycle bucket.
    let mut running: Vec<(usize, &TaskEvent)> = Vec::new();
    let mut waiting: Vec<(usize, &TaskEvent)> = Vec::new();
    let mut completed: Vec<(usize, &TaskEvent)> = Vec::new();
    for (idx, task) in deduped {
        match bucket(&task.status) {
            Bucket::Running => running.push((idx, task)),
            Bucket::Waiting => waiting.push((idx, task)),
            Bucket::Completed => completed.push((idx, task)),
        }
    }

    // 3–5. Topological sort over the waiting bucket only.
    let ordered_waiting = topo_sort(&waiting);

    // 7. Assemble: running and completed sort by recorded_at, then the
    //    id comparator.
    let by_recorded_at = |a: &(usize, &TaskEvent), b: &(usize, &TaskEvent)| {
        a.1.recorded_at
            .cmp(&b.1.recorded_at)
            .then_with(|| compare_ids(&a.1.task_id, a.0, &b.1.task_id, b.0))
    };
    running.sort_by(by_recorded_at);
    completed.sort_by(by_recorded_at);

    running
        .into_iter()
        .map(|(_, t)| t.clone())
        .chain(ordered_waiting.into_iter().cloned())
        .chain(completed.into_iter().map(|(_, t)| t.clone()))
        .collect()
}

/// Kahn's algorithm with a comparator-sorted ready list. Unreached nodes
/// (cycles) are appended at the end in comparator order.
fn topo_sort<'a>(waiting: &[(usize, &'a TaskEvent)]) -> Vec<&'a TaskEvent> {
    // Arena: position in `waiting` is the node handle.
    let id_to_pos: HashMap<&str, usize> = waiting
        .iter()
        .enumerate()
        .map(|(pos, (_, t))| (t.task_id.as_str(), pos))
        .collect();

    let mut in_degree = vec![0usize; waiting.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); waiting.len()];
    for (pos, (_, task)) in waiting.iter().enumerate() {
        let Some(raw) = task.blocked_by.as_deref() else {
            continue;
        };
        let Some(deps) = parse_blocked_by(raw) else {
            // Opaque display reason: no edges.
            continue;
        };
        for dep in deps {
            match id_to_pos.get(dep.as_str()) {
                // Self-references and ids outside this bucket are dropped.
                Some(&dep_pos) if dep_pos != pos => {
                    dependents[dep_pos].push(pos);
                    in_degree[pos] += 1;
                }
                _ => {}
            }
        }
    }

    let rank = |&pos: &usize| (waiting[pos].1.task_id.as_str(), waiting[pos].0);
    let cmp_pos = |a: &usize, b: &usize| {
        let (aid, ai) = rank(a);
        let (bid, bi) = rank(b);
        compare_ids(aid, ai, bid, bi)
    };

    let mut ready: Vec<usize> = (0..waiting.len()).filter(|&p| in_degree[p] == 0).collect();
    ready.sort_by(cmp_pos);

    let mut output: Vec<usize> = Vec::with_capacity(waiting.len());
    let mut visited = vec![false; waiting.len()];
    while !ready.is_empty() {
        let pos = ready.remove(0);
        visited[pos] = true;
        output.push(pos);
        for &dep_pos in &dependents[pos] {
            in_degree[dep_pos] -= 1;
            if in_degree[dep_pos] == 0 {
                ready.push(dep_pos);
                ready.sort_by(cmp_pos);
            }
        }
    }

    // 6. Cycle fallback: anything the walk never reached is appended in
    //    comparator order. No task is dropped.
    let mut unreached: Vec<usize> = (0..waiting.len()).filter(|&p| !visited[p]).collect();
    unreached.sort_by(cmp_pos);
    output.extend(unreached);

    output.into_iter().map(|pos| waiting[pos].1).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
