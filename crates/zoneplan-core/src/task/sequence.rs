//! Placement order of tasks.
//!
//! Rules, strongest first:
//! 1. a task waits until all of its dependencies are ordered (or already placed);
//! 2. inside a group, lower `sequence` goes first;
//! 3. across groups, the group holding the earliest due date among its
//!    remaining tasks goes first; groups without any due date go last.
//!
//! A group is as urgent as its most urgent remaining task, so an undated head
//! still goes early when a later task of its group is due soon. Ties fall
//! back to group name, then task id, so the order is total.

use std::collections::{BTreeMap, HashSet};

use super::Task;

/// Result of ordering a task list.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOrder<'t> {
    /// Tasks in placement order
    pub ordered: Vec<&'t Task>,
    /// Tasks whose dependencies can never be met, with the missing ids
    pub unresolved: Vec<(&'t Task, Vec<String>)>,
}

/// Order `tasks` for placement.
///
/// `placed` holds ids of tasks that already own placements; they count as
/// satisfied dependencies but are not part of the output.
pub fn resolve_order<'t>(tasks: &[&'t Task], placed: &HashSet<String>) -> ResolvedOrder<'t> {
    let mut groups: BTreeMap<&str, Vec<&'t Task>> = BTreeMap::new();
    for &task in tasks {
        groups.entry(task.group.as_str()).or_default().push(task);
    }
    for queue in groups.values_mut() {
        queue.sort_by(|a, b| (a.sequence, &a.id).cmp(&(b.sequence, &b.id)));
    }

    let mut done: HashSet<&str> = placed.iter().map(String::as_str).collect();
    let mut ordered = Vec::with_capacity(tasks.len());

    loop {
        // First task of each group whose dependencies are all met.
        let next = groups
            .iter()
            .filter_map(|(group, queue)| {
                let due = queue.iter().filter_map(|t| t.due).min();
                queue
                    .iter()
                    .position(|t| t.dependencies.iter().all(|d| done.contains(d.as_str())))
                    .map(|pos| (*group, due, pos, queue[pos]))
            })
            .min_by(|(ga, da, _, a), (gb, db, _, b)| {
                (da.is_none(), da, ga, a.sequence, &a.id).cmp(&(db.is_none(), db, gb, b.sequence, &b.id))
            })
            .map(|(group, _, pos, _)| (group, pos));

        let Some((group, pos)) = next else { break };
        if let Some(queue) = groups.get_mut(group) {
            let task = queue.remove(pos);
            done.insert(task.id.as_str());
            ordered.push(task);
        }
    }

    let unresolved = groups
        .into_values()
        .flatten()
        .map(|task| {
            let pending = task
                .dependencies
                .iter()
                .filter(|d| !done.contains(d.as_str()))
                .cloned()
                .collect();
            (task, pending)
        })
        .collect();

    ResolvedOrder { ordered, unresolved }
}
