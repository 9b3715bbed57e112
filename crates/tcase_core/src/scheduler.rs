//! Walks a finished scope tree and dispatches its tests onto a controller.

use crate::config::{ResolvedConfig, ENV_SEED};
use crate::context::Enclosing;
use crate::controller::Controller;
use crate::hooks::{execute_leaf, LeafPlan};
use crate::ordering::{discriminate, OrderingKind};
use crate::scope::{Entry, ScopeNode};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// What a suite run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Ordering seed of the run.
    pub seed: u64,
    /// Ordering strategy of the run.
    pub ordering: OrderingKind,
    /// Whether the seed was generated for this run.
    pub seed_generated: bool,
    /// Tests handed to the controller.
    pub scheduled: usize,
}

struct RunState {
    root: Arc<ScopeNode>,
    config: ResolvedConfig,
    enclosing: Arc<Enclosing>,
    scheduled: AtomicUsize,
}

pub(crate) fn run_suite(
    ctrl: &dyn Controller,
    root: &Arc<ScopeNode>,
    config: ResolvedConfig,
    enclosing: Enclosing,
) -> RunSummary {
    info!(
        suite = %root.description,
        seed = config.seed,
        ordering = %config.ordering,
        generated = config.seed_generated,
        "running suite"
    );
    if config.seed_generated {
        ctrl.log(&format!("{}={}", ENV_SEED, config.seed));
    }

    let state = Arc::new(RunState {
        root: Arc::clone(root),
        config,
        enclosing: Arc::new(enclosing),
        scheduled: AtomicUsize::new(0),
    });
    run_scope(ctrl, &state, &[], &[root.description.clone()]);

    RunSummary {
        seed: config.seed,
        ordering: config.ordering,
        seed_generated: config.seed_generated,
        scheduled: state.scheduled.load(Ordering::SeqCst),
    }
}

/// Test names in visiting order, without running anything.
pub(crate) fn plan(root: &ScopeNode, config: &ResolvedConfig) -> Vec<String> {
    let mut out = Vec::new();
    plan_scope(root, config, &[root.description.clone()], &mut out);
    out
}

fn plan_scope(node: &ScopeNode, config: &ResolvedConfig, names: &[String], out: &mut Vec<String>) {
    let mut siblings = sibling_names(node);
    for index in config.ordering.order(node.entries.len(), config.seed, names) {
        let names = extend(names, std::mem::take(&mut siblings[index]));
        match &node.entries[index] {
            Entry::Scope(child) => plan_scope(child, config, &names, out),
            Entry::Leaf(_) => out.push(names.join("/")),
        }
    }
}

fn run_scope(ctrl: &dyn Controller, state: &Arc<RunState>, path: &[usize], names: &[String]) {
    let Some(node) = state.root.descend(path) else {
        let _ = ctrl.fatal("scope not found in suite");
        return;
    };
    let order = state
        .config
        .ordering
        .order(node.entries.len(), state.config.seed, names);
    let mut siblings = sibling_names(node);

    for index in order {
        let mut child_path = path.to_vec();
        child_path.push(index);

        match &node.entries[index] {
            Entry::Scope(_) => {
                let name = std::mem::take(&mut siblings[index]);
                if !has_runnable_tests(ctrl, &state.root, &child_path) {
                    debug!(unit = %name, "scope has no tests to run");
                    continue;
                }
                let child_names = extend(names, name.clone());
                let state = Arc::clone(state);
                ctrl.run(
                    &name,
                    Box::new(move |c| run_scope(c, &state, &child_path, &child_names)),
                );
            }
            Entry::Leaf(_) => {
                let name = std::mem::take(&mut siblings[index]);
                if ctrl.is_benchmark() {
                    let excluded = LeafPlan::locate(&state.root, &child_path)
                        .map_or(false, |plan| plan.excluded_from_benchmark());
                    if excluded {
                        debug!(unit = %name, "left out of benchmark run");
                        continue;
                    }
                }
                let leaf_names = extend(names, name.clone());
                state.scheduled.fetch_add(1, Ordering::SeqCst);
                let state = Arc::clone(state);
                ctrl.run(
                    &name,
                    Box::new(move |c| run_leaf(c, &state, &child_path, &leaf_names)),
                );
            }
        }
    }
}

/// Whether any test below the scope at `path` gets dispatched on `ctrl`.
fn has_runnable_tests(ctrl: &dyn Controller, root: &ScopeNode, path: &[usize]) -> bool {
    let Some(node) = root.descend(path) else {
        return false;
    };
    node.entries.iter().enumerate().any(|(index, entry)| {
        let mut entry_path = path.to_vec();
        entry_path.push(index);
        match entry {
            Entry::Scope(_) => has_runnable_tests(ctrl, root, &entry_path),
            Entry::Leaf(_) if ctrl.is_benchmark() => LeafPlan::locate(root, &entry_path)
                .map_or(false, |plan| !plan.excluded_from_benchmark()),
            Entry::Leaf(_) => true,
        }
    })
}

fn run_leaf(ctrl: &dyn Controller, state: &RunState, path: &[usize], names: &[String]) {
    let Some(plan) = LeafPlan::locate(&state.root, path) else {
        let _ = ctrl.fatal("test not found in suite");
        return;
    };

    if plan.is_parallel() {
        if let Err(e) = ctrl.declare_concurrent() {
            let _ = ctrl.fatal(&e.to_string());
            return;
        }
    }

    let seed = discriminate(state.config.seed, "leaf", names);
    let attempt = |c: &dyn Controller| {
        execute_leaf(c, &plan, seed, state.config, &state.enclosing)
    };
    let outcome = match plan.flaky() {
        Some(retry) => retry.assert(ctrl, attempt),
        None => attempt(ctrl),
    };
    debug!(unit = ctrl.name(), ?outcome, "test finished");
}

/// Unit names of `node`'s entries in declaration order.
///
/// Empty descriptions are named after their index, and repeated names get a `#NN` suffix so
/// every sibling has its own report path and random seed.
fn sibling_names(node: &ScopeNode) -> Vec<String> {
    let mut taken = HashSet::new();
    node.entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let description = match entry {
                Entry::Scope(child) => child.description.as_str(),
                Entry::Leaf(case) => case.description.as_str(),
            };
            let base = if description.is_empty() {
                format!("#{:02}", index)
            } else {
                description.to_string()
            };
            let mut name = base.clone();
            let mut repeat = 0;
            while !taken.insert(name.clone()) {
                repeat += 1;
                name = format!("{}#{:02}", base, repeat);
            }
            name
        })
        .collect()
}

fn extend(names: &[String], name: String) -> Vec<String> {
    let mut out = names.to_vec();
    out.push(name);
    out
}
