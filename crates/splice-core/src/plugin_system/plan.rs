//! Turns a target stub into the flat, ordered list of load operations a worker
//! must apply before the target's functions become callable.
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::graph::DependencyGraph;
use crate::plugin_system::stub::{PluginId, PluginStub};

/// The three stages an artifact passes through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPhase {
    /// Module mapped into the process
    InMemory,
    /// Init entry point called with the dependency handles
    Inited,
    /// Import entry point called with the import handles
    Final,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadPhase::InMemory => "in-memory",
            LoadPhase::Inited => "inited",
            LoadPhase::Final => "final",
        };
        f.write_str(name)
    }
}

/// One state transition for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOperation {
    pub phase: LoadPhase,
    pub target: PathBuf,
    /// Artifacts whose instance handles are passed to the entry point, in ABI order
    pub requires: Vec<PathBuf>,
}

impl LoadOperation {
    pub fn new(phase: LoadPhase, target: impl Into<PathBuf>, requires: Vec<PathBuf>) -> Self {
        Self {
            phase,
            target: target.into(),
            requires,
        }
    }

    fn for_stub(phase: LoadPhase, stub: &PluginStub, requires: &[Arc<PluginStub>]) -> Self {
        Self::new(
            phase,
            stub.artifact.clone(),
            requires.iter().map(|r| r.artifact.clone()).collect(),
        )
    }
}

impl fmt::Display for LoadOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let requires: Vec<String> = self.requires.iter().map(|p| p.display().to_string()).collect();
        write!(f, "{}({}, [{}])", self.phase, self.target.display(), requires.join(", "))
    }
}

/// Deduplicated operations in the order a worker must apply them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadPlan {
    operations: Vec<LoadOperation>,
}

impl LoadPlan {
    /// Keeps the first occurrence of every `(phase, target)` pair, preserving order
    pub fn from_operations(operations: Vec<LoadOperation>) -> Self {
        let mut seen = HashSet::new();
        let operations = operations
            .into_iter()
            .filter(|op| seen.insert((op.phase, op.target.clone())))
            .collect();
        Self { operations }
    }

    pub fn operations(&self) -> &[LoadOperation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LoadOperation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Position of the operation for `target` at `phase`, if planned
    pub fn position(&self, phase: LoadPhase, target: &Path) -> Option<usize> {
        self.operations
            .iter()
            .position(|op| op.phase == phase && op.target == target)
    }

    pub fn into_operations(self) -> Vec<LoadOperation> {
        self.operations
    }
}

impl<'a> IntoIterator for &'a LoadPlan {
    type Item = &'a LoadOperation;
    type IntoIter = std::slice::Iter<'a, LoadOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Memo carried through the recursion
#[derive(Debug, Default)]
struct PlanState {
    /// Nodes a final-level build has been started for
    visited: HashSet<PluginId>,
    /// Nodes that already entered their own final step
    skip: HashSet<PluginId>,
    /// Nodes whose in-memory and inited operations (and their closure's) are already emitted
    inited: HashSet<PluginId>,
}

/// Builds [`LoadPlan`]s from a shared [`DependencyGraph`]
#[derive(Debug, Clone, Copy)]
pub struct LoadPlanBuilder<'g> {
    graph: &'g DependencyGraph,
}

impl<'g> LoadPlanBuilder<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self { graph }
    }

    /// Full plan for `target`, ending with its `final` operation
    pub fn build(&self, target: &PluginId) -> Result<LoadPlan, PluginSystemError> {
        self.build_until(target, LoadPhase::Final)
    }

    /// Plan for `target` that stops once it reaches `limit`
    pub fn build_until(&self, target: &PluginId, limit: LoadPhase) -> Result<LoadPlan, PluginSystemError> {
        let stub = self.graph.resolve(target)?;
        let mut state = PlanState::default();
        state.visited.insert(stub.id.clone());

        let mut operations = Vec::new();
        self.plan_node(stub, limit, &mut state, &mut operations)?;

        let plan = LoadPlan::from_operations(operations);
        log::debug!("Load plan for '{}' up to {}: {} operation(s)", target, limit, plan.len());
        Ok(plan)
    }

    fn plan_node(
        &self,
        stub: &Arc<PluginStub>,
        limit: LoadPhase,
        state: &mut PlanState,
        operations: &mut Vec<LoadOperation>,
    ) -> Result<(), PluginSystemError> {
        let closure = self.graph.depends_closure(&stub.id)?;

        if !state.inited.contains(&stub.id) {
            operations.push(LoadOperation::for_stub(LoadPhase::InMemory, stub, &[]));
            if limit == LoadPhase::InMemory {
                return Ok(());
            }

            for dep in &closure {
                self.plan_node(dep, LoadPhase::Inited, state, operations)?;
            }
            let direct = self.graph.direct_depends(&stub.id)?;
            operations.push(LoadOperation::for_stub(LoadPhase::Inited, stub, &direct));
            state.inited.insert(stub.id.clone());
        }

        if limit != LoadPhase::Final {
            return Ok(());
        }
        // Marked before descending so a cyclic import partner does not recurse back here
        if !state.skip.insert(stub.id.clone()) {
            return Ok(());
        }

        let imports = self.graph.imports_excluding_closure(&stub.id)?;
        for next in closure.iter().chain(imports.iter()) {
            if state.visited.insert(next.id.clone()) {
                self.plan_node(next, LoadPhase::Final, state, operations)?;
            }
        }
        operations.push(LoadOperation::for_stub(LoadPhase::Final, stub, &imports));
        Ok(())
    }
}
