//! Dependency graph over a plan's operations.
//!
//! Builds forward/reverse edges from the declared `depends_on` lists and
//! validates graph shape at registration time: unknown dependencies and
//! cycles are configuration errors, rejected before anything launches.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::PlanError;
use crate::plan::Operation;

/// Index into the operation list.
pub type OpIndex = usize;

/// A validated directed acyclic graph of operations.
#[derive(Debug)]
pub struct OperationGraph {
    operations: Vec<Operation>,
    index_map: HashMap<String, OpIndex>,
    /// index -> operations that depend on it
    forward_edges: Vec<Vec<OpIndex>>,
    /// index -> operations it depends on
    reverse_edges: Vec<Vec<OpIndex>>,
    /// Stable topological order (FIFO among ties), computed at build time
    topo_order: Vec<OpIndex>,
}

impl OperationGraph {
    /// Build and validate a graph from a plan's operations.
    pub fn build(operations: Vec<Operation>) -> Result<Self, PlanError> {
        let mut index_map = HashMap::new();
        for (i, op) in operations.iter().enumerate() {
            if index_map.insert(op.id.clone(), i).is_some() {
                return Err(PlanError::DuplicateId { id: op.id.clone() });
            }
        }

        let mut forward_edges: Vec<Vec<OpIndex>> = vec![Vec::new(); operations.len()];
        let mut reverse_edges: Vec<Vec<OpIndex>> = vec![Vec::new(); operations.len()];

        for (to_idx, op) in operations.iter().enumerate() {
            for dep in &op.depends_on {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| PlanError::UnknownDependency {
                            operation: op.id.clone(),
                            dependency: dep.clone(),
                        })?;
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let topo_order = Self::topological_order(&operations, &forward_edges, &reverse_edges)?;

        Ok(Self {
            operations,
            index_map,
            forward_edges,
            reverse_edges,
            topo_order,
        })
    }

    /// Kahn's algorithm with a FIFO queue, so ties resolve in declaration
    /// order. Doubles as the cycle check.
    fn topological_order(
        operations: &[Operation],
        forward_edges: &[Vec<OpIndex>],
        reverse_edges: &[Vec<OpIndex>],
    ) -> Result<Vec<OpIndex>, PlanError> {
        let mut in_degree: Vec<usize> = reverse_edges.iter().map(Vec::len).collect();

        let mut queue: VecDeque<OpIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(operations.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &dependent in &forward_edges[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != operations.len() {
            let cycle_ops: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .map(|(i, _)| operations[i].id.clone())
                .collect();
            return Err(PlanError::Cycle(cycle_ops));
        }

        Ok(order)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn get(&self, index: OpIndex) -> Option<&Operation> {
        self.operations.get(index)
    }

    pub fn index_of(&self, id: &str) -> Option<OpIndex> {
        self.index_map.get(id).copied()
    }

    /// Operations that depend on the given operation.
    pub fn dependents(&self, index: OpIndex) -> &[OpIndex] {
        self.forward_edges.get(index).map_or(&[], Vec::as_slice)
    }

    /// Operations the given operation depends on.
    pub fn dependencies(&self, index: OpIndex) -> &[OpIndex] {
        self.reverse_edges.get(index).map_or(&[], Vec::as_slice)
    }

    /// Whether every dependency of `index` is in `satisfied`.
    pub fn dependencies_satisfied(&self, index: OpIndex, satisfied: &HashSet<OpIndex>) -> bool {
        self.dependencies(index)
            .iter()
            .all(|dep| satisfied.contains(dep))
    }

    /// Stable topological order over all operations. This is the "dependency
    /// order" used for the aggregator's current-operation pointer.
    pub fn topo_order(&self) -> &[OpIndex] {
        &self.topo_order
    }

    /// Operations in topological order.
    pub fn operations_in_topo_order(&self) -> Vec<&Operation> {
        self.topo_order.iter().map(|&i| &self.operations[i]).collect()
    }
}
