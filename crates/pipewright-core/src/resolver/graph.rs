use daggy::Walker;
use daggy::{Dag, NodeIndex};
use petgraph::algo::toposort;
use std::collections::HashMap;

use crate::errors::ResolutionError;

/// Direct acyclic graph over input ids. Edge insertion is where cycles are
/// caught: `daggy` refuses an edge that would close a cycle, which aborts
/// the pass before any remote call is made.
#[derive(Debug, Clone)]
pub struct InputGraphContext {
    /// DAG keeping track of the dependencies between inputs.
    inputs_dag: Dag<String, u32, u32>,
    /// Lookup: retrieve the DAG node id of a given input id.
    node_lookup: HashMap<String, NodeIndex<u32>>,
    /// Synthetic root every input hangs off, so isolated inputs still sort.
    graph_root: NodeIndex<u32>,
}

impl InputGraphContext {
    pub fn new() -> Self {
        let mut inputs_dag = Dag::new();
        let graph_root = inputs_dag.add_node(String::new());
        Self { inputs_dag, node_lookup: HashMap::new(), graph_root }
    }

    pub fn index_input(&mut self, input_id: &str) {
        if self.node_lookup.contains_key(input_id) {
            return;
        }
        let (_, node_index) = self.inputs_dag.add_child(self.graph_root, 1, input_id.to_string());
        self.node_lookup.insert(input_id.to_string(), node_index);
    }

    /// Records that `dependent` needs `dependency` resolved first.
    pub fn add_dependency(
        &mut self,
        dependent: &str,
        dependency: &str,
    ) -> Result<(), ResolutionError> {
        let (Some(dependent_node), Some(dependency_node)) =
            (self.node_lookup.get(dependent), self.node_lookup.get(dependency))
        else {
            // Both ids were indexed before edges are added; a miss here is
            // an internal ordering bug surfaced as a cycle-free no-op.
            return Ok(());
        };
        self.inputs_dag.add_edge(*dependency_node, *dependent_node, 1).map_err(|_| {
            ResolutionError::Cycle {
                ids: vec![dependency.to_string(), dependent.to_string()],
            }
        })?;
        Ok(())
    }

    /// All input ids, topologically sorted: dependencies strictly before
    /// dependents, regardless of declaration order.
    pub fn sorted_inputs(&self) -> Vec<String> {
        toposort(&self.inputs_dag, None)
            .unwrap_or_default()
            .into_iter()
            .filter(|node| *node != self.graph_root)
            .filter_map(|node| self.inputs_dag.node_weight(node).cloned())
            .collect()
    }

    pub fn dependencies_of(&self, input_id: &str) -> Vec<String> {
        let Some(node) = self.node_lookup.get(input_id) else {
            return vec![];
        };
        self.inputs_dag
            .parents(*node)
            .iter(&self.inputs_dag)
            .filter(|(_, parent)| *parent != self.graph_root)
            .filter_map(|(_, parent)| self.inputs_dag.node_weight(parent).cloned())
            .collect()
    }
}
