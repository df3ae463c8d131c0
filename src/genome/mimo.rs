use crate::genome::node::Node;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A modular control gene: one module node (carrying a module activation)
/// bundled with eager copies of the IO nodes it reads from and drives. The
/// copies let crossover graft a whole module into a child even when the child
/// has only inherited part of its neighborhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MimoControlGene {
    pub node: Node,
    pub inputs: Vec<Node>,
    pub outputs: Vec<Node>,
    pub innovation: i64,
    pub mutation_num: f64,
    pub enabled: bool,
}

impl MimoControlGene {
    pub fn new(node: Node, inputs: Vec<Node>, outputs: Vec<Node>, innovation: i64) -> Self {
        Self {
            node,
            inputs,
            outputs,
            innovation,
            mutation_num: 0.,
            enabled: true,
        }
    }

    /// True when any IO node of this module appears in the given id set.
    pub fn has_intersection(&self, node_ids: &HashSet<usize>) -> bool {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .any(|n| node_ids.contains(&n.id))
    }

    pub fn io_nodes(&self) -> impl Iterator<Item = &Node> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}
