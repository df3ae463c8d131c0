use serde::{Deserialize, Serialize};

/// A directed, weighted, possibly recurrent connection between two nodes,
/// stamped with the innovation number of the mutation that introduced it.
/// `mutation_num` trails the weight through weight mutation and feeds the
/// compatibility distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
    pub recurrent: bool,
    /// 0 when no trait is assigned
    pub trait_id: usize,
    pub innovation: i64,
    pub mutation_num: f64,
    pub enabled: bool,
}

impl Gene {
    pub fn new(from: usize, to: usize, weight: f64, recurrent: bool, innovation: i64) -> Self {
        Self {
            from,
            to,
            weight,
            recurrent,
            trait_id: 0,
            innovation,
            mutation_num: weight,
            enabled: true,
        }
    }

    /// Copy carrying new endpoints and trait; everything else is inherited.
    pub fn copy_with_endpoints_and_trait(&self, from: usize, to: usize, trait_id: usize) -> Self {
        Self {
            from,
            to,
            trait_id,
            ..self.clone()
        }
    }

    /// Two genes describe the same piece of topology when their endpoints and
    /// recurrence match; weight and bookkeeping are ignored.
    pub fn genetically_eq(&self, other: &Gene) -> bool {
        self.from == other.from && self.to == other.to && self.recurrent == other.recurrent
    }
}
