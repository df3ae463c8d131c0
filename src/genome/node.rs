use crate::activation::Activation;
use serde::{Deserialize, Serialize};

/// What a node is for. The wire encoding of each role is fixed by
/// [code](NodeRole::code) and preserved across read/write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Hidden,
    Input,
    Output,
    Bias,
}

impl NodeRole {
    pub fn code(self) -> u8 {
        match self {
            Self::Hidden => 0,
            Self::Input => 1,
            Self::Output => 2,
            Self::Bias => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Hidden),
            1 => Some(Self::Input),
            2 => Some(Self::Output),
            3 => Some(Self::Bias),
            _ => None,
        }
    }

    /// Inputs and biases take signal from the world rather than from other
    /// nodes.
    pub fn is_sensor(self) -> bool {
        matches!(self, Self::Input | Self::Bias)
    }

    pub fn node_type(self) -> NodeType {
        if self.is_sensor() {
            NodeType::Sensor
        } else {
            NodeType::Neuron
        }
    }
}

/// The coarse sensor/neuron split used by the plain-text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Sensor,
    Neuron,
}

impl NodeType {
    pub fn code(self) -> u8 {
        match self {
            Self::Sensor => 0,
            Self::Neuron => 1,
        }
    }
}

/// A neuron as carried by the genome: no link lists here, those exist only on
/// the phenotype copy built during genesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: usize,
    pub role: NodeRole,
    pub activation: Activation,
    /// 0 when no trait is assigned, matching the wire format
    pub trait_id: usize,
}

impl Node {
    pub fn new(id: usize, role: NodeRole, activation: Activation) -> Self {
        Self {
            id,
            role,
            activation,
            trait_id: 0,
        }
    }

    pub fn with_trait(id: usize, role: NodeRole, activation: Activation, trait_id: usize) -> Self {
        Self {
            id,
            role,
            activation,
            trait_id,
        }
    }

    /// Deep copy with the trait reference swapped out.
    pub fn copy_with_trait(&self, trait_id: usize) -> Self {
        Self {
            trait_id,
            ..self.clone()
        }
    }
}
