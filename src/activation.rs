//! The closed registry of node activations. Scalar kinds squash a single
//! pre-activation sum; module kinds fold the inputs of a MIMO control node
//! into one signal.

use crate::error::{Error, Result};
use core::f64::consts::E;
use serde::{Deserialize, Serialize};

/// Every activation a node may carry. The name<->kind mapping used by the
/// serialized formats is the serde variant name, see [Activation::name] and
/// [Activation::from_name].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    SigmoidSteepened,
    SigmoidPlain,
    SigmoidBipolar,
    Tanh,
    Gaussian,
    Linear,
    LinearClipped,
    LinearAbs,
    Sign,
    Sine,
    Step,
    Null,
    // module kinds
    Multiply,
    Max,
    Min,
}

pub const ALL_ACTIVATIONS: [Activation; 15] = [
    Activation::SigmoidSteepened,
    Activation::SigmoidPlain,
    Activation::SigmoidBipolar,
    Activation::Tanh,
    Activation::Gaussian,
    Activation::Linear,
    Activation::LinearClipped,
    Activation::LinearAbs,
    Activation::Sign,
    Activation::Sine,
    Activation::Step,
    Activation::Null,
    Activation::Multiply,
    Activation::Max,
    Activation::Min,
];

impl Activation {
    /// n->1 module kinds, as opposed to the 1->1 scalar kinds
    pub fn is_module(self) -> bool {
        matches!(self, Self::Multiply | Self::Max | Self::Min)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SigmoidSteepened => "SigmoidSteepened",
            Self::SigmoidPlain => "SigmoidPlain",
            Self::SigmoidBipolar => "SigmoidBipolar",
            Self::Tanh => "Tanh",
            Self::Gaussian => "Gaussian",
            Self::Linear => "Linear",
            Self::LinearClipped => "LinearClipped",
            Self::LinearAbs => "LinearAbs",
            Self::Sign => "Sign",
            Self::Sine => "Sine",
            Self::Step => "Step",
            Self::Null => "Null",
            Self::Multiply => "Multiply",
            Self::Max => "Max",
            Self::Min => "Min",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        ALL_ACTIVATIONS
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| Error::UnknownActivation(name.to_string()))
    }

    /// Squash a scalar. Module kinds pass through unchanged; they only make
    /// sense over a bundle of inputs.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::SigmoidSteepened => 1. / (1. + E.powf(-4.9 * x)),
            Self::SigmoidPlain => 1. / (1. + E.powf(-x)),
            Self::SigmoidBipolar => 2. / (1. + E.powf(-4.9 * x)) - 1.,
            Self::Tanh => x.tanh(),
            Self::Gaussian => E.powf(-x * x),
            Self::Linear => x,
            Self::LinearClipped => x.clamp(-1., 1.),
            Self::LinearAbs => x.abs(),
            Self::Sign => {
                if x < 0. {
                    -1.
                } else {
                    1.
                }
            }
            Self::Sine => x.sin(),
            Self::Step => {
                if x < 0. {
                    0.
                } else {
                    1.
                }
            }
            Self::Null => 0.,
            Self::Multiply | Self::Max | Self::Min => x,
        }
    }

    /// Fold a module node's input bundle into one signal. Scalar kinds squash
    /// the sum of the bundle.
    pub fn apply_module(self, inputs: &[f64]) -> f64 {
        match self {
            Self::Multiply => inputs.iter().product(),
            Self::Max => inputs.iter().copied().fold(f64::MIN, f64::max),
            Self::Min => inputs.iter().copied().fold(f64::MAX, f64::min),
            scalar => scalar.apply(inputs.iter().sum()),
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Self::SigmoidSteepened
    }
}
