//! The flat option set consumed by the engine. Field names serialize in
//! PascalCase so a parameter file maps onto the documented option names
//! one-to-one; parsing the file itself is the driver's job.

use crate::{
    activation::Activation,
    error::{Error, Result},
    random::pick_weighted,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Strategy for the gene-alignment walk behind compatibility scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenCompatMethod {
    /// forward walk with two cursors
    Linear,
    /// backward walk from the gene list tails
    Fast,
}

/// Which generation-turnover loop to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochExecutorKind {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Options {
    /// target number of organisms, held exactly across epochs
    pub pop_size: usize,
    /// largest genomic distance tolerated within one species
    pub compat_threshold: f64,
    pub disjoint_coeff: f64,
    pub excess_coeff: f64,
    pub mutdiff_coeff: f64,
    pub gen_compat_method: GenCompatMethod,

    /// generations a species may stagnate before its fitness is crushed
    pub drop_off_age: usize,
    /// fitness multiplier protecting species younger than 10 generations
    pub age_significance: f64,
    /// fraction of each species kept as parents
    pub survival_thresh: f64,

    pub mutate_only_prob: f64,
    pub mutate_random_trait_prob: f64,
    pub mutate_link_trait_prob: f64,
    pub mutate_node_trait_prob: f64,
    pub mutate_link_weights_prob: f64,
    pub mutate_toggle_enable_prob: f64,
    pub mutate_gene_reenable_prob: f64,
    pub mutate_add_node_prob: f64,
    pub mutate_add_link_prob: f64,
    pub mutate_connect_sensors: f64,

    pub mate_multipoint_prob: f64,
    pub mate_multipoint_avg_prob: f64,
    pub mate_singlepoint_prob: f64,
    pub mate_only_prob: f64,
    pub interspecies_mate_rate: f64,

    pub recur_only_prob: f64,
    pub new_link_tries: usize,
    pub weight_mut_power: f64,
    pub trait_mutation_power: f64,
    pub trait_param_mut_prob: f64,

    /// expected offspring re-routed to champions each epoch; 0 disables
    pub babies_stolen: usize,

    /// sampling distribution for the activation of freshly split nodes;
    /// parallel arrays
    pub node_activators: Vec<Activation>,
    pub node_activators_prob: Vec<f64>,

    pub epoch_executor_type: EpochExecutorKind,

    /// driver parameters, recognized but not consumed here
    pub num_generations: usize,
    pub num_runs: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pop_size: 200,
            compat_threshold: 3.0,
            disjoint_coeff: 1.0,
            excess_coeff: 1.0,
            mutdiff_coeff: 0.4,
            gen_compat_method: GenCompatMethod::Fast,
            drop_off_age: 15,
            age_significance: 1.0,
            survival_thresh: 0.2,
            mutate_only_prob: 0.25,
            mutate_random_trait_prob: 0.1,
            mutate_link_trait_prob: 0.1,
            mutate_node_trait_prob: 0.1,
            mutate_link_weights_prob: 0.9,
            mutate_toggle_enable_prob: 0.0,
            mutate_gene_reenable_prob: 0.0,
            mutate_add_node_prob: 0.03,
            mutate_add_link_prob: 0.08,
            mutate_connect_sensors: 0.0,
            mate_multipoint_prob: 0.3,
            mate_multipoint_avg_prob: 0.3,
            mate_singlepoint_prob: 0.3,
            mate_only_prob: 0.2,
            interspecies_mate_rate: 0.001,
            recur_only_prob: 0.0,
            new_link_tries: 20,
            weight_mut_power: 2.5,
            trait_mutation_power: 1.0,
            trait_param_mut_prob: 0.5,
            babies_stolen: 0,
            node_activators: vec![Activation::SigmoidSteepened],
            node_activators_prob: vec![1.0],
            epoch_executor_type: EpochExecutorKind::Sequential,
            num_generations: 100,
            num_runs: 1,
        }
    }
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        if self.pop_size == 0 {
            return Err(Error::InvalidConfig("PopSize must be positive".into()));
        }
        if self.compat_threshold <= 0.0 {
            return Err(Error::InvalidConfig(
                "CompatThreshold must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Sample an activation for a new hidden node from the configured
    /// distribution. An empty or all-zero distribution yields the default.
    pub fn random_activation(&self, rng: &mut impl RngCore) -> Activation {
        pick_weighted(rng, &self.node_activators, &self.node_activators_prob)
            .copied()
            .unwrap_or_default()
    }
}
