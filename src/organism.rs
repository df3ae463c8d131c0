//! An organism is a genome bound to its phenotype and evaluation results,
//! plus the transient flags reproduction uses to steer champions and culls.

use crate::{error::Result, genome::Genome, network::Network};
use core::cmp::Ordering;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organism {
    /// Shared (adjusted) fitness; what selection acts on.
    pub fitness: f64,
    /// Fitness as the evaluator reported it, before species adjustment.
    pub original_fitness: f64,
    pub error: f64,
    pub winner: bool,

    pub genome: Genome,
    #[serde(skip)]
    pub phenotype: Option<Network>,

    pub generation: usize,
    /// Fractional offspring quota, assigned during allocation.
    pub expected_offspring: f64,

    // reproduction bookkeeping, never serialized
    #[serde(skip)]
    pub eliminate: bool,
    #[serde(skip)]
    pub champion: bool,
    #[serde(skip)]
    pub super_champ_offspring: usize,
    #[serde(skip)]
    pub pop_champ: bool,
    #[serde(skip)]
    pub pop_champ_child: bool,

    /// Fitness of the population champion this organism descends from; lets
    /// a driver spot regressions in champion lineages.
    pub highest_fitness: f64,
}

impl Organism {
    /// Bind a genome into an organism, building the phenotype.
    pub fn new(fitness: f64, genome: Genome, generation: usize) -> Result<Self> {
        let phenotype = Some(genome.genesis(genome.id)?);
        Ok(Self {
            fitness,
            original_fitness: fitness,
            error: 0.,
            winner: false,
            genome,
            phenotype,
            generation,
            expected_offspring: 0.,
            eliminate: false,
            champion: false,
            super_champ_offspring: 0,
            pop_champ: false,
            pop_champ_child: false,
            highest_fitness: 0.,
        })
    }

    /// Throw away the phenotype and rebuild it from the current genome.
    pub fn update_phenotype(&mut self) -> Result<()> {
        self.phenotype = None;
        self.phenotype = Some(self.genome.genesis(self.genome.id)?);
        Ok(())
    }

    /// Structural size of the phenotype, falling back to the genome's own
    /// element count when no phenotype is built.
    pub fn complexity(&self) -> usize {
        match &self.phenotype {
            Some(net) => net.complexity(),
            None => self.genome.nodes.len() + self.genes_len(),
        }
    }

    fn genes_len(&self) -> usize {
        self.genome.genes.len()
    }

    /// Encode for transport across worker boundaries. The phenotype is not
    /// carried; [unmarshal](Organism::unmarshal) rebuilds it.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        let mut organism: Organism = serde_json::from_slice(bytes)?;
        organism.update_phenotype()?;
        Ok(organism)
    }

    /// Best-first ordering: higher fitness, then simpler phenotype, then
    /// younger (smaller) genome id.
    pub fn cmp_selection(&self, other: &Organism) -> Ordering {
        other
            .fitness
            .partial_cmp(&self.fitness)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.complexity().cmp(&other.complexity()))
            .then_with(|| self.genome.id.cmp(&other.genome.id))
    }
}

impl core::fmt::Display for Organism {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "organism gen {} fitness {:.4} ({})",
            self.generation, self.fitness, self.genome,
        )?;
        if self.winner {
            write!(f, " - winner")?;
        }
        Ok(())
    }
}
