//! A species groups organisms within a compatibility radius of its founder.
//! It owns its members, carries the aging and stagnation bookkeeping, and
//! runs the per-species share of each generation's reproduction.

use crate::{
    config::Options,
    error::{CancelToken, Error, Result},
    genome::{mutation::WeightMutationKind, Genome},
    innovation::InnovationStore,
    organism::Organism,
};
use log::trace;
use rand::{Rng, RngCore};

#[derive(Debug)]
pub struct Species {
    pub id: usize,
    /// Generations since founding, starting at 1.
    pub age: usize,
    pub age_of_last_improvement: usize,
    pub max_fitness_ever: f64,
    /// Refreshed by [compute_max_and_avg_fitness](Species::compute_max_and_avg_fitness).
    pub max_fitness: f64,
    pub avg_fitness: f64,
    /// Integer offspring quota for the coming generation.
    pub expected_offspring: usize,
    /// Founded this generation; shielded from aging once.
    pub novel: bool,
    /// Transient search flag for drivers walking the species list.
    pub checked: bool,
    pub organisms: Vec<Organism>,
}

impl Species {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            age: 1,
            age_of_last_improvement: 0,
            max_fitness_ever: 0.,
            max_fitness: 0.,
            avg_fitness: 0.,
            expected_offspring: 0,
            novel: false,
            checked: false,
            organisms: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.organisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organisms.is_empty()
    }

    /// Generations since fitness last improved.
    pub fn last_improved(&self) -> usize {
        self.age - self.age_of_last_improvement
    }

    /// Stagnant past the penalty window; skipped when rewards are handed out.
    pub fn is_dying(&self, drop_off_age: usize) -> bool {
        self.last_improved() > drop_off_age
    }

    /// First organism; the species champion once
    /// [adjust_fitness](Species::adjust_fitness) has sorted the list.
    pub fn champion(&self) -> Option<&Organism> {
        self.organisms.first()
    }

    pub fn find_champion(&self) -> Option<&Organism> {
        self.organisms
            .iter()
            .max_by(|a, b| a.fitness.partial_cmp(&b.fitness).unwrap_or(core::cmp::Ordering::Equal))
    }

    pub fn compute_max_and_avg_fitness(&mut self) {
        self.max_fitness = self
            .organisms
            .iter()
            .map(|o| o.fitness)
            .fold(f64::MIN, f64::max);
        let total: f64 = self.organisms.iter().map(|o| o.fitness).sum();
        self.avg_fitness = if self.organisms.is_empty() {
            0.
        } else {
            total / self.organisms.len() as f64
        };
    }

    /// Fitness sharing and the age levers: snapshot original fitness, crush
    /// stagnant species, boost young ones, floor at a hair above zero, share
    /// by species size, then sort best-first and mark the survivors' cut.
    pub fn adjust_fitness(&mut self, opts: &Options) {
        let age_debt =
            (self.age as i64 - self.age_of_last_improvement as i64 + 1) - opts.drop_off_age as i64;
        let size = self.organisms.len();

        for organism in &mut self.organisms {
            organism.original_fitness = organism.fitness;

            if age_debt >= 1 {
                organism.fitness *= 0.01;
            }
            if self.age <= 10 {
                organism.fitness *= opts.age_significance;
            }
            organism.fitness = organism.fitness.max(0.0001);
            organism.fitness /= size as f64;
        }

        self.organisms.sort_by(Organism::cmp_selection);

        if let Some(top) = self.organisms.first() {
            if top.original_fitness > self.max_fitness_ever {
                self.max_fitness_ever = top.original_fitness;
                self.age_of_last_improvement = self.age;
            }
        }

        // only the top slice breeds; the +1 keeps at least one parent
        let parents = (opts.survival_thresh * size as f64 + 1.).floor() as usize;
        for (rank, organism) in self.organisms.iter_mut().enumerate() {
            organism.champion = rank == 0;
            organism.eliminate = rank >= parents;
        }
    }

    /// Fold this species' fractional offspring quotas into an integer count,
    /// carrying the fractional remainder in `skim` so nothing is lost across
    /// species.
    pub fn count_offspring(&self, mut skim: f64) -> (usize, f64) {
        let mut expected = 0usize;
        for organism in &self.organisms {
            expected += organism.expected_offspring as usize;
            skim += organism.expected_offspring.fract();
            if skim >= 1. {
                let whole = skim.floor();
                expected += whole as usize;
                skim -= whole;
            }
        }
        (expected, skim)
    }

    /// Produce exactly `expected_offspring` babies for the next generation.
    /// `sorted_species` is the epoch's best-first species snapshot used for
    /// interspecies mating.
    pub fn reproduce(
        &self,
        generation: usize,
        opts: &Options,
        sorted_species: &[&Species],
        store: &InnovationStore,
        cancel: &CancelToken,
        rng: &mut impl RngCore,
    ) -> Result<Vec<Organism>> {
        if self.expected_offspring > 0 && self.organisms.is_empty() {
            return Err(Error::EmptySpeciesReproduce(self.id));
        }
        if self.expected_offspring == 0 {
            return Ok(Vec::new());
        }

        let pool = &self.organisms;
        let champ = &pool[0];
        let mut super_champ_left = champ.super_champ_offspring;
        let mut champ_cloned = false;

        let mut babies = Vec::with_capacity(self.expected_offspring);
        for count in 0..self.expected_offspring {
            cancel.check()?;

            let mut pop_champ_child = false;
            let mut baby_highest = 0.;

            let baby_genome = if super_champ_left > 0 {
                // a super-champion mostly re-rolls its weights, sometimes
                // grows a link, and its final offspring is an exact clone
                let mut genome = champ.genome.duplicate(count)?;
                if super_champ_left > 1 {
                    if rng.random::<f64>() < 0.8 || opts.mutate_add_link_prob == 0. {
                        genome.mutate_link_weights(
                            opts.weight_mut_power,
                            1.0,
                            WeightMutationKind::Gaussian,
                            rng,
                        )?;
                    } else {
                        genome.mutate_add_link(store, opts, rng)?;
                    }
                }
                if champ.pop_champ {
                    pop_champ_child = true;
                    baby_highest = champ.original_fitness;
                }
                super_champ_left -= 1;
                genome
            } else if !champ_cloned && self.expected_offspring > 5 {
                champ_cloned = true;
                champ.genome.duplicate(count)?
            } else if rng.random::<f64>() < opts.mutate_only_prob || pool.len() == 1 {
                let mom = &pool[rng.random_range(0..pool.len())];
                let mut genome = mom.genome.duplicate(count)?;
                let changed = mutate_structure(&mut genome, opts, store, rng)?;
                if !changed {
                    genome.mutate_all_nonstructural(opts, rng)?;
                }
                genome
            } else {
                let mom = &pool[rng.random_range(0..pool.len())];
                let dad = if rng.random::<f64>() > opts.interspecies_mate_rate {
                    &pool[rng.random_range(0..pool.len())]
                } else {
                    // no acceptable other species within 5 draws: mate inside
                    match self.outside_dad(sorted_species, rng) {
                        Some(dad) => dad,
                        None => &pool[rng.random_range(0..pool.len())],
                    }
                };

                let mut genome = {
                    let (f1, f2) = (mom.fitness, dad.fitness);
                    if rng.random::<f64>() < opts.mate_multipoint_prob {
                        mom.genome.mate_multipoint(&dad.genome, count, f1, f2, rng)?
                    } else {
                        let blend_share = opts.mate_multipoint_avg_prob
                            + opts.mate_singlepoint_prob;
                        let blend = if blend_share > 0. {
                            opts.mate_multipoint_avg_prob / blend_share
                        } else {
                            0.5
                        };
                        if rng.random::<f64>() < blend {
                            mom.genome
                                .mate_multipoint_avg(&dad.genome, count, f1, f2, rng)?
                        } else {
                            mom.genome
                                .mate_singlepoint(&dad.genome, count, f1, f2, rng)?
                        }
                    }
                };

                let same_parent = dad.genome.id == mom.genome.id;
                if rng.random::<f64>() > opts.mate_only_prob
                    || same_parent
                    || dad.genome.compatibility(&mom.genome, opts) == 0.
                {
                    let changed = mutate_structure(&mut genome, opts, store, rng)?;
                    if !changed {
                        genome.mutate_all_nonstructural(opts, rng)?;
                    }
                }
                genome
            };

            let mut baby = Organism::new(0., baby_genome, generation + 1)?;
            baby.pop_champ_child = pop_champ_child;
            baby.highest_fitness = baby_highest;
            babies.push(baby);
        }

        trace!("species {} produced {} babies", self.id, babies.len());
        Ok(babies)
    }

    /// Champion of a random other species, biased toward the better end of
    /// the sorted snapshot. Gives up after 5 draws that land back here.
    fn outside_dad<'a>(
        &self,
        sorted_species: &[&'a Species],
        rng: &mut impl RngCore,
    ) -> Option<&'a Organism> {
        if sorted_species.len() < 2 {
            return None;
        }

        for _ in 0..5 {
            let bias = rng.random::<f64>() / 4.;
            let idx = (bias * (sorted_species.len() - 1) as f64 + 0.5).floor() as usize;
            let other = sorted_species[idx.min(sorted_species.len() - 1)];
            if other.id != self.id {
                return other.champion();
            }
        }
        None
    }
}

impl core::fmt::Display for Species {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "species {} (age {}, last improved {}): {} organisms, expecting {}",
            self.id,
            self.age,
            self.last_improved(),
            self.organisms.len(),
            self.expected_offspring,
        )
    }
}

/// One structural mutation at most, chosen by the configured probabilities.
/// Reports whether anything actually changed.
fn mutate_structure(
    genome: &mut Genome,
    opts: &Options,
    store: &InnovationStore,
    rng: &mut impl RngCore,
) -> Result<bool> {
    if rng.random::<f64>() < opts.mutate_add_node_prob {
        genome.mutate_add_node(store, opts, rng)
    } else if rng.random::<f64>() < opts.mutate_add_link_prob {
        genome.mutate_add_link(store, opts, rng)
    } else if rng.random::<f64>() < opts.mutate_connect_sensors {
        genome.mutate_connect_sensors(store, rng)
    } else {
        Ok(false)
    }
}
