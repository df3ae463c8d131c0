//! One generation turnover: prepare (fitness adjustment, quota allocation,
//! anti-stagnation measures, culling), reproduce (sequentially or one rayon
//! task per species), finalize (re-speciate the babies, purge the old
//! generation, age species, reset the innovation table).

use crate::{
    config::{EpochExecutorKind, Options},
    error::{CancelToken, Error, Result},
    organism::Organism,
    population::Population,
    species::Species,
};
use log::debug;
use rand::RngCore;
use rayon::prelude::*;

/// The two turnover loops behind one interface. They are behaviorally
/// equivalent up to the interleaving of offspring across species; the
/// innovation store is the only state reproduction workers share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochExecutor {
    Sequential,
    Parallel,
}

impl EpochExecutor {
    pub fn from_options(opts: &Options) -> Self {
        match opts.epoch_executor_type {
            EpochExecutorKind::Sequential => Self::Sequential,
            EpochExecutorKind::Parallel => Self::Parallel,
        }
    }

    /// Advance the population by one generation.
    pub fn next_epoch(
        &self,
        generation: usize,
        population: &mut Population,
        opts: &Options,
        cancel: &CancelToken,
        rng: &mut impl RngCore,
    ) -> Result<()> {
        let (sorted, best_id) = prepare(generation, population, opts, rng)?;

        let babies = match self {
            Self::Sequential => {
                reproduce_sequential(generation, population, opts, &sorted, cancel, rng)?
            }
            Self::Parallel => reproduce_parallel(generation, population, opts, &sorted, cancel)?,
        };
        if babies.len() != opts.pop_size {
            return Err(Error::ProgenyCountMismatch {
                got: babies.len(),
                want: opts.pop_size,
            });
        }

        let best_reproduced = population
            .species
            .iter()
            .find(|s| s.id == best_id)
            .map(|s| s.expected_offspring > 0)
            .unwrap_or(false);

        population.speciate(babies, opts, cancel)?;
        population.purge_old_generation(generation + 1);
        population.purge_or_age_species();
        population.store.clear();
        population.check_best_species_alive(best_id, best_reproduced)?;

        debug!(
            "generation {generation}: {} organisms in {} species",
            population.organism_count(),
            population.species.len()
        );
        Ok(())
    }
}

/// Fitness adjustment, quota allocation and culling. Returns the species
/// indices sorted best-first by champion original fitness, plus the best
/// species' id.
fn prepare(
    generation: usize,
    population: &mut Population,
    opts: &Options,
    rng: &mut impl RngCore,
) -> Result<(Vec<usize>, usize)> {
    for species in &mut population.species {
        species.adjust_fitness(opts);
        species.compute_max_and_avg_fitness();
    }

    population.purge_zero_offspring_species(generation);

    let champion_fitness = |species: &Species| {
        species
            .champion()
            .map(|o| o.original_fitness)
            .unwrap_or(f64::MIN)
    };
    let mut sorted: Vec<usize> = (0..population.species.len()).collect();
    sorted.sort_by(|&a, &b| {
        champion_fitness(&population.species[b])
            .partial_cmp(&champion_fitness(&population.species[a]))
            .unwrap_or(core::cmp::Ordering::Equal)
    });

    let &best_idx = sorted
        .first()
        .ok_or(Error::BestSpeciesLost(0))?;
    let best_id = population.species[best_idx].id;
    debug!("generation {generation}: best {}", population.species[best_idx]);

    let best_fitness = champion_fitness(&population.species[best_idx]);
    if let Some(champ) = population.species[best_idx].organisms.first_mut() {
        champ.pop_champ = true;
    }
    if best_fitness > population.highest_fitness {
        population.highest_fitness = best_fitness;
        population.epochs_since_improvement = 0;
        debug!("generation {generation}: new population record {best_fitness}");
    } else {
        population.epochs_since_improvement += 1;
    }

    if population.epochs_since_improvement >= opts.drop_off_age + 5 {
        population.delta_coding(&sorted, opts);
    } else if opts.babies_stolen > 0 {
        population.give_babies_to_the_best(&sorted, opts, rng);
    }

    population.purge_organisms();
    Ok((sorted, best_id))
}

fn reproduce_sequential(
    generation: usize,
    population: &Population,
    opts: &Options,
    sorted: &[usize],
    cancel: &CancelToken,
    rng: &mut impl RngCore,
) -> Result<Vec<Organism>> {
    let sorted_refs: Vec<&Species> = sorted.iter().map(|&i| &population.species[i]).collect();

    let mut babies = Vec::with_capacity(opts.pop_size);
    for species in &population.species {
        babies.extend(species.reproduce(
            generation,
            opts,
            &sorted_refs,
            &population.store,
            cancel,
            rng,
        )?);
    }
    Ok(babies)
}

/// One rayon task per species, each with its own thread RNG. Workers hand
/// back owned babies through the join; the first error aborts the epoch.
fn reproduce_parallel(
    generation: usize,
    population: &Population,
    opts: &Options,
    sorted: &[usize],
    cancel: &CancelToken,
) -> Result<Vec<Organism>> {
    let sorted_refs: Vec<&Species> = sorted.iter().map(|&i| &population.species[i]).collect();

    let broods: Vec<Vec<Organism>> = population
        .species
        .par_iter()
        .map(|species| {
            let mut rng = rand::rng();
            species.reproduce(
                generation,
                opts,
                &sorted_refs,
                &population.store,
                cancel,
                &mut rng,
            )
        })
        .collect::<Result<_>>()?;

    Ok(broods.into_iter().flatten().collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{genome::test::xor_seed, random::seeded_rng};

    fn evaluated_population(opts: &Options, rng: &mut impl RngCore) -> Population {
        let mut population = Population::spawn(&xor_seed(1), opts, rng).unwrap();
        // synthetic fitness standing in for an external evaluator
        for (idx, organism) in population.organisms_mut().enumerate() {
            organism.fitness = 1. + (idx % 7) as f64 / 7.;
        }
        population
    }

    #[test]
    fn test_sequential_epoch_keeps_pop_size() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            pop_size: 30,
            ..Options::default()
        };
        let mut population = evaluated_population(&opts, &mut rng);

        for generation in 1..=3 {
            // re-evaluate each new generation
            for (idx, organism) in population.organisms_mut().enumerate() {
                organism.fitness = 1. + (idx % 7) as f64 / 7.;
            }
            EpochExecutor::Sequential
                .next_epoch(generation, &mut population, &opts, &CancelToken::new(), &mut rng)
                .unwrap();

            assert_eq!(population.organism_count(), 30);
            assert!(population
                .organisms()
                .all(|o| o.generation == generation + 1));
            assert!(population.store.is_empty());
        }
    }

    #[test]
    fn test_parallel_epoch_keeps_pop_size() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            pop_size: 30,
            epoch_executor_type: crate::config::EpochExecutorKind::Parallel,
            ..Options::default()
        };
        let mut population = evaluated_population(&opts, &mut rng);

        let executor = EpochExecutor::from_options(&opts);
        assert_eq!(executor, EpochExecutor::Parallel);
        executor
            .next_epoch(1, &mut population, &opts, &CancelToken::new(), &mut rng)
            .unwrap();

        assert_eq!(population.organism_count(), 30);
        assert!(population.organisms().all(|o| o.generation == 2));
        assert!(population.store.is_empty());
    }

    #[test]
    fn test_epoch_cancel() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            pop_size: 10,
            ..Options::default()
        };
        let mut population = evaluated_population(&opts, &mut rng);

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            EpochExecutor::Sequential.next_epoch(1, &mut population, &opts, &cancel, &mut rng),
            Err(Error::Canceled)
        ));
    }

    #[test]
    fn test_delta_coding_epoch_recovers() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            pop_size: 30,
            drop_off_age: 3,
            ..Options::default()
        };
        let mut population = evaluated_population(&opts, &mut rng);

        // record far above anything the population reaches: stagnation only
        population.highest_fitness = 1_000.;
        population.epochs_since_improvement = opts.drop_off_age + 5;

        EpochExecutor::Sequential
            .next_epoch(1, &mut population, &opts, &CancelToken::new(), &mut rng)
            .unwrap();

        // delta coding resets the counter and still refills the population
        assert_eq!(population.epochs_since_improvement, 0);
        assert_eq!(population.organism_count(), 30);
    }

    #[test]
    fn test_innovations_tracked_within_epoch() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            pop_size: 40,
            mutate_add_node_prob: 0.5,
            mutate_add_link_prob: 0.5,
            ..Options::default()
        };
        let mut population = evaluated_population(&opts, &mut rng);
        let innovation_floor = population.store.peek_innovation();

        EpochExecutor::Sequential
            .next_epoch(1, &mut population, &opts, &CancelToken::new(), &mut rng)
            .unwrap();

        // heavy structural mutation allocated fresh innovations
        assert!(population.store.peek_innovation() > innovation_floor);
        // and every gene across the population still has a unique topology
        // per innovation number
        for organism in population.organisms() {
            assert!(organism.genome.verify().is_ok());
        }
    }
}
