//! The population: every species (and through them every organism), the
//! shared innovation registry, and the machinery an epoch drives: spawning,
//! speciation, offspring allocation, anti-stagnation measures and the purges
//! that turn one generation into the next.

use crate::{
    config::Options,
    error::{CancelToken, Error, Result},
    genome::{mutation::WeightMutationKind, Genome},
    innovation::InnovationStore,
    organism::Organism,
    species::Species,
};
use log::{debug, info};
use rand::{Rng, RngCore};

#[derive(Debug)]
pub struct Population {
    /// Species own their organisms; the population's master organism list is
    /// the concatenation in species order.
    pub species: Vec<Species>,
    pub store: InnovationStore,
    next_species_id: usize,
    /// Best original fitness ever observed, for stagnation tracking.
    pub highest_fitness: f64,
    /// Epochs since `highest_fitness` last moved.
    pub epochs_since_improvement: usize,
    /// Generation in which a winner was first flagged; 0 until then.
    pub winner_generation: usize,
}

impl Population {
    /// Grow a population from one seed genome: `PopSize` duplicates, each
    /// with fully re-rolled link weights, speciated from scratch. The id
    /// counters resume right after the seed's ceiling.
    pub fn spawn(seed: &Genome, opts: &Options, rng: &mut impl RngCore) -> Result<Self> {
        opts.validate()?;

        let store = InnovationStore::new(seed.last_gene_innovation() + 1, seed.last_node_id() + 1);
        let mut organisms = Vec::with_capacity(opts.pop_size);
        for count in 1..=opts.pop_size {
            let mut genome = seed.duplicate(count)?;
            genome.mutate_link_weights(1.0, 1.0, WeightMutationKind::Gaussian, rng)?;
            organisms.push(Organism::new(0., genome, 1)?);
        }

        let mut population = Self::with_store(store);
        population.speciate(organisms, opts, &CancelToken::new())?;
        Ok(population)
    }

    /// Grow a population of random genomes instead of seed duplicates.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn_random(
        inputs: usize,
        outputs: usize,
        max_hidden: usize,
        recurrent: bool,
        link_prob: f64,
        opts: &Options,
        rng: &mut impl RngCore,
    ) -> Result<Self> {
        opts.validate()?;

        let mut organisms = Vec::with_capacity(opts.pop_size);
        let mut last_innovation = 0;
        let mut last_node = 0;
        for count in 1..=opts.pop_size {
            let hidden = rng.random_range(0..=max_hidden);
            let genome = Genome::new_random(
                count, inputs, outputs, hidden, max_hidden, recurrent, link_prob, rng,
            );
            last_innovation = last_innovation.max(genome.last_gene_innovation());
            last_node = last_node.max(genome.last_node_id());
            organisms.push(Organism::new(0., genome, 1)?);
        }

        let mut population = Self::with_store(InnovationStore::new(last_innovation + 1, last_node + 1));
        population.speciate(organisms, opts, &CancelToken::new())?;
        Ok(population)
    }

    pub(crate) fn with_store(store: InnovationStore) -> Self {
        Self {
            species: Vec::new(),
            store,
            next_species_id: 1,
            highest_fitness: 0.,
            epochs_since_improvement: 0,
            winner_generation: 0,
        }
    }

    pub fn organisms(&self) -> impl Iterator<Item = &Organism> {
        self.species.iter().flat_map(|s| s.organisms.iter())
    }

    pub fn organisms_mut(&mut self) -> impl Iterator<Item = &mut Organism> {
        self.species.iter_mut().flat_map(|s| s.organisms.iter_mut())
    }

    pub fn organism_count(&self) -> usize {
        self.species.iter().map(Species::size).sum()
    }

    /// Sort every organism into the best-matching species within the
    /// compatibility threshold, founding a new species when nothing fits.
    /// The representative of a species is its first organism.
    pub fn speciate(
        &mut self,
        organisms: Vec<Organism>,
        opts: &Options,
        cancel: &CancelToken,
    ) -> Result<()> {
        if opts.compat_threshold <= 0. {
            return Err(Error::InvalidConfig("zero compatibility threshold".into()));
        }

        for organism in organisms {
            cancel.check()?;

            let mut best: Option<(usize, f64)> = None;
            for (idx, species) in self.species.iter().enumerate() {
                let Some(repr) = species.organisms.first() else {
                    continue;
                };
                let distance = organism.genome.compatibility(&repr.genome, opts);
                if distance < opts.compat_threshold
                    && best.map(|(_, d)| distance < d).unwrap_or(true)
                {
                    best = Some((idx, distance));
                }
            }

            match best {
                Some((idx, _)) => self.species[idx].organisms.push(organism),
                None => {
                    let mut species = Species::new(self.next_species_id);
                    self.next_species_id += 1;
                    species.novel = true;
                    debug!("organism {} founds species {}", organism.genome.id, species.id);
                    species.organisms.push(organism);
                    self.species.push(species);
                }
            }
        }

        Ok(())
    }

    /// Turn raw fitness into integer offspring quotas: everyone's share is
    /// `fitness / population mean`, species fold the fractions with a shared
    /// skim, precision loss lands on the species already expecting the most,
    /// and a population whose average collapsed to zero hands everything to
    /// the best species. Species expecting nothing are dropped.
    pub fn purge_zero_offspring_species(&mut self, generation: usize) {
        let count = self.organism_count();
        let total: f64 = self.organisms().map(|o| o.fitness).sum();
        let overall_avg = if count > 0 { total / count as f64 } else { 0. };
        debug!("generation {generation}: mean fitness {overall_avg}");

        for organism in self.organisms_mut() {
            organism.expected_offspring = if overall_avg > 0. {
                organism.fitness / overall_avg
            } else {
                0.
            };
        }

        let mut skim = 0.;
        let mut total_expected = 0usize;
        for species in &mut self.species {
            let (expected, carried) = species.count_offspring(skim);
            species.expected_offspring = expected;
            skim = carried;
            total_expected += expected;
        }

        if total_expected < count {
            if total_expected == 0 {
                // total collapse: the best species inherits the whole quota
                let best = self
                    .species
                    .iter_mut()
                    .max_by(|a, b| {
                        let a_max = a.organisms.iter().map(|o| o.fitness).fold(f64::MIN, f64::max);
                        let b_max = b.organisms.iter().map(|o| o.fitness).fold(f64::MIN, f64::max);
                        a_max.partial_cmp(&b_max).unwrap_or(core::cmp::Ordering::Equal)
                    });
                if let Some(best) = best {
                    best.expected_offspring = count;
                }
            } else if let Some(largest) = self
                .species
                .iter_mut()
                .max_by_key(|s| s.expected_offspring)
            {
                // skim precision lost in the walk goes to the biggest expecter
                largest.expected_offspring += count - total_expected;
            }
        }

        self.species.retain(|species| {
            if species.expected_offspring == 0 {
                debug!("species {} starved out", species.id);
                false
            } else {
                true
            }
        });
    }

    /// Anti-stagnation reset: hand the whole population to the top two
    /// species (or all of it to a lone survivor) through their champions'
    /// super-champion quotas, and zero everyone else.
    pub fn delta_coding(&mut self, sorted: &[usize], opts: &Options) {
        info!("population stagnant, delta coding fires");
        self.epochs_since_improvement = 0;

        let half = opts.pop_size / 2;
        let first = sorted[0];
        if let Some(second) = sorted.get(1).copied() {
            self.assign_super_champ(first, half);
            self.assign_super_champ(second, opts.pop_size - half);
            for &idx in &sorted[2..] {
                self.species[idx].expected_offspring = 0;
            }
        } else {
            self.assign_super_champ(first, opts.pop_size);
        }
    }

    fn assign_super_champ(&mut self, idx: usize, quota: usize) {
        let species = &mut self.species[idx];
        species.expected_offspring = quota;
        species.age_of_last_improvement = species.age;
        if let Some(champ) = species.organisms.first_mut() {
            champ.super_champ_offspring = quota;
        }
    }

    /// Rob stagnable species of part of their quota and shower it on the
    /// best: a fifth each to the top two healthy species, a tenth to the
    /// third, then blocks of three down the list, leftovers to the best.
    pub fn give_babies_to_the_best(
        &mut self,
        sorted: &[usize],
        opts: &Options,
        rng: &mut impl RngCore,
    ) {
        let mut stolen = 0usize;
        for &idx in sorted.iter().rev() {
            if stolen >= opts.babies_stolen {
                break;
            }
            let species = &mut self.species[idx];
            if species.age > 5 && species.expected_offspring > 2 {
                let need = opts.babies_stolen - stolen;
                let available = species.expected_offspring - 1;
                if available > need {
                    species.expected_offspring -= need;
                    stolen += need;
                } else {
                    stolen += available;
                    species.expected_offspring = 1;
                }
            }
        }
        if stolen == 0 {
            return;
        }
        debug!("stole {stolen} expected offspring for the best species");

        let one_fifth = opts.babies_stolen / 5;
        let one_tenth = opts.babies_stolen / 10;

        let mut cursor = 0usize;
        for quota in [one_fifth, one_fifth, one_tenth] {
            while cursor < sorted.len()
                && self.species[sorted[cursor]].is_dying(opts.drop_off_age)
            {
                cursor += 1;
            }
            if cursor >= sorted.len() || stolen == 0 {
                break;
            }
            let grant = quota.min(stolen);
            self.grant_super_champ(sorted[cursor], grant);
            stolen -= grant;
            cursor += 1;
        }

        while stolen > 0 && cursor < sorted.len() {
            let idx = sorted[cursor];
            if !self.species[idx].is_dying(opts.drop_off_age) && rng.random::<f64>() < 0.9 {
                let grant = 3.min(stolen);
                self.grant_super_champ(idx, grant);
                stolen -= grant;
            }
            cursor += 1;
        }

        if stolen > 0 {
            self.grant_super_champ(sorted[0], stolen);
        }
    }

    fn grant_super_champ(&mut self, idx: usize, quota: usize) {
        let species = &mut self.species[idx];
        species.expected_offspring += quota;
        if let Some(champ) = species.organisms.first_mut() {
            champ.super_champ_offspring += quota;
        }
    }

    /// Drop every organism marked for elimination.
    pub fn purge_organisms(&mut self) {
        for species in &mut self.species {
            species.organisms.retain(|o| !o.eliminate);
        }
    }

    /// Drop every organism not born into `keep_generation`, emptying the
    /// old generation out of all species once its babies are speciated.
    pub fn purge_old_generation(&mut self, keep_generation: usize) {
        for species in &mut self.species {
            species.organisms.retain(|o| o.generation == keep_generation);
        }
    }

    /// Remove extinct species, age the survivors (novel species skip their
    /// first aging), and renumber all organisms consecutively.
    pub fn purge_or_age_species(&mut self) {
        self.species.retain(|species| {
            if species.is_empty() {
                debug!("species {} went extinct", species.id);
                false
            } else {
                true
            }
        });

        let mut organism_id = 1;
        for species in &mut self.species {
            if species.novel {
                species.novel = false;
            } else {
                species.age += 1;
            }
            for organism in &mut species.organisms {
                organism.genome.id = organism_id;
                organism_id += 1;
            }
        }
    }

    /// Structural soundness of every genome in the population.
    pub fn verify(&self) -> Result<()> {
        for organism in self.organisms() {
            organism.genome.verify()?;
        }
        Ok(())
    }

    /// The best species must survive the turnover, or at least have bred.
    pub fn check_best_species_alive(
        &self,
        best_species_id: usize,
        best_reproduced: bool,
    ) -> Result<()> {
        let alive = self.species.iter().any(|s| s.id == best_species_id);
        if !alive && !best_reproduced {
            return Err(Error::BestSpeciesLost(best_species_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{genome::test::xor_seed, random::seeded_rng};

    fn small_opts() -> Options {
        Options {
            pop_size: 20,
            ..Options::default()
        }
    }

    #[test]
    fn test_spawn_counts_and_speciation() {
        let mut rng = seeded_rng(42);
        let opts = small_opts();
        let population = Population::spawn(&xor_seed(1), &opts, &mut rng).unwrap();

        assert_eq!(population.organism_count(), 20);
        assert!(!population.species.is_empty());
        // every organism sits in exactly one species by construction; ids run
        // 1..=pop_size from the spawn loop
        let mut ids: Vec<usize> = population.organisms().map(|o| o.genome.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());

        // counters primed past the seed
        assert_eq!(population.store.peek_innovation(), 4);
        assert_eq!(population.store.peek_node_id(), 5);
    }

    #[test]
    fn test_spawn_rejects_bad_config() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            pop_size: 0,
            ..Options::default()
        };
        assert!(Population::spawn(&xor_seed(1), &opts, &mut rng).is_err());
    }

    #[test]
    fn test_spawn_random() {
        let mut rng = seeded_rng(42);
        let opts = small_opts();
        let population =
            Population::spawn_random(3, 1, 4, false, 1.0, &opts, &mut rng).unwrap();
        assert_eq!(population.organism_count(), 20);
        for organism in population.organisms() {
            assert!(!organism.genome.genes.is_empty());
        }
    }

    #[test]
    fn test_speciate_zero_threshold() {
        let mut population = Population::with_store(InnovationStore::new(4, 5));
        let opts = Options {
            compat_threshold: 0.,
            ..Options::default()
        };
        let organisms = vec![Organism::new(0., xor_seed(1), 1).unwrap()];
        assert!(matches!(
            population.speciate(organisms, &opts, &CancelToken::new()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_speciate_picks_best_match() {
        let opts = Options {
            compat_threshold: 100.,
            ..Options::default()
        };
        let mut population = Population::with_store(InnovationStore::new(100, 100));

        // two resident species: one a bit off from the incoming organism,
        // one identical to it
        let mut far = xor_seed(1);
        far.insert_gene(crate::genome::Gene::new(1, 2, 1., true, 9));
        for (id, genome) in [(1, far), (2, xor_seed(2))] {
            let mut species = Species::new(id);
            species.organisms.push(Organism::new(0., genome, 1).unwrap());
            population.species.push(species);
        }
        population.next_species_id = 3;

        population
            .speciate(
                vec![Organism::new(0., xor_seed(3), 1).unwrap()],
                &opts,
                &CancelToken::new(),
            )
            .unwrap();

        // with a huge threshold both species accept, so the organism must
        // land in the closer (identical) one
        assert_eq!(population.species.len(), 2);
        assert_eq!(population.species[1].size(), 2);
    }

    #[test]
    fn test_speciate_cancel() {
        let mut population = Population::with_store(InnovationStore::new(4, 5));
        let cancel = CancelToken::new();
        cancel.cancel();
        let organisms = vec![Organism::new(0., xor_seed(1), 1).unwrap()];
        assert!(matches!(
            population.speciate(organisms, &Options::default(), &cancel),
            Err(Error::Canceled)
        ));
    }

    #[test]
    fn test_purge_zero_offspring_allocates_quota() {
        let mut rng = seeded_rng(42);
        let opts = small_opts();
        let mut population = Population::spawn(&xor_seed(1), &opts, &mut rng).unwrap();

        for (idx, organism) in population.organisms_mut().enumerate() {
            organism.fitness = (idx + 1) as f64;
        }
        population.purge_zero_offspring_species(1);

        let total: usize = population.species.iter().map(|s| s.expected_offspring).sum();
        assert_eq!(total, 20);
        assert!(population.species.iter().all(|s| s.expected_offspring > 0));
    }

    #[test]
    fn test_purge_zero_offspring_salvages_collapse() {
        let mut rng = seeded_rng(42);
        let opts = small_opts();
        let mut population = Population::spawn(&xor_seed(1), &opts, &mut rng).unwrap();

        // mean fitness 0: nobody earns a quota arithmetically
        for organism in population.organisms_mut() {
            organism.fitness = 0.;
        }
        population.purge_zero_offspring_species(1);

        let total: usize = population.species.iter().map(|s| s.expected_offspring).sum();
        assert_eq!(total, 20, "collapse must still hand out the full quota");
        assert_eq!(
            population.species.len(),
            1,
            "only the salvaged best species survives"
        );
    }

    #[test]
    fn test_delta_coding_splits_population() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            pop_size: 21,
            compat_threshold: 0.5,
            ..Options::default()
        };
        let mut population = Population::spawn(&xor_seed(1), &opts, &mut rng).unwrap();
        population.epochs_since_improvement = 99;

        // force several species by hand if spawn found only one
        while population.species.len() < 3 {
            let next_id = population.next_species_id;
            population.next_species_id += 1;
            let mut species = Species::new(next_id);
            species
                .organisms
                .push(Organism::new(0., xor_seed(100 + next_id), 1).unwrap());
            population.species.push(species);
        }

        let sorted: Vec<usize> = (0..population.species.len()).collect();
        population.delta_coding(&sorted, &opts);

        assert_eq!(population.epochs_since_improvement, 0);
        assert_eq!(population.species[sorted[0]].expected_offspring, 10);
        assert_eq!(
            population.species[sorted[0]].organisms[0].super_champ_offspring,
            10
        );
        assert_eq!(population.species[sorted[1]].expected_offspring, 11);
        for &idx in &sorted[2..] {
            assert_eq!(population.species[idx].expected_offspring, 0);
        }
    }

    #[test]
    fn test_give_babies_to_the_best() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            pop_size: 40,
            babies_stolen: 10,
            ..Options::default()
        };
        let mut population = Population::with_store(InnovationStore::new(100, 100));

        // old, fat donor at the bottom; healthy receivers on top
        for (id, expected, age) in [(1, 5, 1), (2, 5, 1), (3, 20, 8)] {
            let mut species = Species::new(id);
            species.age = age;
            species.expected_offspring = expected;
            species
                .organisms
                .push(Organism::new(1., xor_seed(id), 1).unwrap());
            population.species.push(species);
        }

        let sorted = vec![0, 1, 2];
        population.give_babies_to_the_best(&sorted, &opts, &mut rng);

        // donor kept at least one
        assert!(population.species[2].expected_offspring >= 1);
        assert_eq!(population.species[2].expected_offspring, 10);
        // everything stolen was handed back out
        let total: usize = population.species.iter().map(|s| s.expected_offspring).sum();
        assert_eq!(total, 30);
        // the champions got their quotas
        assert!(population.species[0].organisms[0].super_champ_offspring >= 2);
    }

    #[test]
    fn test_purges_and_aging() {
        let mut rng = seeded_rng(42);
        let opts = small_opts();
        let mut population = Population::spawn(&xor_seed(1), &opts, &mut rng).unwrap();
        let species_count = population.species.len();

        // mark half for elimination
        for (idx, organism) in population.organisms_mut().enumerate() {
            organism.eliminate = idx % 2 == 0;
        }
        population.purge_organisms();
        assert_eq!(population.organism_count(), 10);

        // age the survivors; spawn-era species were novel
        population.purge_or_age_species();
        assert!(population.species.len() <= species_count);
        assert!(population.species.iter().all(|s| !s.novel));

        let ids: Vec<usize> = population.organisms().map(|o| o.genome.id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());

        // second aging pass actually bumps age
        let ages: Vec<usize> = population.species.iter().map(|s| s.age).collect();
        population.purge_or_age_species();
        for (species, prev) in population.species.iter().zip(ages) {
            assert_eq!(species.age, prev + 1);
        }
    }

    #[test]
    fn test_purge_old_generation() {
        let mut rng = seeded_rng(42);
        let opts = small_opts();
        let mut population = Population::spawn(&xor_seed(1), &opts, &mut rng).unwrap();

        let babies: Vec<Organism> = (0..5)
            .map(|idx| Organism::new(0., xor_seed(50 + idx), 2).unwrap())
            .collect();
        population
            .speciate(babies, &opts, &CancelToken::new())
            .unwrap();
        assert_eq!(population.organism_count(), 25);

        population.purge_old_generation(2);
        assert_eq!(population.organism_count(), 5);
        assert!(population.organisms().all(|o| o.generation == 2));
    }

    #[test]
    fn test_check_best_species_alive() {
        let mut rng = seeded_rng(42);
        let opts = small_opts();
        let population = Population::spawn(&xor_seed(1), &opts, &mut rng).unwrap();
        let id = population.species[0].id;

        assert!(population.check_best_species_alive(id, false).is_ok());
        assert!(population.check_best_species_alive(9999, true).is_ok());
        assert!(matches!(
            population.check_best_species_alive(9999, false),
            Err(Error::BestSpeciesLost(9999))
        ));
    }
}
