//! The mutation operators. Every operator returns whether it changed the
//! genome; running out of candidates is a no-op, not an error. Structural
//! operators route through the [InnovationStore] so identical mutations made
//! anywhere in the population this generation resolve to identical ids.

use crate::{
    config::Options,
    error::{Error, Result},
    genome::{node::NodeRole, Gene, Genome, Node},
    innovation::InnovationStore,
    random::rand_sign,
};
use rand::{Rng, RngCore};

/// How [mutate_link_weights](Genome::mutate_link_weights) applies its draw:
/// nudge the current weight, or overwrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightMutationKind {
    Gaussian,
    ColdGaussian,
}

impl Genome {
    /// Perturb or replace gene weights. Genes near the tail of the list (the
    /// newest structure) are touched more aggressively, and half of all calls
    /// run in a severe mode that hits everything. `mutation_num` tracks the
    /// resulting weight.
    pub fn mutate_link_weights(
        &mut self,
        power: f64,
        rate: f64,
        kind: WeightMutationKind,
        rng: &mut impl RngCore,
    ) -> Result<bool> {
        if self.genes.is_empty() {
            return Err(Error::malformed(self.id, "no genes to mutate"));
        }

        let severe = rng.random::<f64>() < 0.5;
        let gene_total = self.genes.len() as f64;
        let end_part = gene_total * 0.8;
        let power_mod = 1.0;

        for (num, gene) in self.genes.iter_mut().enumerate() {
            let (gauss_point, cold_gauss_point) = if severe {
                (0.3, 0.1)
            } else if gene_total >= 10. && (num as f64) > end_part {
                (0.5, 0.3)
            } else if rng.random::<f64>() < 0.5 {
                (1.0 - rate, 1.0 - rate - 0.1)
            } else {
                (1.0 - rate, 1.0 - rate)
            };

            let draw = rand_sign(rng) * rng.random::<f64>() * power * power_mod;
            match kind {
                WeightMutationKind::Gaussian => {
                    let choice = rng.random::<f64>();
                    if choice > gauss_point {
                        gene.weight += draw;
                    } else if choice > cold_gauss_point {
                        gene.weight = draw;
                    }
                }
                WeightMutationKind::ColdGaussian => gene.weight = draw,
            }
            gene.mutation_num = gene.weight;
        }

        Ok(true)
    }

    /// Mutate the parameters of one randomly chosen trait.
    pub fn mutate_random_trait(&mut self, opts: &Options, rng: &mut impl RngCore) -> Result<bool> {
        if self.traits.is_empty() {
            return Err(Error::malformed(self.id, "no traits to mutate"));
        }

        let idx = rng.random_range(0..self.traits.len());
        self.traits[idx].mutate(opts, rng);
        Ok(true)
    }

    /// `times` random reassignments of gene trait references.
    pub fn mutate_link_trait(&mut self, times: usize, rng: &mut impl RngCore) -> Result<bool> {
        if self.traits.is_empty() || self.genes.is_empty() {
            return Err(Error::malformed(self.id, "no traits or genes"));
        }

        for _ in 0..times {
            let trait_id = self.traits[rng.random_range(0..self.traits.len())].id;
            let gene_idx = rng.random_range(0..self.genes.len());
            let gene = &mut self.genes[gene_idx];
            gene.trait_id = trait_id;
        }
        Ok(true)
    }

    /// `times` random reassignments of node trait references.
    pub fn mutate_node_trait(&mut self, times: usize, rng: &mut impl RngCore) -> Result<bool> {
        if self.traits.is_empty() || self.nodes.is_empty() {
            return Err(Error::malformed(self.id, "no traits or nodes"));
        }

        for _ in 0..times {
            let trait_id = self.traits[rng.random_range(0..self.traits.len())].id;
            let node_idx = rng.random_range(0..self.nodes.len());
            let node = &mut self.nodes[node_idx];
            node.trait_id = trait_id;
        }
        Ok(true)
    }

    /// Flip the enabled flag of one random gene, at most once per call no
    /// matter how large `times` is. A gene is only disabled when another
    /// enabled gene leaves its source node, so no node goes silent.
    pub fn mutate_toggle_enable(&mut self, times: usize, rng: &mut impl RngCore) -> Result<bool> {
        if self.genes.is_empty() {
            return Err(Error::malformed(self.id, "no genes to toggle"));
        }

        for _ in 0..times {
            let idx = rng.random_range(0..self.genes.len());
            if self.genes[idx].enabled {
                let (from, innovation) = (self.genes[idx].from, self.genes[idx].innovation);
                let safe = self
                    .genes
                    .iter()
                    .any(|g| g.from == from && g.enabled && g.innovation != innovation);
                if safe {
                    self.genes[idx].enabled = false;
                    return Ok(true);
                }
            } else {
                self.genes[idx].enabled = true;
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Re-enable the first disabled gene, if any.
    pub fn mutate_gene_reenable(&mut self) -> Result<bool> {
        if let Some(gene) = self.genes.iter_mut().find(|g| !g.enabled) {
            gene.enabled = true;
            return Ok(true);
        }
        Ok(false)
    }

    /// Wire one disconnected sensor to every output it doesn't already reach.
    /// Returns true when at least one link was added.
    pub fn mutate_connect_sensors(
        &mut self,
        store: &InnovationStore,
        rng: &mut impl RngCore,
    ) -> Result<bool> {
        if self.nodes.is_empty() {
            return Err(Error::malformed(self.id, "no nodes"));
        }

        let disconnected: Vec<usize> = self
            .nodes
            .iter()
            .filter(|n| n.role.is_sensor())
            .filter(|n| !self.genes.iter().any(|g| g.from == n.id))
            .map(|n| n.id)
            .collect();
        if disconnected.is_empty() {
            return Ok(false);
        }

        let sensor = disconnected[rng.random_range(0..disconnected.len())];
        let outputs: Vec<usize> = self
            .nodes
            .iter()
            .filter(|n| n.role == NodeRole::Output)
            .map(|n| n.id)
            .collect();

        let mut connected = false;
        for output in outputs {
            if self.genes.iter().any(|g| g.from == sensor && g.to == output) {
                continue;
            }

            let found = store.link_innovation(sensor, output, false, || {
                (rand_sign(rng) * rng.random::<f64>() * 3.0, self.random_trait_id(rng))
            });
            let mut gene = Gene::new(sensor, output, found.weight, false, found.innovation);
            gene.trait_id = found.trait_id;
            self.insert_gene(gene);
            connected = true;
        }

        Ok(connected)
    }

    /// Try to grow a new link. A coin weighted by `RecurOnlyProb` decides
    /// whether the link must be recurrent; candidate endpoint pairs are then
    /// drawn up to `NewLinkTries` times and checked against the phenotype's
    /// recurrence test (visit budget nodes²) so the topology class of the new
    /// link is known, not guessed.
    pub fn mutate_add_link(
        &mut self,
        store: &InnovationStore,
        opts: &Options,
        rng: &mut impl RngCore,
    ) -> Result<bool> {
        let net = self.genesis(self.id)?;
        let node_count = self.nodes.len();
        let thresh = node_count * node_count;

        let Some(first_nonsensor) = self.nodes.iter().position(|n| !n.role.is_sensor()) else {
            return Ok(false);
        };

        let want_recurrent = rng.random::<f64>() < opts.recur_only_prob;
        let mut found: Option<(usize, usize, bool)> = None;
        for _ in 0..opts.new_link_tries {
            let (i1, i2) = if want_recurrent && rng.random::<f64>() < 0.5 {
                // loop onto a single non-sensor node
                let idx = rng.random_range(first_nonsensor..node_count);
                (idx, idx)
            } else {
                (
                    rng.random_range(0..node_count),
                    rng.random_range(first_nonsensor..node_count),
                )
            };

            let (from, to) = (self.nodes[i1].id, self.nodes[i2].id);
            let mut count = 0;
            let recurrent = net.is_recurrent(i1, i2, &mut count, thresh);
            if recurrent != want_recurrent {
                continue;
            }
            if self.has_link(from, to, recurrent) {
                continue;
            }

            found = Some((from, to, recurrent));
            break;
        }

        let Some((from, to, recurrent)) = found else {
            return Ok(false);
        };

        let link = store.link_innovation(from, to, recurrent, || {
            (rand_sign(rng) * rng.random::<f64>() * 10.0, self.random_trait_id(rng))
        });
        let mut gene = Gene::new(from, to, link.weight, recurrent, link.innovation);
        gene.trait_id = link.trait_id;
        self.insert_gene(gene);
        Ok(true)
    }

    /// Split an enabled gene with a fresh hidden node. The disabled gene is
    /// replaced by a weight-1.0 upstream gene (inheriting the recurrent flag)
    /// and a downstream gene carrying the old weight. Small genomes bias the
    /// choice toward older genes; both the gene pair's innovations and the
    /// node id come from the registry so the same split elsewhere in the
    /// population lands on the same ids.
    pub fn mutate_add_node(
        &mut self,
        store: &InnovationStore,
        opts: &Options,
        rng: &mut impl RngCore,
    ) -> Result<bool> {
        if self.genes.is_empty() {
            return Ok(false);
        }

        let splittable = |genome: &Genome, idx: usize| {
            let gene = &genome.genes[idx];
            gene.enabled
                && genome
                    .node_with_id(gene.from)
                    .is_some_and(|n| n.role != NodeRole::Bias)
        };

        let mut chosen = None;
        if self.genes.len() < 15 {
            for idx in 0..self.genes.len() {
                if splittable(self, idx) && rng.random::<f64>() >= 0.3 {
                    chosen = Some(idx);
                    break;
                }
            }
        } else {
            for _ in 0..20 {
                let idx = rng.random_range(0..self.genes.len());
                if splittable(self, idx) {
                    chosen = Some(idx);
                    break;
                }
            }
        }
        let Some(idx) = chosen else {
            return Ok(false);
        };

        self.genes[idx].enabled = false;
        let old = self.genes[idx].clone();

        let split = store.node_innovation(old.from, old.to, old.innovation);
        let activation = opts.random_activation(rng);
        let node_trait = self.traits.first().map(|t| t.id).unwrap_or(0);
        self.insert_node(Node::with_trait(
            split.node_id,
            NodeRole::Hidden,
            activation,
            node_trait,
        ));

        let mut upstream = Gene::new(old.from, split.node_id, 1.0, old.recurrent, split.innovations.0);
        upstream.trait_id = old.trait_id;
        upstream.mutation_num = 0.;
        let mut downstream = Gene::new(split.node_id, old.to, old.weight, false, split.innovations.1);
        downstream.trait_id = old.trait_id;
        downstream.mutation_num = 0.;

        self.insert_gene(upstream);
        self.insert_gene(downstream);
        Ok(true)
    }

    /// The non-topological operators, each fired independently by its
    /// configured probability. Stops at the first failure.
    pub fn mutate_all_nonstructural(
        &mut self,
        opts: &Options,
        rng: &mut impl RngCore,
    ) -> Result<bool> {
        let mut changed = false;
        if rng.random::<f64>() < opts.mutate_random_trait_prob {
            changed |= self.mutate_random_trait(opts, rng)?;
        }
        if rng.random::<f64>() < opts.mutate_link_trait_prob {
            changed |= self.mutate_link_trait(1, rng)?;
        }
        if rng.random::<f64>() < opts.mutate_node_trait_prob {
            changed |= self.mutate_node_trait(1, rng)?;
        }
        if rng.random::<f64>() < opts.mutate_link_weights_prob {
            changed |= self.mutate_link_weights(
                opts.weight_mut_power,
                1.0,
                WeightMutationKind::Gaussian,
                rng,
            )?;
        }
        if rng.random::<f64>() < opts.mutate_toggle_enable_prob {
            changed |= self.mutate_toggle_enable(1, rng)?;
        }
        if rng.random::<f64>() < opts.mutate_gene_reenable_prob {
            changed |= self.mutate_gene_reenable()?;
        }
        Ok(changed)
    }

    fn random_trait_id(&self, rng: &mut impl RngCore) -> usize {
        if self.traits.is_empty() {
            0
        } else {
            self.traits[rng.random_range(0..self.traits.len())].id
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        genome::test::xor_seed,
        random::seeded_rng,
    };

    #[test]
    fn test_mutate_link_weights_tracks_mutation_num() {
        let mut rng = seeded_rng(42);
        let mut genome = xor_seed(1);
        genome
            .mutate_link_weights(2.5, 1.0, WeightMutationKind::ColdGaussian, &mut rng)
            .unwrap();
        for gene in &genome.genes {
            assert_eq!(gene.weight, gene.mutation_num);
            assert!(gene.weight.abs() <= 2.5);
        }

        let mut empty = Genome::new(1);
        assert!(empty
            .mutate_link_weights(1., 1., WeightMutationKind::Gaussian, &mut rng)
            .is_err());
    }

    #[test]
    fn test_mutate_toggle_enable_keeps_sources_alive() {
        let mut rng = seeded_rng(42);
        // every source node has exactly one outgoing gene, so nothing may be
        // disabled
        let mut genome = xor_seed(1);
        for _ in 0..50 {
            genome.mutate_toggle_enable(1, &mut rng).unwrap();
        }
        assert!(genome.genes.iter().all(|g| g.enabled));
    }

    #[test]
    fn test_mutate_toggle_enable_disables_redundant() {
        let mut rng = seeded_rng(42);
        let mut genome = xor_seed(1);
        // second outgoing gene from node 1 makes 1 -> 4 safe to disable
        genome.insert_gene(Gene::new(1, 2, 1., true, 7));

        let mut disabled_seen = false;
        for _ in 0..200 {
            if genome.mutate_toggle_enable(1, &mut rng).unwrap() {
                disabled_seen = true;
                break;
            }
        }
        assert!(disabled_seen);
        assert_eq!(genome.genes.iter().filter(|g| !g.enabled).count(), 1);
    }

    #[test]
    fn test_mutate_toggle_enable_at_most_once() {
        let mut rng = seeded_rng(42);
        let mut genome = xor_seed(1);
        genome.insert_gene(Gene::new(1, 2, 1., true, 7));
        genome.insert_gene(Gene::new(2, 2, 1., true, 8));

        // plenty of iterations, still at most one flip
        genome.mutate_toggle_enable(1000, &mut rng).unwrap();
        assert!(genome.genes.iter().filter(|g| !g.enabled).count() <= 1);
    }

    #[test]
    fn test_mutate_gene_reenable() {
        let mut genome = xor_seed(1);
        genome.genes[1].enabled = false;
        genome.genes[2].enabled = false;

        assert!(genome.mutate_gene_reenable().unwrap());
        assert!(genome.genes[1].enabled);
        assert!(!genome.genes[2].enabled);

        genome.genes[2].enabled = true;
        assert!(!genome.mutate_gene_reenable().unwrap());
    }

    #[test]
    fn test_mutate_connect_sensors() {
        let mut rng = seeded_rng(42);
        let store = InnovationStore::new(100, 100);

        let mut genome = xor_seed(1);
        // orphan the bias
        genome.genes.retain(|g| g.from != 3);
        assert!(genome.mutate_connect_sensors(&store, &mut rng).unwrap());
        assert!(genome.has_link(3, 4, false));
        assert!(genome.verify().is_ok());

        // everything connected now
        assert!(!genome.mutate_connect_sensors(&store, &mut rng).unwrap());
    }

    #[test]
    fn test_mutate_connect_sensors_shares_innovation() {
        let mut rng = seeded_rng(42);
        let store = InnovationStore::new(100, 100);

        let mut first = xor_seed(1);
        first.genes.retain(|g| g.from != 3);
        first.mutate_connect_sensors(&store, &mut rng).unwrap();

        let mut second = xor_seed(2);
        second.genes.retain(|g| g.from != 3);
        second.mutate_connect_sensors(&store, &mut rng).unwrap();

        let find = |g: &Genome| g.genes.iter().find(|x| x.from == 3).unwrap().clone();
        let (a, b) = (find(&first), find(&second));
        assert_eq!(a.innovation, b.innovation);
        assert_eq!(a.weight, b.weight);
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn test_mutate_add_link_feed_forward() {
        let mut rng = seeded_rng(42);
        let store = InnovationStore::new(100, 100);
        let opts = Options {
            recur_only_prob: 0.0,
            new_link_tries: 50,
            ..Options::default()
        };

        // add a hidden node first so a novel feed-forward link exists
        let mut genome = xor_seed(1);
        genome
            .mutate_add_node(&store, &opts, &mut rng)
            .unwrap();

        let before = genome.genes.len();
        let mut added = false;
        for _ in 0..20 {
            if genome.mutate_add_link(&store, &opts, &mut rng).unwrap() {
                added = true;
                break;
            }
        }
        assert!(added);
        assert_eq!(genome.genes.len(), before + 1);
        assert!(genome.verify().is_ok());
        assert!(genome
            .genes
            .windows(2)
            .all(|w| w[0].innovation < w[1].innovation));
        assert!(genome.genes.iter().all(|g| !g.recurrent));
    }

    #[test]
    fn test_mutate_add_link_recurrent_only() {
        let mut rng = seeded_rng(42);
        let store = InnovationStore::new(100, 100);
        let opts = Options {
            recur_only_prob: 1.0,
            new_link_tries: 100,
            ..Options::default()
        };

        let mut genome = xor_seed(1);
        let mut added = false;
        for _ in 0..20 {
            if genome.mutate_add_link(&store, &opts, &mut rng).unwrap() {
                added = true;
                break;
            }
        }
        assert!(added);
        let new_gene = genome.genes.iter().find(|g| g.recurrent).unwrap();
        // destination is never a sensor
        assert!(!genome
            .node_with_id(new_gene.to)
            .unwrap()
            .role
            .is_sensor());
    }

    #[test]
    fn test_mutate_add_node_splits_gene() {
        let mut rng = seeded_rng(42);
        let store = InnovationStore::new(100, 10);
        let opts = Options::default();

        // the gene pick carries a rejection coin, so allow retries
        let mut genome = xor_seed(1);
        let mut split_done = false;
        for _ in 0..100 {
            if genome.mutate_add_node(&store, &opts, &mut rng).unwrap() {
                split_done = true;
                break;
            }
        }
        assert!(split_done);
        assert!(genome.verify().is_ok());

        assert_eq!(genome.nodes.len(), 5);
        assert_eq!(genome.genes.len(), 5);

        let split = genome.genes.iter().find(|g| !g.enabled).unwrap().clone();
        let node = genome.node_with_id(10).unwrap();
        assert_eq!(node.role, NodeRole::Hidden);

        let upstream = genome
            .genes
            .iter()
            .find(|g| g.from == split.from && g.to == 10)
            .unwrap();
        assert_eq!(upstream.weight, 1.0);
        assert_eq!(upstream.recurrent, split.recurrent);

        let downstream = genome
            .genes
            .iter()
            .find(|g| g.from == 10 && g.to == split.to)
            .unwrap();
        assert_eq!(downstream.weight, split.weight);
        assert!(!downstream.recurrent);
    }

    #[test]
    fn test_mutate_add_node_same_split_same_ids() {
        let mut rng = seeded_rng(42);
        let store = InnovationStore::new(100, 10);
        let opts = Options::default();

        // two genomes splitting the same gene within one generation must end
        // up with the same node id and gene innovations
        let mut first = xor_seed(1);
        let mut second = xor_seed(2);
        first.genes.truncate(1);
        second.genes.truncate(1);

        for genome in [&mut first, &mut second] {
            let mut split_done = false;
            for _ in 0..100 {
                if genome.mutate_add_node(&store, &opts, &mut rng).unwrap() {
                    split_done = true;
                    break;
                }
            }
            assert!(split_done);
        }

        assert_eq!(first.last_node_id(), second.last_node_id());
        let tail = |g: &Genome| {
            g.genes
                .iter()
                .filter(|x| x.enabled)
                .map(|x| x.innovation)
                .collect::<Vec<_>>()
        };
        assert_eq!(tail(&first), tail(&second));
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn test_mutate_add_node_never_splits_bias() {
        let mut rng = seeded_rng(42);
        let store = InnovationStore::new(100, 10);
        let opts = Options::default();

        for round in 0..50 {
            let mut genome = xor_seed(round);
            // only the bias gene stays enabled
            genome.genes[0].enabled = false;
            genome.genes[1].enabled = false;
            assert!(!genome.mutate_add_node(&store, &opts, &mut rng).unwrap());
        }
    }

    #[test]
    fn test_mutate_trait_reassignments() {
        let mut rng = seeded_rng(42);
        let mut genome = xor_seed(1);

        genome.mutate_link_trait(10, &mut rng).unwrap();
        genome.mutate_node_trait(10, &mut rng).unwrap();
        let valid: Vec<usize> = genome.traits.iter().map(|t| t.id).collect();
        for gene in &genome.genes {
            assert!(gene.trait_id == 0 || valid.contains(&gene.trait_id));
        }
        for node in &genome.nodes {
            assert!(node.trait_id == 0 || valid.contains(&node.trait_id));
        }
    }

    #[test]
    fn test_mutate_all_nonstructural_short_circuits() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            mutate_link_weights_prob: 1.0,
            ..Options::default()
        };

        let mut empty = Genome::new(1);
        empty.traits = crate::genome::test::three_trait_set();
        // no genes: the weight pass must surface the failure
        assert!(empty.mutate_all_nonstructural(&opts, &mut rng).is_err());

        let mut genome = xor_seed(1);
        assert!(genome.mutate_all_nonstructural(&opts, &mut rng).unwrap());
    }
}
