//! The three crossover operators. All of them pair the parents' traits
//! position-wise into averaged child traits, pre-seed the child with the
//! second parent's input/bias/output nodes (so a sensor no gene touches still
//! survives), then merge the innovation-sorted gene lists. Endpoint nodes are
//! copied into the child on demand, and module genes whose IO overlaps the
//! child are grafted in afterwards.

use crate::{
    error::{Error, Result},
    genome::{mimo::MimoControlGene, node::NodeRole, Gene, Genome, Node, Trait},
};
use core::cmp::Ordering;
use rand::{Rng, RngCore};
use std::collections::HashSet;

impl Genome {
    /// Multipoint crossover: matching genes are picked from either parent at
    /// random, mismatched genes are inherited from the fitter parent only.
    pub fn mate_multipoint(
        &self,
        other: &Genome,
        new_id: usize,
        fitness1: f64,
        fitness2: f64,
        rng: &mut impl RngCore,
    ) -> Result<Genome> {
        let child_traits = averaged_traits(self, other)?;
        let mut child_nodes = seed_io_nodes(other, &child_traits);
        let mut child_genes: Vec<Gene> = Vec::with_capacity(self.genes.len().max(other.genes.len()));

        let p1_better = fitness1 > fitness2
            || (fitness1 == fitness2 && self.genes.len() < other.genes.len());

        let (mut i1, mut i2) = (0usize, 0usize);
        while i1 < self.genes.len() || i2 < other.genes.len() {
            let (gene, owners, skip, disable) = if i1 >= self.genes.len() {
                let g = &other.genes[i2];
                i2 += 1;
                (g.clone(), (other, self), p1_better, false)
            } else if i2 >= other.genes.len() {
                let g = &self.genes[i1];
                i1 += 1;
                (g.clone(), (self, other), !p1_better, false)
            } else {
                let (g1, g2) = (&self.genes[i1], &other.genes[i2]);
                match g1.innovation.cmp(&g2.innovation) {
                    Ordering::Equal => {
                        let disable = child_disabled(g1, g2, rng);
                        let (g, owners) = if rng.random::<f64>() < 0.5 {
                            (g1, (self, other))
                        } else {
                            (g2, (other, self))
                        };
                        i1 += 1;
                        i2 += 1;
                        (g.clone(), owners, false, disable)
                    }
                    Ordering::Less => {
                        let g = &self.genes[i1];
                        i1 += 1;
                        (g.clone(), (self, other), !p1_better, false)
                    }
                    Ordering::Greater => {
                        let g = &other.genes[i2];
                        i2 += 1;
                        (g.clone(), (other, self), p1_better, false)
                    }
                }
            };

            if skip || child_genes.iter().any(|g| g.genetically_eq(&gene)) {
                continue;
            }

            ensure_endpoints(&mut child_nodes, &gene, owners.0, owners.1, &child_traits)?;
            let mut new_gene = gene.clone();
            new_gene.trait_id = resolved_trait_id(owners.0, gene.trait_id, &child_traits);
            if disable {
                new_gene.enabled = false;
            }
            child_genes.push(new_gene);
        }

        let mut child = Genome {
            id: new_id,
            traits: child_traits,
            nodes: child_nodes,
            genes: child_genes,
            control_genes: Vec::new(),
        };
        inherit_modules(self, other, &mut child);
        Ok(child)
    }

    /// Like multipoint, but matching gene pairs blend into one averaged gene:
    /// mean weight and mutation counter, endpoints/trait/recurrence each
    /// drawn from one parent at random, innovation from the first parent.
    pub fn mate_multipoint_avg(
        &self,
        other: &Genome,
        new_id: usize,
        fitness1: f64,
        fitness2: f64,
        rng: &mut impl RngCore,
    ) -> Result<Genome> {
        let child_traits = averaged_traits(self, other)?;
        let mut child_nodes = seed_io_nodes(other, &child_traits);
        let mut child_genes: Vec<Gene> = Vec::with_capacity(self.genes.len().max(other.genes.len()));

        let p1_better = fitness1 > fitness2
            || (fitness1 == fitness2 && self.genes.len() < other.genes.len());

        let (mut i1, mut i2) = (0usize, 0usize);
        while i1 < self.genes.len() || i2 < other.genes.len() {
            let (gene, owners, skip) = if i1 >= self.genes.len() {
                let g = &other.genes[i2];
                i2 += 1;
                (resolved_gene(other, g, &child_traits), (other, self), p1_better)
            } else if i2 >= other.genes.len() {
                let g = &self.genes[i1];
                i1 += 1;
                (resolved_gene(self, g, &child_traits), (self, other), !p1_better)
            } else {
                let (g1, g2) = (&self.genes[i1], &other.genes[i2]);
                match g1.innovation.cmp(&g2.innovation) {
                    Ordering::Equal => {
                        let avg = averaged_gene(self, g1, other, g2, &child_traits, rng);
                        i1 += 1;
                        i2 += 1;
                        (avg, (self, other), false)
                    }
                    Ordering::Less => {
                        let g = &self.genes[i1];
                        i1 += 1;
                        (resolved_gene(self, g, &child_traits), (self, other), !p1_better)
                    }
                    Ordering::Greater => {
                        let g = &other.genes[i2];
                        i2 += 1;
                        (resolved_gene(other, g, &child_traits), (other, self), p1_better)
                    }
                }
            };

            if skip || child_genes.iter().any(|g| g.genetically_eq(&gene)) {
                continue;
            }

            ensure_endpoints(&mut child_nodes, &gene, owners.0, owners.1, &child_traits)?;
            child_genes.push(gene);
        }

        let mut child = Genome {
            id: new_id,
            traits: child_traits,
            nodes: child_nodes,
            genes: child_genes,
            control_genes: Vec::new(),
        };
        inherit_modules(self, other, &mut child);
        Ok(child)
    }

    /// Single-point crossover: a cut position is drawn in the shorter gene
    /// list; matching positions before it come from the shorter parent, the
    /// pair at the cut is averaged, and everything after comes from the
    /// longer parent. Mismatches on the wrong side of the cut are dropped.
    pub fn mate_singlepoint(
        &self,
        other: &Genome,
        new_id: usize,
        _fitness1: f64,
        _fitness2: f64,
        rng: &mut impl RngCore,
    ) -> Result<Genome> {
        let child_traits = averaged_traits(self, other)?;
        let mut child_nodes = seed_io_nodes(other, &child_traits);
        let mut child_genes: Vec<Gene> = Vec::new();

        let (shorter, longer): (&Genome, &Genome) = if self.genes.len() < other.genes.len() {
            (self, other)
        } else {
            (other, self)
        };

        let crosspoint = if shorter.genes.is_empty() {
            0
        } else {
            rng.random_range(0..shorter.genes.len())
        };

        let (mut i1, mut i2) = (0usize, 0usize);
        let mut position = 0usize;
        while i1 < shorter.genes.len() || i2 < longer.genes.len() {
            let (gene, owners) = if i1 >= shorter.genes.len() {
                let g = &longer.genes[i2];
                i2 += 1;
                (resolved_gene(longer, g, &child_traits), (longer, shorter))
            } else if i2 >= longer.genes.len() {
                // shorter's tail past the longer parent: wrong side of the cut
                i1 += 1;
                continue;
            } else {
                let (gs, gl) = (&shorter.genes[i1], &longer.genes[i2]);
                match gs.innovation.cmp(&gl.innovation) {
                    Ordering::Equal => {
                        let picked = match position.cmp(&crosspoint) {
                            Ordering::Less => resolved_gene(shorter, gs, &child_traits),
                            Ordering::Equal => {
                                averaged_gene(shorter, gs, longer, gl, &child_traits, rng)
                            }
                            Ordering::Greater => resolved_gene(longer, gl, &child_traits),
                        };
                        i1 += 1;
                        i2 += 1;
                        position += 1;
                        (picked, (shorter, longer))
                    }
                    Ordering::Less => {
                        if position < crosspoint {
                            let g = &shorter.genes[i1];
                            i1 += 1;
                            position += 1;
                            (resolved_gene(shorter, g, &child_traits), (shorter, longer))
                        } else {
                            i1 += 1;
                            continue;
                        }
                    }
                    Ordering::Greater => {
                        if position < crosspoint {
                            i2 += 1;
                            continue;
                        } else {
                            let g = &longer.genes[i2];
                            i2 += 1;
                            (resolved_gene(longer, g, &child_traits), (longer, shorter))
                        }
                    }
                }
            };

            if child_genes.iter().any(|g| g.genetically_eq(&gene)) {
                continue;
            }

            ensure_endpoints(&mut child_nodes, &gene, owners.0, owners.1, &child_traits)?;
            child_genes.push(gene);
        }

        let mut child = Genome {
            id: new_id,
            traits: child_traits,
            nodes: child_nodes,
            genes: child_genes,
            control_genes: Vec::new(),
        };
        inherit_modules(self, other, &mut child);
        Ok(child)
    }
}

fn averaged_traits(p1: &Genome, p2: &Genome) -> Result<Vec<Trait>> {
    if p1.traits.len() != p2.traits.len() {
        return Err(Error::TraitLengthMismatch(p1.traits.len(), p2.traits.len()));
    }
    Ok(p1
        .traits
        .iter()
        .zip(&p2.traits)
        .map(|(a, b)| Trait::average(a, b))
        .collect())
}

/// Position of a trait reference within its owner's trait list; unassigned
/// and unknown references fold onto the first position.
fn trait_position(owner: &Genome, trait_id: usize) -> usize {
    if trait_id == 0 {
        return 0;
    }
    owner
        .traits
        .iter()
        .position(|t| t.id == trait_id)
        .unwrap_or(0)
}

/// The child trait corresponding to a parent's trait reference.
fn resolved_trait_id(owner: &Genome, trait_id: usize, child_traits: &[Trait]) -> usize {
    child_traits
        .get(trait_position(owner, trait_id))
        .map(|t| t.id)
        .unwrap_or(0)
}

/// Copies of every non-hidden node of the given parent, traits re-resolved.
/// Keeps disconnected sensors alive through crossover.
fn seed_io_nodes(parent: &Genome, child_traits: &[Trait]) -> Vec<Node> {
    parent
        .nodes
        .iter()
        .filter(|n| n.role != NodeRole::Hidden)
        .map(|n| n.copy_with_trait(resolved_trait_id(parent, n.trait_id, child_traits)))
        .collect()
}

/// Either both parents carry the gene disabled, or one does and a 0.75 coin
/// lands. The asymmetric one-sided case must keep its coin; do not simplify.
fn child_disabled(g1: &Gene, g2: &Gene, rng: &mut impl RngCore) -> bool {
    let both = !g1.enabled && !g2.enabled;
    let either = !g1.enabled || !g2.enabled;
    both || (either && rng.random::<f64>() < 0.75)
}

/// A straight copy with the trait reference mapped into the child.
fn resolved_gene(owner: &Genome, gene: &Gene, child_traits: &[Trait]) -> Gene {
    let mut copy = gene.clone();
    copy.trait_id = resolved_trait_id(owner, gene.trait_id, child_traits);
    copy
}

/// Blend a matching gene pair: mean weight and mutation counter, everything
/// categorical picked from one side at random, innovation from parent 1.
fn averaged_gene(
    p1: &Genome,
    g1: &Gene,
    p2: &Genome,
    g2: &Gene,
    child_traits: &[Trait],
    rng: &mut impl RngCore,
) -> Gene {
    let mut coin = || rng.random::<f64>() < 0.5;
    let trait_id = if coin() {
        resolved_trait_id(p1, g1.trait_id, child_traits)
    } else {
        resolved_trait_id(p2, g2.trait_id, child_traits)
    };
    let from = if coin() { g1.from } else { g2.from };
    let to = if coin() { g1.to } else { g2.to };
    let recurrent = if coin() { g1.recurrent } else { g2.recurrent };

    Gene {
        from,
        to,
        weight: (g1.weight + g2.weight) / 2.,
        recurrent,
        trait_id,
        innovation: g1.innovation,
        mutation_num: (g1.mutation_num + g2.mutation_num) / 2.,
        enabled: !child_disabled(g1, g2, rng),
    }
}

fn insert_node_sorted(nodes: &mut Vec<Node>, node: Node) {
    let at = nodes.partition_point(|n| n.id <= node.id);
    nodes.insert(at, node);
}

/// Make sure both endpoints of an inherited gene exist in the child,
/// copying the node from whichever parent knows it.
fn ensure_endpoints(
    child_nodes: &mut Vec<Node>,
    gene: &Gene,
    owner: &Genome,
    fallback: &Genome,
    child_traits: &[Trait],
) -> Result<()> {
    for end in [gene.from, gene.to] {
        if child_nodes.iter().any(|n| n.id == end) {
            continue;
        }

        let (source, node) = match owner.node_with_id(end) {
            Some(n) => (owner, n),
            None => match fallback.node_with_id(end) {
                Some(n) => (fallback, n),
                None => {
                    return Err(Error::malformed(
                        owner.id,
                        format!("inherited gene references missing node {end}"),
                    ))
                }
            },
        };

        insert_node_sorted(
            child_nodes,
            node.copy_with_trait(resolved_trait_id(source, node.trait_id, child_traits)),
        );
    }
    Ok(())
}

/// Graft every parental module whose IO set overlaps the child, pulling in
/// any IO nodes the child is still missing.
fn inherit_modules(p1: &Genome, p2: &Genome, child: &mut Genome) {
    let ids: HashSet<usize> = child.nodes.iter().map(|n| n.id).collect();

    let mut modules: Vec<MimoControlGene> = Vec::new();
    for parent in [p1, p2] {
        for cg in &parent.control_genes {
            if cg.has_intersection(&ids) && !modules.iter().any(|m| m.innovation == cg.innovation)
            {
                modules.push(cg.clone());
            }
        }
    }
    if modules.is_empty() {
        return;
    }

    for cg in &modules {
        for io in cg.io_nodes() {
            if !child.nodes.iter().any(|n| n.id == io.id) {
                insert_node_sorted(&mut child.nodes, io.clone());
            }
        }
    }
    child.control_genes = modules;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        activation::Activation,
        assert_f64_approx,
        genome::test::{three_trait_set, xor_seed},
        random::seeded_rng,
    };

    /// xor_seed plus two hidden nodes, three extra genes and one module over
    /// IO nodes {5, 6, 9}.
    fn modular_partner(id: usize) -> Genome {
        let mut genome = xor_seed(id);
        genome.insert_node(Node::new(5, NodeRole::Hidden, Activation::default()));
        genome.insert_node(Node::new(6, NodeRole::Hidden, Activation::default()));
        genome.insert_gene(Gene::new(1, 5, 0.7, false, 4));
        genome.insert_gene(Gene::new(5, 4, 0.9, false, 5));
        genome.insert_gene(Gene::new(2, 6, -0.7, false, 6));
        genome.control_genes.push(MimoControlGene::new(
            Node::new(20, NodeRole::Hidden, Activation::Multiply),
            vec![
                Node::new(5, NodeRole::Hidden, Activation::default()),
                Node::new(6, NodeRole::Hidden, Activation::default()),
            ],
            vec![Node::new(9, NodeRole::Hidden, Activation::default())],
            7,
        ));
        genome
    }

    #[test]
    fn test_multipoint_no_foreign_innovations() {
        let mut rng = seeded_rng(42);
        let p1 = xor_seed(1);
        let p2 = modular_partner(2);

        let union: HashSet<i64> = p1
            .genes
            .iter()
            .chain(p2.genes.iter())
            .map(|g| g.innovation)
            .collect();

        for round in 0..100 {
            let child = p1
                .mate_multipoint(&p2, round, 1.0, 2.0, &mut rng)
                .unwrap();
            assert!(child.genes.iter().all(|g| union.contains(&g.innovation)));
            assert!(child.verify().is_ok());
        }
    }

    #[test]
    fn test_multipoint_better_parent_keeps_excess() {
        let mut rng = seeded_rng(42);
        let p1 = xor_seed(1);
        let p2 = modular_partner(2);

        // p2 fitter: its disjoint/excess genes survive
        let child = p1.mate_multipoint(&p2, 1, 1.0, 2.0, &mut rng).unwrap();
        assert_eq!(child.genes.len(), 6);

        // p1 fitter: only the shared range survives
        let child = p1.mate_multipoint(&p2, 1, 2.0, 1.0, &mut rng).unwrap();
        assert_eq!(child.genes.len(), 3);
    }

    #[test]
    fn test_multipoint_modular_inheritance_counts() {
        let mut rng = seeded_rng(42);
        let p1 = xor_seed(1);
        let p2 = modular_partner(2);

        let child = p1.mate_multipoint(&p2, 1, 1.0, 2.0, &mut rng).unwrap();
        assert_eq!(child.genes.len(), 6);
        // 4 io-seeded + hidden 5, 6 + module io node 9
        assert_eq!(child.nodes.len(), 7);
        assert_eq!(child.traits.len(), 3);
        assert_eq!(child.control_genes.len(), 1);
        assert!(child.nodes.iter().any(|n| n.id == 9));
    }

    #[test]
    fn test_plain_parents_make_plain_child() {
        let mut rng = seeded_rng(42);
        let p1 = xor_seed(1);
        let p2 = xor_seed(2);
        let child = p1.mate_multipoint(&p2, 1, 1.0, 1.0, &mut rng).unwrap();
        assert!(child.control_genes.is_empty());
    }

    #[test]
    fn test_trait_length_mismatch() {
        let mut rng = seeded_rng(42);
        let p1 = xor_seed(1);
        let mut p2 = xor_seed(2);
        p2.traits.pop();

        assert!(matches!(
            p1.mate_multipoint(&p2, 1, 1.0, 1.0, &mut rng),
            Err(Error::TraitLengthMismatch(3, 2))
        ));
        assert!(p1.mate_multipoint_avg(&p2, 1, 1.0, 1.0, &mut rng).is_err());
        assert!(p1.mate_singlepoint(&p2, 1, 1.0, 1.0, &mut rng).is_err());
    }

    #[test]
    fn test_traits_averaged() {
        let mut rng = seeded_rng(42);
        let mut p1 = xor_seed(1);
        let mut p2 = xor_seed(2);
        p1.traits = three_trait_set();
        p2.traits = three_trait_set();
        p1.traits[0].params[0] = 0.2;
        p2.traits[0].params[0] = 0.6;

        let child = p1.mate_multipoint(&p2, 1, 1.0, 1.0, &mut rng).unwrap();
        assert_eq!(child.traits.len(), 3);
        assert_f64_approx!(child.traits[0].params[0], 0.4);
    }

    #[test]
    fn test_multipoint_avg_blends_matching() {
        let mut rng = seeded_rng(42);
        let mut p1 = xor_seed(1);
        let mut p2 = xor_seed(2);
        for g in &mut p1.genes {
            g.weight = 1.0;
            g.mutation_num = 1.0;
        }
        for g in &mut p2.genes {
            g.weight = 3.0;
            g.mutation_num = 2.0;
        }

        let child = p1.mate_multipoint_avg(&p2, 1, 1.0, 1.0, &mut rng).unwrap();
        assert_eq!(child.genes.len(), 3);
        for gene in &child.genes {
            assert_f64_approx!(gene.weight, 2.0);
            assert_f64_approx!(gene.mutation_num, 1.5);
        }
    }

    #[test]
    fn test_singlepoint_shapes() {
        let mut rng = seeded_rng(42);

        // shorter parent: single gene at innovation 1
        let mut p1 = xor_seed(1);
        p1.genes.truncate(1);
        p1.genes[0].weight = 2.0;
        // longer parent shares innovation 1 at a different weight
        let mut p2 = xor_seed(2);
        p2.genes[0].weight = 4.0;

        let child = p1.mate_singlepoint(&p2, 1, 1.0, 1.0, &mut rng).unwrap();
        assert_eq!(child.genes.len(), 3);
        // crosspoint is forced to 0, so the shared gene is averaged
        assert_f64_approx!(child.genes[0].weight, 3.0);
        assert!(child.verify().is_ok());
    }

    #[test]
    fn test_disconnected_sensor_survives() {
        let mut rng = seeded_rng(42);
        let p1 = xor_seed(1);
        let mut p2 = xor_seed(2);
        // orphan an input of the second parent entirely
        p2.genes.retain(|g| g.from != 2);

        for _ in 0..50 {
            // p2 is fitter, so p1's gene out of node 2 is skipped; the node
            // itself must still ride in on the pre-seeded io copies
            let child = p1.mate_multipoint(&p2, 1, 1.0, 2.0, &mut rng).unwrap();
            assert!(child.nodes.iter().any(|n| n.id == 2));
            assert!(child.genes.iter().all(|g| g.from != 2));
        }
    }

    #[test]
    fn test_children_stay_sorted() {
        let mut rng = seeded_rng(42);
        let p1 = xor_seed(1);
        let p2 = modular_partner(2);

        for round in 0..50 {
            for child in [
                p1.mate_multipoint(&p2, round, 1.0, 2.0, &mut rng).unwrap(),
                p1.mate_multipoint_avg(&p2, round, 1.0, 2.0, &mut rng).unwrap(),
                p1.mate_singlepoint(&p2, round, 1.0, 2.0, &mut rng).unwrap(),
            ] {
                assert!(child
                    .genes
                    .windows(2)
                    .all(|w| w[0].innovation <= w[1].innovation));
                assert!(child.nodes.windows(2).all(|w| w[0].id <= w[1].id));
            }
        }
    }
}
