//! The heritable description of a candidate network: traits, nodes,
//! connection genes and optional module genes, with the operations that treat
//! a genome as a value (duplicate, verify, genesis, compatibility). The
//! mutation operators live in [mutation], crossover in [crossover].
//!
//! Two ordering invariants make everything else cheap: nodes are kept
//! ascending by id, genes ascending by innovation number. Crossover and
//! compatibility are single paired walks because of the latter.

pub mod crossover;
pub mod gene;
pub mod mimo;
pub mod mutation;
pub mod node;
pub mod traits;

pub use gene::Gene;
pub use mimo::MimoControlGene;
pub use node::{Node, NodeRole, NodeType};
pub use traits::{Trait, NUM_TRAIT_PARAMS};

use crate::{
    activation::Activation,
    config::{GenCompatMethod, Options},
    error::{Error, Result},
    network::{Network, NetworkLink, NetworkModule, NetworkNode},
    random::rand_sign,
};
use fxhash::FxHashMap;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub id: usize,
    pub traits: Vec<Trait>,
    pub nodes: Vec<Node>,
    pub genes: Vec<Gene>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "modules")]
    pub control_genes: Vec<MimoControlGene>,
}

impl Genome {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            traits: Vec::new(),
            nodes: Vec::new(),
            genes: Vec::new(),
            control_genes: Vec::new(),
        }
    }

    pub fn with_parts(id: usize, traits: Vec<Trait>, nodes: Vec<Node>, genes: Vec<Gene>) -> Self {
        Self {
            id,
            traits,
            nodes,
            genes,
            control_genes: Vec::new(),
        }
    }

    /// Random seed genome. Node ids are laid out `1..=inputs` (the last input
    /// doubling as the bias), then `max_hidden` hidden ids, then `outputs`
    /// output ids. Connectivity is a Bernoulli sample over the full node x
    /// node matrix at `link_prob`; a sampled cell becomes a gene when its
    /// destination is not a sensor and both endpoints are connectable (hidden
    /// nodes past `hidden` stay isolated). A cell at or below the diagonal is
    /// recurrent and survives only when `recurrent` allows. The innovation
    /// number of each gene is its row-major matrix index.
    #[allow(clippy::too_many_arguments)]
    pub fn new_random(
        id: usize,
        inputs: usize,
        outputs: usize,
        hidden: usize,
        max_hidden: usize,
        recurrent: bool,
        link_prob: f64,
        rng: &mut impl RngCore,
    ) -> Self {
        let total = inputs + outputs + max_hidden;
        let first_output = total - outputs + 1;

        let mut genome = Genome::new(id);
        genome.traits.push(Trait::with_params(1, [0.1, 0., 0., 0., 0., 0., 0., 0.]));

        for node_id in 1..=total {
            let role = if node_id <= inputs {
                if node_id == inputs {
                    NodeRole::Bias
                } else {
                    NodeRole::Input
                }
            } else if node_id < first_output {
                NodeRole::Hidden
            } else {
                NodeRole::Output
            };
            genome
                .nodes
                .push(Node::new(node_id, role, Activation::default()));
        }

        let connectable =
            |n: usize| (n >= 1 && n <= inputs + hidden) || (n >= first_output && n <= total);

        for row in 1..=total {
            for col in 1..=total {
                let idx = (row - 1) * total + (col - 1);
                if rng.random::<f64>() >= link_prob {
                    continue;
                }
                if col <= inputs || !connectable(row) || !connectable(col) {
                    continue;
                }
                let recurrent_link = col <= row;
                if recurrent_link && !recurrent {
                    continue;
                }

                let weight = rand_sign(rng) * rng.random::<f64>();
                let mut gene = Gene::new(row, col, weight, recurrent_link, idx as i64);
                gene.trait_id = 1;
                genome.genes.push(gene);
            }
        }

        genome
    }

    pub fn trait_with_id(&self, id: usize) -> Option<&Trait> {
        self.traits.iter().find(|t| t.id == id)
    }

    /// Binary search over the id-sorted node list.
    pub fn node_with_id(&self, id: usize) -> Option<&Node> {
        self.nodes
            .binary_search_by(|n| n.id.cmp(&id))
            .ok()
            .map(|idx| &self.nodes[idx])
    }

    pub fn has_link(&self, from: usize, to: usize, recurrent: bool) -> bool {
        self.genes
            .iter()
            .any(|g| g.from == from && g.to == to && g.recurrent == recurrent)
    }

    /// Insert preserving ascending node ids.
    pub fn insert_node(&mut self, node: Node) {
        let at = self.nodes.partition_point(|n| n.id <= node.id);
        self.nodes.insert(at, node);
    }

    /// Insert preserving ascending innovation numbers.
    pub fn insert_gene(&mut self, gene: Gene) {
        let at = self.genes.partition_point(|g| g.innovation < gene.innovation);
        self.genes.insert(at, gene);
    }

    pub fn last_node_id(&self) -> usize {
        self.nodes.last().map(|n| n.id).unwrap_or(0)
    }

    pub fn last_gene_innovation(&self) -> i64 {
        self.genes.last().map(|g| g.innovation).unwrap_or(0)
    }

    /// Deep copy under a new id. Trait and node references are carried by id,
    /// so the copy re-resolves them and surfaces any dangling endpoint as an
    /// invariant violation in the source.
    pub fn duplicate(&self, new_id: usize) -> Result<Genome> {
        let copy = Genome {
            id: new_id,
            traits: self.traits.clone(),
            nodes: self.nodes.clone(),
            genes: self.genes.clone(),
            control_genes: self.control_genes.clone(),
        };

        for gene in &copy.genes {
            for end in [gene.from, gene.to] {
                if copy.node_with_id(end).is_none() {
                    return Err(Error::malformed(
                        self.id,
                        format!("gene {} references missing node {end}", gene.innovation),
                    ));
                }
            }
        }

        Ok(copy)
    }

    /// Structural soundness check, run by tests after every operator and by
    /// loaders on untrusted input.
    pub fn verify(&self) -> Result<()> {
        if self.genes.is_empty() {
            return Err(Error::malformed(self.id, "no genes"));
        }
        if self.nodes.is_empty() {
            return Err(Error::malformed(self.id, "no nodes"));
        }
        if self.traits.is_empty() {
            return Err(Error::malformed(self.id, "no traits"));
        }

        for gene in &self.genes {
            for end in [gene.from, gene.to] {
                if self.node_with_id(end).is_none() {
                    return Err(Error::malformed(
                        self.id,
                        format!("gene {} references missing node {end}", gene.innovation),
                    ));
                }
            }
        }

        for pair in self.nodes.windows(2) {
            if pair[1].id < pair[0].id {
                return Err(Error::malformed(
                    self.id,
                    format!("node {} out of order", pair[1].id),
                ));
            }
        }

        for (idx, gene) in self.genes.iter().enumerate() {
            if self.genes[idx + 1..].iter().any(|g| g.genetically_eq(gene)) {
                return Err(Error::malformed(
                    self.id,
                    format!("duplicate gene {}->{}", gene.from, gene.to),
                ));
            }
        }

        // large genomes must not carry runs of dead genes
        if self.nodes.len() > 500 {
            for pair in self.genes.windows(2) {
                if !pair[0].enabled && !pair[1].enabled {
                    return Err(Error::malformed(self.id, "two disabled genes in a row"));
                }
            }
        }

        Ok(())
    }

    /// Build the phenotype. Every genome node gets an arena slot, every
    /// enabled gene a link wired into both endpoints, and every enabled
    /// module gene a control node fed by weight-1 links from its IO inputs
    /// and driving its IO outputs.
    pub fn genesis(&self, net_id: usize) -> Result<Network> {
        if self.genes.is_empty() {
            return Err(Error::GenesisNoGenes(self.id));
        }

        let mut nodes = Vec::with_capacity(self.nodes.len() + self.control_genes.len());
        let mut index_of = FxHashMap::default();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for node in &self.nodes {
            let idx = nodes.len();
            index_of.insert(node.id, idx);
            match node.role {
                NodeRole::Input | NodeRole::Bias => inputs.push(idx),
                NodeRole::Output => outputs.push(idx),
                NodeRole::Hidden => {}
            }
            nodes.push(NetworkNode::new(
                node.id,
                node.role,
                node.activation,
                node.trait_id,
            ));
        }

        if outputs.is_empty() {
            return Err(Error::GenesisNoOutputs(self.id));
        }

        let resolve = |index_of: &FxHashMap<usize, usize>, id: usize| {
            index_of.get(&id).copied().ok_or_else(|| {
                Error::malformed(self.id, format!("link references missing node {id}"))
            })
        };

        let mut links: Vec<NetworkLink> = Vec::with_capacity(self.genes.len());
        for gene in self.genes.iter().filter(|g| g.enabled) {
            let from = resolve(&index_of, gene.from)?;
            let to = resolve(&index_of, gene.to)?;
            let l = links.len();
            links.push(NetworkLink {
                from,
                to,
                weight: gene.weight,
                recurrent: gene.recurrent,
            });
            nodes[to].incoming.push(l);
            nodes[from].outgoing.push(l);
        }

        let mut modules = Vec::new();
        for cg in self.control_genes.iter().filter(|c| c.enabled) {
            let control = nodes.len();
            nodes.push(NetworkNode::new(
                cg.node.id,
                cg.node.role,
                cg.node.activation,
                cg.node.trait_id,
            ));

            let mut incoming = Vec::with_capacity(cg.inputs.len());
            for io in &cg.inputs {
                let from = resolve(&index_of, io.id)?;
                let l = links.len();
                links.push(NetworkLink {
                    from,
                    to: control,
                    weight: 1.,
                    recurrent: false,
                });
                nodes[control].incoming.push(l);
                nodes[from].outgoing.push(l);
                incoming.push(l);
            }

            let mut outgoing = Vec::with_capacity(cg.outputs.len());
            for io in &cg.outputs {
                let to = resolve(&index_of, io.id)?;
                let l = links.len();
                links.push(NetworkLink {
                    from: control,
                    to,
                    weight: 1.,
                    recurrent: false,
                });
                nodes[to].incoming.push(l);
                nodes[control].outgoing.push(l);
                outgoing.push(l);
            }

            modules.push(NetworkModule {
                node: control,
                incoming,
                outgoing,
            });
        }

        Ok(Network::from_parts(
            net_id, nodes, links, inputs, outputs, modules,
        ))
    }

    /// Genomic distance to another genome under the configured coefficients
    /// and walk strategy.
    pub fn compatibility(&self, other: &Genome, opts: &Options) -> f64 {
        match opts.gen_compat_method {
            GenCompatMethod::Linear => self.compat_linear(other, opts),
            GenCompatMethod::Fast => self.compat_fast(other, opts),
        }
    }

    /// Forward paired walk over the innovation-sorted gene lists.
    pub fn compat_linear(&self, other: &Genome, opts: &Options) -> f64 {
        let (g1, g2) = (&self.genes, &other.genes);
        let (mut i1, mut i2) = (0usize, 0usize);
        let (mut disjoint, mut excess, mut matching) = (0usize, 0usize, 0usize);
        let mut mut_diff = 0.;

        while i1 < g1.len() || i2 < g2.len() {
            if i1 >= g1.len() {
                excess += 1;
                i2 += 1;
            } else if i2 >= g2.len() {
                excess += 1;
                i1 += 1;
            } else {
                let (in1, in2) = (g1[i1].innovation, g2[i2].innovation);
                match in1.cmp(&in2) {
                    core::cmp::Ordering::Equal => {
                        matching += 1;
                        mut_diff += (g1[i1].mutation_num - g2[i2].mutation_num).abs();
                        i1 += 1;
                        i2 += 1;
                    }
                    core::cmp::Ordering::Less => {
                        disjoint += 1;
                        i1 += 1;
                    }
                    core::cmp::Ordering::Greater => {
                        disjoint += 1;
                        i2 += 1;
                    }
                }
            }
        }

        compat_score(opts, disjoint, excess, matching, mut_diff)
    }

    /// Backward paired walk from the gene list tails. Genes popped from one
    /// side before the other side has yielded anything are excess; once both
    /// sides have moved, every mismatch is disjoint. Equivalent to
    /// [compat_linear](Genome::compat_linear) on well-formed genomes.
    pub fn compat_fast(&self, other: &Genome, opts: &Options) -> f64 {
        #[derive(PartialEq)]
        enum ExcessSide {
            Unknown,
            Left,
            Right,
            Done,
        }

        let (g1, g2) = (&self.genes, &other.genes);
        if g1.is_empty() && g2.is_empty() {
            return 0.;
        }
        if g1.is_empty() {
            return compat_score(opts, 0, g2.len(), 0, 0.);
        }
        if g2.is_empty() {
            return compat_score(opts, 0, g1.len(), 0, 0.);
        }

        let (mut i1, mut i2) = (g1.len() as isize - 1, g2.len() as isize - 1);
        let (mut disjoint, mut excess, mut matching) = (0usize, 0usize, 0usize);
        let mut mut_diff = 0.;
        let mut side = ExcessSide::Unknown;

        while i1 >= 0 && i2 >= 0 {
            let (a, b) = (&g1[i1 as usize], &g2[i2 as usize]);
            match a.innovation.cmp(&b.innovation) {
                core::cmp::Ordering::Equal => {
                    side = ExcessSide::Done;
                    matching += 1;
                    mut_diff += (a.mutation_num - b.mutation_num).abs();
                    i1 -= 1;
                    i2 -= 1;
                }
                core::cmp::Ordering::Greater => {
                    match side {
                        ExcessSide::Unknown | ExcessSide::Left => {
                            side = ExcessSide::Left;
                            excess += 1;
                        }
                        _ => {
                            side = ExcessSide::Done;
                            disjoint += 1;
                        }
                    }
                    i1 -= 1;
                }
                core::cmp::Ordering::Less => {
                    match side {
                        ExcessSide::Unknown | ExcessSide::Right => {
                            side = ExcessSide::Right;
                            excess += 1;
                        }
                        _ => {
                            side = ExcessSide::Done;
                            disjoint += 1;
                        }
                    }
                    i2 -= 1;
                }
            }
        }

        // everything left at the front of the longer side sits below the
        // other's ceiling, so it is disjoint
        disjoint += (i1 + 1).max(0) as usize;
        disjoint += (i2 + 1).max(0) as usize;

        compat_score(opts, disjoint, excess, matching, mut_diff)
    }

    /// Count of enabled genes, the genome's effective wiring size.
    pub fn extrons(&self) -> usize {
        self.genes.iter().filter(|g| g.enabled).count()
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

impl core::fmt::Display for Genome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "genome {}: {} nodes, {}/{} genes, {} traits",
            self.id,
            self.nodes.len(),
            self.extrons(),
            self.genes.len(),
            self.traits.len(),
        )?;
        if !self.control_genes.is_empty() {
            write!(f, ", {} modules", self.control_genes.len())?;
        }
        Ok(())
    }
}

fn compat_score(opts: &Options, disjoint: usize, excess: usize, matching: usize, mut_diff: f64) -> f64 {
    let mut_term = if matching > 0 {
        mut_diff / matching as f64
    } else {
        0.
    };
    opts.disjoint_coeff * disjoint as f64 + opts.excess_coeff * excess as f64
        + opts.mutdiff_coeff * mut_term
}
