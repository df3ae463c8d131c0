//! The classic XOR benchmark: a minimal fully-connected seed has no way to
//! separate the inputs, so solving it forces the engine to grow hidden
//! structure. Activation of the evolved networks lives here in the driver, a
//! few relaxation sweeps over a flat state vector.

use sylveon::{
    error::CancelToken,
    genome::{Gene, Node, NodeRole, Trait},
    network::Network,
    random::default_rng,
    Activation, EpochExecutor, Genome, Options, Population,
};

const PATTERNS: [([f64; 2], f64); 4] = [
    ([0., 0.], 0.),
    ([0., 1.], 1.),
    ([1., 0.], 1.),
    ([1., 1.], 0.),
];

fn xor_seed() -> Genome {
    let traits = vec![
        Trait::with_params(1, [0.1, 0., 0., 0., 0., 0., 0., 0.]),
        Trait::with_params(2, [0.2, 0., 0., 0., 0., 0., 0., 0.]),
        Trait::with_params(3, [0.3, 0., 0., 0., 0., 0., 0., 0.]),
    ];
    let nodes = vec![
        Node::with_trait(1, NodeRole::Input, Activation::SigmoidSteepened, 1),
        Node::with_trait(2, NodeRole::Input, Activation::SigmoidSteepened, 1),
        Node::with_trait(3, NodeRole::Bias, Activation::SigmoidSteepened, 1),
        Node::with_trait(4, NodeRole::Output, Activation::SigmoidSteepened, 1),
    ];
    let genes = vec![
        Gene::new(1, 4, 1.0, false, 1),
        Gene::new(2, 4, -1.0, false, 2),
        Gene::new(3, 4, 0.5, false, 3),
    ];
    Genome::with_parts(1, traits, nodes, genes)
}

/// Relax the network over a flat state vector. Sensors hold their input, the
/// bias holds 1, everything else squashes its weighted incoming sum.
fn activate(net: &Network, inputs: &[f64]) -> Vec<f64> {
    let mut state = vec![0.; net.node_count()];
    let mut next_input = inputs.iter();
    for &idx in net.inputs() {
        state[idx] = match net.nodes()[idx].role {
            NodeRole::Bias => 1.,
            _ => next_input.next().copied().unwrap_or(0.),
        };
    }

    let sweeps = net.node_count().max(2);
    for _ in 0..sweeps {
        let mut sums = vec![0.; net.node_count()];
        for link in net.links() {
            sums[link.to] += state[link.from] * link.weight;
        }
        for (idx, node) in net.nodes().iter().enumerate() {
            if !node.role.is_sensor() {
                state[idx] = node.activation.apply(sums[idx]);
            }
        }
    }

    net.outputs().iter().map(|&idx| state[idx]).collect()
}

/// Error is the summed distance from the truth table; fitness rewards
/// getting all four patterns right at once.
fn score(population: &mut Population) {
    for organism in population.organisms_mut() {
        let Some(net) = organism.phenotype.as_ref() else {
            continue;
        };
        let mut error = 0.;
        for (input, want) in PATTERNS {
            let out = activate(net, &input);
            error += (out[0] - want).abs();
        }
        organism.error = error;
        organism.fitness = (4. - error).powi(2);
        organism.winner = PATTERNS
            .iter()
            .all(|(input, want)| (activate(net, input)[0] - want).abs() < 0.5);
    }
}

fn main() {
    env_logger::init();
    let mut rng = default_rng();

    let opts = Options {
        pop_size: 200,
        mutate_add_node_prob: 0.03,
        mutate_add_link_prob: 0.08,
        ..Options::default()
    };

    let mut population = Population::spawn(&xor_seed(), &opts, &mut rng).expect("spawn");
    let executor = EpochExecutor::from_options(&opts);

    for generation in 1..=opts.num_generations {
        score(&mut population);

        let (champ_error, champ_won, champ_summary) = {
            let champion = population
                .organisms()
                .max_by(|a, b| {
                    a.fitness
                        .partial_cmp(&b.fitness)
                        .unwrap_or(core::cmp::Ordering::Equal)
                })
                .expect("non-empty population");
            (champion.error, champion.winner, champion.genome.to_string())
        };
        println!("generation {generation}: champion error {champ_error:.4}, {champ_summary}");

        if champ_won {
            println!("winner found in generation {generation}");
            population.winner_generation = generation;
            break;
        }

        executor
            .next_epoch(generation, &mut population, &opts, &CancelToken::new(), &mut rng)
            .expect("epoch");
    }
}
