//! Traits are small shared parameter bundles that nodes and genes point at by
//! id, letting several parts of a network evolve a common set of knobs.

use crate::{config::Options, random::rand_sign};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Parameter width of every trait; uniform across a genome.
pub const NUM_TRAIT_PARAMS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trait {
    pub id: usize,
    pub params: [f64; NUM_TRAIT_PARAMS],
}

impl Trait {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            params: [0.; NUM_TRAIT_PARAMS],
        }
    }

    pub fn with_params(id: usize, params: [f64; NUM_TRAIT_PARAMS]) -> Self {
        Self { id, params }
    }

    /// Component-wise mean of two traits, keeping the lower id.
    pub fn average(a: &Trait, b: &Trait) -> Trait {
        let mut params = [0.; NUM_TRAIT_PARAMS];
        for (p, (l, r)) in params.iter_mut().zip(a.params.iter().zip(b.params.iter())) {
            *p = (l + r) / 2.;
        }
        Trait {
            id: a.id.min(b.id),
            params,
        }
    }

    /// Jiggle each parameter with probability `TraitParamMutProb`. The first
    /// parameter stays in [0, 1], the rest stay non-negative.
    pub fn mutate(&mut self, opts: &Options, rng: &mut impl RngCore) {
        for (idx, param) in self.params.iter_mut().enumerate() {
            if rng.random::<f64>() >= opts.trait_param_mut_prob {
                continue;
            }

            *param += rand_sign(rng) * rng.random::<f64>() * opts.trait_mutation_power;
            *param = if idx == 0 {
                param.clamp(0., 1.)
            } else {
                param.max(0.)
            };
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{assert_f64_approx, random::seeded_rng};

    #[test]
    fn test_average_keeps_lower_id() {
        let a = Trait::with_params(2, [1., 2., 3., 4., 5., 6., 7., 8.]);
        let b = Trait::with_params(5, [0., 0., 1., 0., 0., 0., 0., 0.]);

        let avg = Trait::average(&a, &b);
        assert_eq!(avg.id, 2);
        assert_f64_approx!(avg.params[0], 0.5);
        assert_f64_approx!(avg.params[2], 2.);

        let flipped = Trait::average(&b, &a);
        assert_eq!(flipped.id, 2);
        assert_eq!(flipped.params, avg.params);
    }

    #[test]
    fn test_mutate_clamps() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            trait_param_mut_prob: 1.0,
            trait_mutation_power: 100.0,
            ..Options::default()
        };

        for _ in 0..50 {
            let mut t = Trait::new(1);
            t.mutate(&opts, &mut rng);
            assert!((0. ..=1.).contains(&t.params[0]), "p0 {}", t.params[0]);
            for p in &t.params[1..] {
                assert!(*p >= 0., "negative param {p}");
            }
        }
    }

    #[test]
    fn test_mutate_zero_prob_is_noop() {
        let mut rng = seeded_rng(42);
        let opts = Options {
            trait_param_mut_prob: 0.0,
            ..Options::default()
        };

        let mut t = Trait::with_params(1, [0.5, 1., 1., 1., 1., 1., 1., 1.]);
        let before = t.clone();
        t.mutate(&opts, &mut rng);
        assert_eq!(t, before);
    }
}
