//! RNG plumbing and the couple of sampling helpers the mutation and
//! reproduction operators lean on.

use core::ops::ControlFlow;
use find_fold::FindFold;
use rand::RngCore;
use std::{
    cmp::min,
    fs::File,
    io::{self, Read},
};

/// A quick and dirty way to get an RNG seed from urandom, on systems that
/// support it. Useful because our implementation of WyRng always needs a seed
pub fn seed_urandom() -> io::Result<u64> {
    let mut file = File::open("/dev/urandom")?;
    let mut buffer = [0u8; 8];
    file.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

/// For getting a handle on an RngCore when you don't want to think too much
/// about it.
pub fn default_rng() -> impl RngCore {
    WyRng::seeded(seed_urandom().unwrap())
}

/// Deterministic RNG for tests and reproducible runs.
pub fn seeded_rng(seed: u64) -> impl RngCore {
    WyRng::seeded(seed)
}

/// A really small but also fast random number generator. Lifted from
/// smol-rs/fastrand
pub struct WyRng {
    state: u64,
}

impl WyRng {
    pub fn seeded(state: u64) -> Self {
        Self { state }
    }
}

impl RngCore for WyRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        const WY_CONST_0: u64 = 0x2d35_8dcc_aa6c_78a5;
        const WY_CONST_1: u64 = 0x8bb8_4b93_962e_acc9;
        self.state = self.state.wrapping_add(WY_CONST_0);
        let t = u128::from(self.state) * u128::from(self.state ^ WY_CONST_1);
        (t as u64) ^ (t >> 64) as u64
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        if dst.is_empty() {
            return;
        }

        let mut idx = 0;
        while idx < dst.len() {
            let lim = min(8, dst.len() - idx);
            dst[idx..idx + lim].copy_from_slice(&self.next_u64().to_ne_bytes()[..lim]);
            idx += lim;
        }
    }
}

/// +1.0 or -1.0, evenly
pub fn rand_sign(rng: &mut impl RngCore) -> f64 {
    if rng.next_u64() & 1 == 0 {
        1.
    } else {
        -1.
    }
}

/// Pick an item by relative weight. Weights need not be normalized; items with
/// non-positive weight are never picked. Returns None for empty or all-zero
/// input.
pub fn pick_weighted<'a, T>(
    rng: &mut impl RngCore,
    items: &'a [T],
    weights: &[f64],
) -> Option<&'a T> {
    let total: f64 = weights.iter().take(items.len()).filter(|w| **w > 0.).sum();
    if total <= 0. {
        return None;
    }

    let roll = (rng.next_u64() as f64 / u64::MAX as f64) * total;
    items
        .iter()
        .zip(weights)
        .filter(|(_, w)| **w > 0.)
        .find_fold(0., |acc, (item, w)| {
            if roll < acc + w {
                ControlFlow::Break(item)
            } else {
                ControlFlow::Continue(acc + w)
            }
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rand_sign() {
        let mut rng = seeded_rng(42);
        let mut seen = (false, false);
        for _ in 0..64 {
            match rand_sign(&mut rng) {
                1. => seen.0 = true,
                -1. => seen.1 = true,
                x => unreachable!("sign {x}"),
            }
        }
        assert!(seen.0 && seen.1);
    }

    #[test]
    fn test_pick_weighted() {
        let mut rng = seeded_rng(42);
        let items = ['a', 'b', 'c'];

        for _ in 0..100 {
            let picked = pick_weighted(&mut rng, &items, &[0., 1., 0.]);
            assert_eq!(picked, Some(&'b'));
        }

        assert_eq!(pick_weighted::<char>(&mut rng, &[], &[]), None);
        assert_eq!(pick_weighted(&mut rng, &items, &[0., 0., 0.]), None);

        let mut hits = [0usize; 3];
        for _ in 0..1000 {
            let picked = pick_weighted(&mut rng, &[0usize, 1, 2], &[1., 1., 8.]).unwrap();
            hits[*picked] += 1;
        }
        assert!(hits[2] > hits[0] && hits[2] > hits[1]);
    }
}
