//! Seeded random data source for deterministic randomized tests.
//!
//! Uses the xoshiro256** PRNG so a failing run can be replayed from its
//! printed seed.

use std::cell::RefCell;

use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

pub struct Fuzzer {
    /// The seed used to initialize the PRNG.
    pub seed: [u8; 32],
    rng: RefCell<Xoshiro256StarStar>,
}

impl Fuzzer {
    /// Create a fuzzer from an explicit seed, or from `OsRng` when `None`.
    pub fn new(seed: Option<[u8; 32]>) -> Self {
        let seed = seed.unwrap_or_else(|| {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            bytes
        });
        Self {
            seed,
            rng: RefCell::new(Xoshiro256StarStar::from_seed(seed)),
        }
    }

    /// Create a fuzzer from a small integer seed, convenient in test loops.
    pub fn from_u64(seed: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&seed.to_le_bytes());
        Self::new(Some(bytes))
    }

    /// Random integer in `min..=max`.
    pub fn int(&self, min: i64, max: i64) -> i64 {
        self.rng.borrow_mut().gen_range(min..=max)
    }

    /// Random boolean, true with probability `p`.
    pub fn chance(&self, p: f64) -> bool {
        self.rng.borrow_mut().gen::<f64>() < p
    }

    /// Pick a random element of `items`. Panics on an empty slice.
    pub fn pick<'a, T>(&self, items: &'a [T]) -> &'a T {
        let i = self.int(0, items.len() as i64 - 1) as usize;
        &items[i]
    }

    /// Random ASCII-alphanumeric string of length `len`.
    pub fn string(&self, len: usize) -> String {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789 ";
        (0..len)
            .map(|_| *self.pick(ALPHABET) as char)
            .collect()
    }
}
