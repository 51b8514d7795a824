//! HyperLogLog sketch for approximate distinct counts
//!
//! Registers are indexed by the top `precision` bits of a 64-bit hash and keep
//! the longest run of leading zeros seen in the remaining bits. The relative
//! standard error is about `1.04 / sqrt(2^precision)`.

use ahash::RandomState;
use once_cell::sync::Lazy;
use std::hash::{BuildHasher, Hash};

/// Fixed seeds so estimates are reproducible run to run
static HASHER: Lazy<RandomState> = Lazy::new(|| {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
});

pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 18;

#[derive(Debug, Clone, PartialEq)]
pub struct HllSketch {
    precision: u8,
    registers: Vec<u8>,
}

impl HllSketch {
    pub fn new(precision: u8) -> Self {
        let precision = precision.clamp(MIN_PRECISION, MAX_PRECISION);
        HllSketch {
            precision,
            registers: vec![0; 1 << precision],
        }
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn add<T: Hash + ?Sized>(&mut self, value: &T) {
        self.add_hash(HASHER.hash_one(value));
    }

    pub fn add_hash(&mut self, hash: u64) {
        let p = self.precision as u32;
        let idx = (hash >> (64 - p)) as usize;
        // guard bit caps rho at 64 - p + 1 when the tail is all zeros
        let tail = (hash << p) | (1u64 << (p - 1));
        let rho = (tail.leading_zeros() + 1) as u8;
        if rho > self.registers[idx] {
            self.registers[idx] = rho;
        }
    }

    /// Union with a sketch of the same precision; mismatched sketches are ignored
    pub fn merge(&mut self, other: &HllSketch) {
        if self.precision != other.precision {
            return;
        }
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            *mine = (*mine).max(*theirs);
        }
    }

    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;
        let alpha = match self.registers.len() {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        };
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2f64.powi(-(r as i32)))
            .sum();
        let raw = alpha * m * m / sum;

        let zeros = self.registers.iter().filter(|&&r| r == 0).count();
        if raw <= 2.5 * m && zeros > 0 {
            // linear counting for small cardinalities
            m * (m / zeros as f64).ln()
        } else {
            raw
        }
    }

    pub fn count(&self) -> i64 {
        self.estimate().round() as i64
    }
}
