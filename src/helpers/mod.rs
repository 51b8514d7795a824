pub mod hll;
pub mod simd_helpers;
