#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{
    __m256i, _mm256_add_pd, _mm256_blendv_epi8, _mm256_cmpgt_epi64, _mm256_loadu_pd,
    _mm256_loadu_si256, _mm256_max_pd, _mm256_min_pd, _mm256_set1_epi64x, _mm256_set1_pd,
    _mm256_setzero_pd, _mm256_storeu_pd, _mm256_storeu_si256,
};

use crate::processor::AggregateOp;

/// Min/max over a dense long column. Sums go through the i128 accumulator
/// instead, so only `Min` and `Max` are served here.
pub fn aggregate_i64(values: &[i64], op: AggregateOp) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    match op {
        AggregateOp::Min => Some(min_max_i64(values).0),
        AggregateOp::Max => Some(min_max_i64(values).1),
        _ => None,
    }
}

/// Sum/min/max over a dense double column
pub fn aggregate_f64(values: &[f64], op: AggregateOp) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let (sum, min, max) = sum_min_max_f64(values);
    match op {
        AggregateOp::Sum => Some(sum),
        AggregateOp::Min => Some(min),
        AggregateOp::Max => Some(max),
        _ => None,
    }
}

fn min_max_i64(values: &[i64]) -> (i64, i64) {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { min_max_i64_avx2(values) };
        }
    }
    min_max_i64_scalar(values)
}

fn min_max_i64_scalar(values: &[i64]) -> (i64, i64) {
    values
        .iter()
        .fold((i64::MAX, i64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn min_max_i64_avx2(values: &[i64]) -> (i64, i64) {
    const LANES: usize = 4; // __m256i holds 4 i64s
    let mut min = _mm256_set1_epi64x(i64::MAX);
    let mut max = _mm256_set1_epi64x(i64::MIN);

    let chunks = values.chunks_exact(LANES);
    let remainder = chunks.remainder();

    for chunk in chunks {
        let v = unsafe { _mm256_loadu_si256(chunk.as_ptr() as *const __m256i) };
        // no 64-bit min/max below AVX-512, so compare and blend
        let lower = _mm256_cmpgt_epi64(min, v);
        min = _mm256_blendv_epi8(min, v, lower);
        let higher = _mm256_cmpgt_epi64(v, max);
        max = _mm256_blendv_epi8(max, v, higher);
    }

    let mut min_arr = [i64::MAX; LANES];
    let mut max_arr = [i64::MIN; LANES];
    unsafe { _mm256_storeu_si256(min_arr.as_mut_ptr() as *mut __m256i, min) };
    unsafe { _mm256_storeu_si256(max_arr.as_mut_ptr() as *mut __m256i, max) };

    let (lo, hi) = min_max_i64_scalar(remainder);
    (
        min_arr.iter().copied().fold(lo, i64::min),
        max_arr.iter().copied().fold(hi, i64::max),
    )
}

fn sum_min_max_f64(values: &[f64]) -> (f64, f64, f64) {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { sum_min_max_f64_avx2(values) };
        }
    }
    sum_min_max_f64_scalar(values)
}

fn sum_min_max_f64_scalar(values: &[f64]) -> (f64, f64, f64) {
    values.iter().fold(
        (0.0, f64::INFINITY, f64::NEG_INFINITY),
        |(sum, lo, hi), &v| (sum + v, lo.min(v), hi.max(v)),
    )
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn sum_min_max_f64_avx2(values: &[f64]) -> (f64, f64, f64) {
    const LANES: usize = 4; // __m256d holds 4 f64s
    let mut sum = _mm256_setzero_pd();
    let mut min = _mm256_set1_pd(f64::INFINITY);
    let mut max = _mm256_set1_pd(f64::NEG_INFINITY);

    let chunks = values.chunks_exact(LANES);
    let remainder = chunks.remainder();

    for chunk in chunks {
        let v = unsafe { _mm256_loadu_pd(chunk.as_ptr()) };
        sum = _mm256_add_pd(sum, v);
        min = _mm256_min_pd(min, v);
        max = _mm256_max_pd(max, v);
    }

    let mut sum_arr = [0f64; LANES];
    let mut min_arr = [f64::INFINITY; LANES];
    let mut max_arr = [f64::NEG_INFINITY; LANES];
    unsafe { _mm256_storeu_pd(sum_arr.as_mut_ptr(), sum) };
    unsafe { _mm256_storeu_pd(min_arr.as_mut_ptr(), min) };
    unsafe { _mm256_storeu_pd(max_arr.as_mut_ptr(), max) };

    let (rest_sum, rest_min, rest_max) = sum_min_max_f64_scalar(remainder);
    (
        sum_arr.iter().sum::<f64>() + rest_sum,
        min_arr.iter().copied().fold(rest_min, f64::min),
        max_arr.iter().copied().fold(rest_max, f64::max),
    )
}
