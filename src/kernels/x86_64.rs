use std::arch::x86_64::{
    __m256, __m256i, _mm256_add_epi32, _mm256_castpd_ps, _mm256_castps_pd, _mm256_castps_si256,
    _mm256_castsi256_ps, _mm256_loadu_ps, _mm256_loadu_si256, _mm256_madd_epi16,
    _mm256_maddubs_epi16, _mm256_permute2f128_ps, _mm256_set1_epi16, _mm256_set1_epi8,
    _mm256_setzero_si256, _mm256_storeu_ps, _mm256_storeu_si256, _mm256_unpackhi_pd,
    _mm256_unpackhi_ps, _mm256_unpacklo_pd, _mm256_unpacklo_ps, _mm256_xor_si256,
};
use std::mem::MaybeUninit;

use super::{PackKernel, F32_CHUNK_LEN, F32_CHUNK_ROWS, I8_CHUNK_LEN, I8_CHUNK_ROWS};
use crate::packing::PANEL_COLS;

/// Packing kernel for x64 CPUs that support AVX 2 instructions.
pub struct Avx2Kernel {
    _private: (),
}

// Safety - The `new` fn tests for AVX-2 support.
unsafe impl PackKernel for Avx2Kernel {
    fn new() -> Option<Self> {
        is_x86_feature_detected!("avx2").then_some(Avx2Kernel { _private: () })
    }

    fn name(&self) -> &'static str {
        "avx2"
    }

    fn pack_i8_chunk(
        &self,
        cols: [&[i8; I8_CHUNK_ROWS]; PANEL_COLS],
        input_xor: i8,
        out: &mut [MaybeUninit<i8>; I8_CHUNK_LEN],
        sums: Option<&mut [i32; PANEL_COLS]>,
    ) {
        // Safety: Kernel can only be constructed if AVX 2 is supported.
        unsafe { pack_i8_chunk_avx2(cols, input_xor, out, sums) }
    }

    fn pack_f32_chunk(
        &self,
        cols: [&[f32; F32_CHUNK_ROWS]; PANEL_COLS],
        out: &mut [MaybeUninit<f32>; F32_CHUNK_LEN],
    ) {
        // Safety: Kernel can only be constructed if AVX 2 is supported.
        unsafe { pack_f32_chunk_avx2(cols, out) }
    }
}

/// Equivalent of `_mm256_unpacklo_ps` for pairs of f32 values.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn unpacklo_ps_x2(a: __m256, b: __m256) -> __m256 {
    unsafe { _mm256_castpd_ps(_mm256_unpacklo_pd(_mm256_castps_pd(a), _mm256_castps_pd(b))) }
}

/// Equivalent of `_mm256_unpackhi_ps` for pairs of f32 values.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn unpackhi_ps_x2(a: __m256, b: __m256) -> __m256 {
    unsafe { _mm256_castpd_ps(_mm256_unpackhi_pd(_mm256_castps_pd(a), _mm256_castps_pd(b))) }
}

/// Transpose an 8x8 matrix of 32-bit elements, where `t[c]` holds row `c`
/// of the input. Element `i` of output `c` is element `c` of input `i`.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn transpose_8x8(t: [__m256; 8]) -> [__m256; 8] {
    unsafe {
        let [t0, t1, t2, t3, t4, t5, t6, t7] = t;

        // Interleave 32-bit elements within 128-bit lanes.
        let r0 = _mm256_unpacklo_ps(t0, t1);
        let r4 = _mm256_unpacklo_ps(t4, t5);
        let r2 = _mm256_unpackhi_ps(t0, t1);
        let r6 = _mm256_unpackhi_ps(t4, t5);
        let r1 = _mm256_unpacklo_ps(t2, t3);
        let r5 = _mm256_unpacklo_ps(t6, t7);
        let r3 = _mm256_unpackhi_ps(t2, t3);
        let r7 = _mm256_unpackhi_ps(t6, t7);

        // Interleave 64-bit pairs within 128-bit lanes.
        let t0 = unpacklo_ps_x2(r0, r1);
        let t4 = unpacklo_ps_x2(r4, r5);
        let t2 = unpackhi_ps_x2(r0, r1);
        let t6 = unpackhi_ps_x2(r4, r5);
        let t1 = unpacklo_ps_x2(r2, r3);
        let t5 = unpacklo_ps_x2(r6, r7);
        let t3 = unpackhi_ps_x2(r2, r3);
        let t7 = unpackhi_ps_x2(r6, r7);

        // Interleave 128-bit halves across lanes. Each `tN` now holds four
        // elements of two output rows, in its low and high lanes.
        let r0 = _mm256_permute2f128_ps::<0x20>(t0, t4);
        let r4 = _mm256_permute2f128_ps::<0x20>(t1, t5);
        let r1 = _mm256_permute2f128_ps::<0x31>(t0, t4);
        let r5 = _mm256_permute2f128_ps::<0x31>(t1, t5);
        let r2 = _mm256_permute2f128_ps::<0x20>(t2, t6);
        let r6 = _mm256_permute2f128_ps::<0x20>(t3, t7);
        let r3 = _mm256_permute2f128_ps::<0x31>(t2, t6);
        let r7 = _mm256_permute2f128_ps::<0x31>(t3, t7);

        [r0, r2, r4, r6, r1, r3, r5, r7]
    }
}

#[target_feature(enable = "avx2")]
unsafe fn pack_f32_chunk_avx2(
    cols: [&[f32; F32_CHUNK_ROWS]; PANEL_COLS],
    out: &mut [MaybeUninit<f32>; F32_CHUNK_LEN],
) {
    unsafe {
        let t = cols.map(|col| _mm256_loadu_ps(col.as_ptr()));
        let rows = transpose_8x8(t);

        let out_ptr = out.as_mut_ptr() as *mut f32;
        for (i, row) in rows.into_iter().enumerate() {
            _mm256_storeu_ps(out_ptr.add(i * PANEL_COLS), row);
        }
    }
}

#[target_feature(enable = "avx2")]
unsafe fn pack_i8_chunk_avx2(
    cols: [&[i8; I8_CHUNK_ROWS]; PANEL_COLS],
    input_xor: i8,
    out: &mut [MaybeUninit<i8>; I8_CHUNK_LEN],
    sums: Option<&mut [i32; PANEL_COLS]>,
) {
    unsafe {
        let xor = _mm256_set1_epi8(input_xor);

        // Each column is 32 bytes, or eight 32-bit units of one 4-row tile
        // each. The packed chunk is the 8x8 transpose of those units.
        let t = cols.map(|col| {
            let x = _mm256_loadu_si256(col.as_ptr() as *const __m256i);
            _mm256_castsi256_ps(_mm256_xor_si256(x, xor))
        });
        let tiles = transpose_8x8(t).map(|x| _mm256_castps_si256(x));

        let out_ptr = out.as_mut_ptr() as *mut __m256i;
        for (i, tile) in tiles.into_iter().enumerate() {
            _mm256_storeu_si256(out_ptr.add(i), tile);
        }

        if let Some(sums) = sums {
            // In each tile, 32-bit lane `j` holds four values from column `j`.
            // Sum groups of 4 bytes into i32 lanes using dot products with
            // vectors of ones.
            let ones_u8 = _mm256_set1_epi8(1);
            let ones_i16 = _mm256_set1_epi16(1);
            let mut acc = _mm256_setzero_si256();
            for tile in tiles {
                let pair_sums = _mm256_maddubs_epi16(ones_u8, tile);
                acc = _mm256_add_epi32(acc, _mm256_madd_epi16(pair_sums, ones_i16));
            }

            let sums_ptr = sums.as_mut_ptr() as *mut __m256i;
            let prev = _mm256_loadu_si256(sums_ptr);
            _mm256_storeu_si256(sums_ptr, _mm256_add_epi32(prev, acc));
        }
    }
}
