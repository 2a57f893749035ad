use std::mem::MaybeUninit;

use super::{PackKernel, F32_CHUNK_LEN, F32_CHUNK_ROWS, I8_CHUNK_LEN, I8_CHUNK_ROWS, I8_TILE_ROWS};
use crate::packing::PANEL_COLS;

/// Kernel that uses scalar code which the compiler may auto-vectorize.
///
/// This is used as a fallback on systems without a more specialized kernel,
/// and as the reference the specialized kernels are tested against.
#[derive(Default)]
pub struct GenericKernel {
    _private: (),
}

// Safety - Generic kernel uses no instructions that need runtime detection.
unsafe impl PackKernel for GenericKernel {
    fn new() -> Option<Self> {
        Some(GenericKernel { _private: () })
    }

    fn name(&self) -> &'static str {
        "generic"
    }

    fn pack_i8_chunk(
        &self,
        cols: [&[i8; I8_CHUNK_ROWS]; PANEL_COLS],
        input_xor: i8,
        out: &mut [MaybeUninit<i8>; I8_CHUNK_LEN],
        sums: Option<&mut [i32; PANEL_COLS]>,
    ) {
        const N_TILES: usize = I8_CHUNK_ROWS / I8_TILE_ROWS;

        // Gather the chunk into `[col][tile][row]` order.
        let mut in_data = [[[0i8; I8_TILE_ROWS]; N_TILES]; PANEL_COLS];
        for j in 0..PANEL_COLS {
            for i in 0..N_TILES {
                for s in 0..I8_TILE_ROWS {
                    in_data[j][i][s] = cols[j][i * I8_TILE_ROWS + s];
                }
            }
        }

        for i in 0..N_TILES {
            for j in 0..PANEL_COLS {
                for s in 0..I8_TILE_ROWS {
                    out[(PANEL_COLS * i + j) * I8_TILE_ROWS + s].write(in_data[j][i][s] ^ input_xor);
                }
            }
        }

        if let Some(sums) = sums {
            for j in 0..PANEL_COLS {
                let mut col_sum = 0i32;
                for i in 0..N_TILES {
                    for s in 0..I8_TILE_ROWS {
                        col_sum += (in_data[j][i][s] ^ input_xor) as i32;
                    }
                }
                sums[j] = sums[j].wrapping_add(col_sum);
            }
        }
    }

    fn pack_f32_chunk(
        &self,
        cols: [&[f32; F32_CHUNK_ROWS]; PANEL_COLS],
        out: &mut [MaybeUninit<f32>; F32_CHUNK_LEN],
    ) {
        for i in 0..F32_CHUNK_ROWS {
            for j in 0..PANEL_COLS {
                out[PANEL_COLS * i + j].write(cols[j][i]);
            }
        }
    }
}
