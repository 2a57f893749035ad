//! Packing of f32 column panels.
//!
//! The packed layout is row-major with [`PANEL_COLS`] columns, which amounts
//! to transposing each `8 x 8` block of the column-major source.

use std::mem::MaybeUninit;

use super::{assume_init_prefix, PanelSource, TrailingBuf, PANEL_COLS};
use crate::kernels::{PackKernel, F32_CHUNK_LEN, F32_CHUNK_ROWS};

/// Size of the trailing buffer. A partial chunk has at most
/// `F32_CHUNK_ROWS - 1` rows.
const F32_TRAILING_LEN: usize = (F32_CHUNK_ROWS - 1) * PANEL_COLS;

/// Return the number of elements written by [`pack_f32_panel`] for a panel
/// with `rows` rows.
pub fn packed_f32_panel_len(rows: usize) -> usize {
    rows * PANEL_COLS
}

/// Pack an f32 column panel.
///
/// The first [`packed_f32_panel_len`] elements of `out` are written and
/// returned. Elements after that are not modified.
///
/// Panics if `out` is too short or the zero buffer has fewer than
/// [`F32_CHUNK_ROWS`] elements.
pub fn pack_f32_panel<'a, K: PackKernel + ?Sized>(
    kernel: &K,
    src: PanelSource<f32>,
    out: &'a mut [MaybeUninit<f32>],
) -> &'a mut [f32] {
    let rows = src.rows();
    let packed_len = packed_f32_panel_len(rows);
    assert!(out.len() >= packed_len, "output buffer too short");

    let mut trailing_buf = TrailingBuf::<f32, F32_TRAILING_LEN>::new();
    pack_f32_chunks(kernel, &src, &mut out[..packed_len], &mut trailing_buf);

    let trailing_rows = rows % F32_CHUNK_ROWS;
    if trailing_rows > 0 {
        let non_trailing_rows = rows - trailing_rows;
        trailing_buf.merge_into(
            out,
            non_trailing_rows * PANEL_COLS,
            trailing_rows * PANEL_COLS,
        );
    }

    // Safety: Full chunks and the merged trailing chunk cover `out[..packed_len]`.
    unsafe { assume_init_prefix(out, packed_len) }
}

fn pack_f32_chunks<K: PackKernel + ?Sized>(
    kernel: &K,
    src: &PanelSource<f32>,
    out: &mut [MaybeUninit<f32>],
    trailing_buf: &mut TrailingBuf<f32, F32_TRAILING_LEN>,
) {
    let rows = src.rows();
    let cursors = src.cursors(F32_CHUNK_ROWS);

    for (chunk_idx, k) in (0..rows).step_by(F32_CHUNK_ROWS).enumerate() {
        let available_rows = rows - k;

        if available_rows >= F32_CHUNK_ROWS {
            let out_start = chunk_idx * F32_CHUNK_LEN;
            let chunk_out = out[out_start..out_start + F32_CHUNK_LEN]
                .first_chunk_mut::<F32_CHUNK_LEN>()
                .expect("output slice has chunk length");
            kernel.pack_f32_chunk(cursors.chunk(k), chunk_out);
        } else {
            // Rows past the end of the panel are zero, regardless of the
            // zero buffer contents.
            let mut in_data = [[0f32; F32_CHUNK_ROWS]; PANEL_COLS];
            for (staged, col) in in_data.iter_mut().zip(cursors.rows(k, available_rows)) {
                staged[..available_rows].copy_from_slice(col);
            }

            // The last row of the transposed block is never needed, as it is
            // only reached by full chunks.
            let trailing = trailing_buf.as_mut();
            for i in 0..F32_CHUNK_ROWS - 1 {
                for j in 0..PANEL_COLS {
                    trailing[PANEL_COLS * i + j].write(in_data[j][i]);
                }
            }
        }
    }
}
