//! Packing of int8 column panels.
//!
//! The packed layout consists of tiles of `[PANEL_COLS, I8_TILE_ROWS]`
//! elements. Within a tile, the `I8_TILE_ROWS` consecutive rows of each column
//! are contiguous, and the columns follow each other. Tiles are ordered by
//! row. Every element is XOR-ed with a bias byte (`input_xor`) which can
//! convert between signed and unsigned representations, and the packer can
//! accumulate the sum of each column's biased values for use in zero point
//! corrections.
//!
//! Rows are processed in chunks of [`I8_TILES_PER_CHUNK`] tiles.

use std::mem::MaybeUninit;

use super::{assume_init_prefix, PanelSource, TrailingBuf, PANEL_COLS};
use crate::kernels::{PackKernel, I8_CHUNK_LEN, I8_CHUNK_ROWS, I8_TILES_PER_CHUNK, I8_TILE_ROWS};

/// Return the number of elements written by [`pack_i8_panel`] for a panel
/// with `rows` rows.
pub fn packed_i8_panel_len(rows: usize) -> usize {
    rows.next_multiple_of(I8_TILE_ROWS) * PANEL_COLS
}

/// Pack an int8 column panel.
///
/// The first [`packed_i8_panel_len`] elements of `out` are written and
/// returned. Elements after that are not modified.
///
/// If `sums` is provided it must have [`PANEL_COLS`] entries. The sum of each
/// packed column's values is **added** to its entry, so the sums of a column
/// can be accumulated over several calls that pack successive ranges of rows.
/// Columns past the edge of the matrix contribute the zero point, as do rows
/// that pad a partially filled tile.
///
/// Panics if `out` is too short or the zero buffer has fewer than
/// [`I8_CHUNK_ROWS`] elements.
pub fn pack_i8_panel<'a, K: PackKernel + ?Sized>(
    kernel: &K,
    src: PanelSource<i8>,
    input_xor: i8,
    out: &'a mut [MaybeUninit<i8>],
    sums: Option<&mut [i32]>,
) -> &'a mut [i8] {
    let rows = src.rows();
    let packed_len = packed_i8_panel_len(rows);
    assert!(out.len() >= packed_len, "output buffer too short");
    if let Some(sums) = sums.as_ref() {
        assert_eq!(
            sums.len(),
            PANEL_COLS,
            "sums must have {} entries",
            PANEL_COLS
        );
    }

    let mut col_sums = sums.as_ref().map(|sums| {
        let mut col_sums = [0i32; PANEL_COLS];
        col_sums.copy_from_slice(sums);
        col_sums
    });

    let mut trailing_buf = TrailingBuf::<i8, I8_CHUNK_LEN>::new();
    pack_i8_chunks(
        kernel,
        &src,
        input_xor,
        &mut out[..packed_len],
        col_sums.as_mut(),
        &mut trailing_buf,
    );

    // Copy the valid part of the incomplete final chunk. The output is only
    // padded to a multiple of the tile size, not the chunk size.
    if rows % I8_CHUNK_ROWS > 0 {
        let non_trailing_rows = rows - rows % I8_CHUNK_ROWS;
        let trailing_rows = rows.next_multiple_of(I8_TILE_ROWS) - non_trailing_rows;
        trailing_buf.merge_into(
            out,
            non_trailing_rows * PANEL_COLS,
            trailing_rows * PANEL_COLS,
        );
    }

    if let (Some(sums), Some(col_sums)) = (sums, col_sums) {
        sums.copy_from_slice(&col_sums);
    }

    // Safety: Full chunks and the merged trailing chunk cover `out[..packed_len]`.
    unsafe { assume_init_prefix(out, packed_len) }
}

/// Pack all chunks of a panel. Full chunks are written to `out`, an
/// incomplete final chunk is written to `trailing_buf`.
fn pack_i8_chunks<K: PackKernel + ?Sized>(
    kernel: &K,
    src: &PanelSource<i8>,
    input_xor: i8,
    out: &mut [MaybeUninit<i8>],
    mut sums: Option<&mut [i32; PANEL_COLS]>,
    trailing_buf: &mut TrailingBuf<i8, I8_CHUNK_LEN>,
) {
    let rows = src.rows();
    let cursors = src.cursors(I8_CHUNK_ROWS);
    let zero_point = src.zero_point();

    for (chunk_idx, k) in (0..rows).step_by(I8_CHUNK_ROWS).enumerate() {
        let available_rows = rows - k;

        if available_rows >= I8_CHUNK_ROWS {
            let out_start = chunk_idx * I8_CHUNK_LEN;
            let chunk_out = out[out_start..out_start + I8_CHUNK_LEN]
                .first_chunk_mut::<I8_CHUNK_LEN>()
                .expect("output slice has chunk length");
            kernel.pack_i8_chunk(cursors.chunk(k), input_xor, chunk_out, sums.as_deref_mut());
        } else {
            debug_assert!(available_rows > 0);
            let in_data = stage_partial_chunk(
                cursors.rows(k, available_rows),
                available_rows,
                zero_point,
                input_xor,
            );
            kernel.pack_i8_chunk(
                in_data.each_ref(),
                input_xor,
                trailing_buf.as_mut(),
                sums.as_deref_mut(),
            );
        }
    }
}

/// Copy the rows of an incomplete chunk into a full-size staging array.
///
/// Padding is chosen so that the staged chunk can be packed and summed in
/// the same way as a full chunk:
///
/// - Rows which complete the last partially filled tile are set to the raw
///   zero point. After biasing they hold the packed zero point, as for
///   columns past the edge of the matrix.
/// - Rows in tiles after that are set to `input_xor` itself. Since
///   `input_xor ^ input_xor == 0`, these contribute nothing to the column
///   sums. They are never copied to the output.
///
/// Replacing the second kind of padding with the zero point would change the
/// sums.
fn stage_partial_chunk(
    cols: [&[i8]; PANEL_COLS],
    available_rows: usize,
    zero_point: i8,
    input_xor: i8,
) -> [[i8; I8_CHUNK_ROWS]; PANEL_COLS] {
    debug_assert!(available_rows < I8_CHUNK_ROWS);

    let full_tiles = available_rows / I8_TILE_ROWS;
    let used_tiles = available_rows.div_ceil(I8_TILE_ROWS);
    debug_assert!(used_tiles <= I8_TILES_PER_CHUNK);

    let full_rows = full_tiles * I8_TILE_ROWS;
    let used_rows = used_tiles * I8_TILE_ROWS;

    let mut in_data = [[0i8; I8_CHUNK_ROWS]; PANEL_COLS];
    for (staged, col) in in_data.iter_mut().zip(cols) {
        // Complete tiles.
        staged[..full_rows].copy_from_slice(&col[..full_rows]);

        // Incomplete tile.
        staged[full_rows..available_rows].copy_from_slice(&col[full_rows..available_rows]);
        staged[available_rows..used_rows].fill(zero_point);

        // Empty tiles.
        staged[used_rows..].fill(input_xor);
    }
    in_data
}

#[cfg(test)]
mod tests {
    use std::mem::MaybeUninit;

    use tilepack_testing::TestCases;

    use super::{pack_i8_panel, packed_i8_panel_len, stage_partial_chunk};
    use crate::kernels::generic::GenericKernel;
    use crate::kernels::{PackKernel, I8_CHUNK_ROWS, I8_TILE_ROWS};
    use crate::packing::{PanelSource, PANEL_COLS};

    /// Reference implementation of int8 packing for a single panel.
    fn reference_pack(
        cols: &[Vec<i8>],
        zero_point: i8,
        input_xor: i8,
        rows: usize,
    ) -> (Vec<i8>, [i32; PANEL_COLS]) {
        let padded_rows = rows.next_multiple_of(I8_TILE_ROWS);
        let mut packed = Vec::with_capacity(padded_rows * PANEL_COLS);
        let mut sums = [0i32; PANEL_COLS];

        for tile in 0..padded_rows / I8_TILE_ROWS {
            for j in 0..PANEL_COLS {
                for s in 0..I8_TILE_ROWS {
                    let row = tile * I8_TILE_ROWS + s;
                    let val = cols.get(j).and_then(|c| c.get(row)).copied();
                    let val = if row < rows {
                        val.unwrap_or(zero_point)
                    } else {
                        zero_point
                    };
                    packed.push(val ^ input_xor);
                    sums[j] += (val ^ input_xor) as i32;
                }
            }
        }

        (packed, sums)
    }

    #[test]
    fn test_packed_i8_panel_len() {
        assert_eq!(packed_i8_panel_len(0), 0);
        assert_eq!(packed_i8_panel_len(1), 32);
        assert_eq!(packed_i8_panel_len(4), 32);
        assert_eq!(packed_i8_panel_len(33), 9 * 32);
    }

    #[test]
    fn test_pack_i8_panel_matches_reference() {
        #[derive(Debug)]
        struct Case {
            rows: usize,
            cols: usize,
            input_xor: i8,
        }

        let mut cases = Vec::new();
        for rows in [0, 1, 2, 3, 4, 7, 31, 32, 33, 36, 63, 64, 65, 100] {
            for cols in [1, 3, 8] {
                for input_xor in [0, -128] {
                    cases.push(Case {
                        rows,
                        cols,
                        input_xor,
                    });
                }
            }
        }

        cases.test_each(|case| {
            let &Case {
                rows,
                cols,
                input_xor,
            } = case;

            let mut rng = fastrand::Rng::with_seed(1234);
            let zero_point = 5;
            let data: Vec<i8> = (0..rows * cols).map(|_| rng.i8(..)).collect();
            let col_data: Vec<Vec<i8>> = (0..cols)
                .map(|c| data[c * rows..(c + 1) * rows].to_vec())
                .collect();
            let zero_buf = [zero_point; I8_CHUNK_ROWS];

            let kernel = GenericKernel::new().unwrap();
            let src = PanelSource::new(&data, rows, cols, rows, &zero_buf);
            let mut out = vec![MaybeUninit::uninit(); packed_i8_panel_len(rows)];
            let mut sums = [0i32; PANEL_COLS];
            let packed = pack_i8_panel(&kernel, src, input_xor, &mut out, Some(&mut sums));

            let (expected, expected_sums) = reference_pack(&col_data, zero_point, input_xor, rows);
            assert_eq!(packed, expected.as_slice());
            assert_eq!(sums, expected_sums);
        })
    }

    #[test]
    fn test_stage_partial_chunk() {
        let col: Vec<i8> = (1..=6).collect();
        let cols = [col.as_slice(); PANEL_COLS];
        let zero_point = -3;
        let input_xor = 0x11;

        let staged = stage_partial_chunk(cols, col.len(), zero_point, input_xor);

        for staged_col in staged {
            assert_eq!(&staged_col[..6], &[1, 2, 3, 4, 5, 6]);
            assert_eq!(&staged_col[6..8], &[zero_point, zero_point]);
            assert!(staged_col[8..].iter().all(|&x| x == input_xor));
        }
    }

    #[test]
    fn test_sums_accumulate_across_calls() {
        let rows = 40;
        let data: Vec<i8> = (0..rows as i32 * 2).map(|x| (x % 50) as i8).collect();
        let zero_buf = [0i8; I8_CHUNK_ROWS];
        let kernel = GenericKernel::new().unwrap();

        // Pack the whole column range in one call.
        let mut whole_sums = [0i32; PANEL_COLS];
        let mut out = vec![MaybeUninit::uninit(); packed_i8_panel_len(rows)];
        pack_i8_panel(
            &kernel,
            PanelSource::new(&data, rows, 2, rows, &zero_buf),
            0,
            &mut out,
            Some(&mut whole_sums),
        );

        // Pack the first 32 rows and the remaining 8 rows in separate calls.
        let mut split_sums = [0i32; PANEL_COLS];
        let mut out = vec![MaybeUninit::uninit(); packed_i8_panel_len(32)];
        pack_i8_panel(
            &kernel,
            PanelSource::new(&data, rows, 2, 32, &zero_buf),
            0,
            &mut out,
            Some(&mut split_sums),
        );
        pack_i8_panel(
            &kernel,
            PanelSource::new(&data[32..], rows, 2, 8, &zero_buf),
            0,
            &mut out[..packed_i8_panel_len(8)],
            Some(&mut split_sums),
        );

        assert_eq!(split_sums, whole_sums);
        let expected_col0: i32 = (0..40).sum();
        assert_eq!(whole_sums[0], expected_col0);
    }

    #[test]
    fn test_pack_i8_panel_no_rows() {
        // Source data is shorter than the column stride implies.
        for data in [&[][..], &[1i8; 20][..]] {
            let zero_buf = [0i8; I8_CHUNK_ROWS];
            let kernel = GenericKernel::new().unwrap();
            let mut sums = [3i32; PANEL_COLS];
            let mut out = [MaybeUninit::new(7i8); 4];
            let packed = pack_i8_panel(
                &kernel,
                PanelSource::new(data, 16, PANEL_COLS, 0, &zero_buf),
                -128,
                &mut out,
                Some(&mut sums),
            );
            assert!(packed.is_empty());
            assert_eq!(sums, [3; PANEL_COLS]);
            assert!(out.iter().all(|x| unsafe { x.assume_init() } == 7));
        }
    }

    #[test]
    #[should_panic(expected = "sums must have 8 entries")]
    fn test_pack_i8_panel_short_sums() {
        let data = [0i8; 8];
        let zero_buf = [0i8; I8_CHUNK_ROWS];
        let kernel = GenericKernel::new().unwrap();
        let mut out = vec![MaybeUninit::uninit(); packed_i8_panel_len(8)];
        let mut sums = [0i32; 4];
        pack_i8_panel(
            &kernel,
            PanelSource::new(&data, 8, 1, 8, &zero_buf),
            0,
            &mut out,
            Some(&mut sums),
        );
    }

    #[test]
    #[should_panic(expected = "output buffer too short")]
    fn test_pack_i8_panel_short_output() {
        let data = [0i8; 8];
        let zero_buf = [0i8; I8_CHUNK_ROWS];
        let kernel = GenericKernel::new().unwrap();
        let mut out = vec![MaybeUninit::uninit(); 16];
        pack_i8_panel(
            &kernel,
            PanelSource::new(&data, 8, 1, 8, &zero_buf),
            0,
            &mut out,
            None,
        );
    }
}
