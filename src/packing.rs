//! Packing of column panels into the tiled layouts used by matrix
//! multiplication kernels.
//!
//! A panel is a group of up to [`PANEL_COLS`] adjacent columns of a
//! column-major source matrix. Packing reads the panel one chunk of rows at a
//! time. Full chunks are handed to a [`PackKernel`](crate::PackKernel) which
//! writes them straight to the output. The final chunk, if it is incomplete,
//! is staged with padding and packed into a [`TrailingBuf`], from which only
//! the valid prefix is merged into the output.

use std::mem::MaybeUninit;

pub mod float;
pub mod int8;

/// Number of source columns packed together into one panel.
pub const PANEL_COLS: usize = 8;

/// Source panel for a packing call.
///
/// This describes up to [`PANEL_COLS`] columns of a column-major matrix. The
/// rows of each column must be contiguous. Columns at index `remaining_cols`
/// and beyond are read from `zero_buf` instead of `data`.
#[derive(Clone, Copy, Debug)]
pub struct PanelSource<'a, T> {
    data: &'a [T],
    col_stride: usize,
    remaining_cols: usize,
    rows: usize,
    zero_buf: &'a [T],
}

impl<'a, T> PanelSource<'a, T> {
    /// Describe a panel whose first column starts at `data[0]`.
    ///
    /// `remaining_cols` is the number of columns of the source matrix from
    /// the start of the panel to the right edge. It may be larger than
    /// [`PANEL_COLS`], in which case the panel is full.
    ///
    /// Panics if `data` is too short to hold `rows` elements for each of the
    /// columns that are read from it, or if `zero_buf` is empty.
    pub fn new(
        data: &'a [T],
        col_stride: usize,
        remaining_cols: usize,
        rows: usize,
        zero_buf: &'a [T],
    ) -> Self {
        assert!(!zero_buf.is_empty(), "zero buffer must not be empty");
        let remaining_cols = remaining_cols.min(PANEL_COLS);
        if remaining_cols > 0 && rows > 0 {
            assert!(
                data.len() >= (remaining_cols - 1) * col_stride + rows,
                "source data too short for panel"
            );
        }
        PanelSource {
            data,
            col_stride,
            remaining_cols,
            rows,
            zero_buf,
        }
    }

    /// Number of rows in the panel.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns read from the source data. The rest are padding.
    pub fn valid_cols(&self) -> usize {
        self.remaining_cols
    }

    /// Value that the zero buffer substitutes for missing elements.
    pub fn zero_point(&self) -> T
    where
        T: Copy,
    {
        self.zero_buf[0]
    }

    /// Return read cursors for the panel's columns, requiring the zero buffer
    /// to have at least `chunk_rows` elements.
    pub(crate) fn cursors(&self, chunk_rows: usize) -> ColumnCursors<'a, T> {
        assert!(
            self.zero_buf.len() >= chunk_rows,
            "zero buffer must have at least {} elements",
            chunk_rows
        );

        // An empty panel may have data shorter than its column stride implies.
        let cols = std::array::from_fn(|col| {
            if col < self.remaining_cols && self.rows > 0 {
                let start = col * self.col_stride;
                &self.data[start..start + self.rows]
            } else if col < self.remaining_cols {
                &self.data[..0]
            } else {
                self.zero_buf
            }
        });
        let advance = std::array::from_fn(|col| usize::from(col < self.remaining_cols));

        ColumnCursors { cols, advance }
    }
}

/// Read cursors over the columns of a panel.
///
/// Each cursor is a base slice plus an advance of 1 (a real column) or 0 (the
/// shared zero buffer). Reading the rows at `start` from a zero-advance cursor
/// always returns the start of the zero buffer, so columns past the edge of
/// the matrix need no branches in the packing loops.
pub(crate) struct ColumnCursors<'a, T> {
    cols: [&'a [T]; PANEL_COLS],
    advance: [usize; PANEL_COLS],
}

impl<'a, T> ColumnCursors<'a, T> {
    /// Return `len` rows from each column starting at row `start`.
    #[inline]
    pub fn rows(&self, start: usize, len: usize) -> [&'a [T]; PANEL_COLS] {
        std::array::from_fn(|col| {
            let offset = start * self.advance[col];
            &self.cols[col][offset..offset + len]
        })
    }

    /// Return a full chunk of `ROWS` rows from each column starting at row
    /// `start`.
    #[inline]
    pub fn chunk<const ROWS: usize>(&self, start: usize) -> [&'a [T; ROWS]; PANEL_COLS] {
        self.rows(start, ROWS).map(|col| {
            col.first_chunk::<ROWS>()
                .expect("column slice has chunk length")
        })
    }
}

/// Stack-allocated scratch buffer for the incomplete final chunk of a panel.
///
/// The packers write the whole final chunk, including padding, into this
/// buffer and then [merge](TrailingBuf::merge_into) the part which belongs to
/// the packed output. This keeps writes within the output buffer, which is
/// only padded to the tile size rather than the chunk size.
pub struct TrailingBuf<T, const LEN: usize> {
    data: [MaybeUninit<T>; LEN],
}

impl<T: Copy + Default, const LEN: usize> TrailingBuf<T, LEN> {
    /// Create a zero-filled buffer.
    pub fn new() -> Self {
        TrailingBuf {
            data: [MaybeUninit::new(T::default()); LEN],
        }
    }

    /// Return the buffer contents for writing a chunk.
    pub fn as_mut(&mut self) -> &mut [MaybeUninit<T>; LEN] {
        &mut self.data
    }

    /// Copy the first `len` elements to `out[offset..offset + len]`.
    pub fn merge_into(&self, out: &mut [MaybeUninit<T>], offset: usize, len: usize) {
        debug_assert!(len <= LEN);
        out[offset..offset + len].copy_from_slice(&self.data[..len]);
    }

    /// Return the initialized contents of the buffer.
    #[cfg(test)]
    pub fn as_slice(&self) -> &[T] {
        // Safety: All elements are initialized in `new`.
        unsafe { std::mem::transmute::<&[MaybeUninit<T>], &[T]>(&self.data[..]) }
    }
}

impl<T: Copy + Default, const LEN: usize> Default for TrailingBuf<T, LEN> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mark the first `len` elements of `out` as initialized and return them.
///
/// # Safety
///
/// The caller must have initialized `out[..len]`.
unsafe fn assume_init_prefix<T>(out: &mut [MaybeUninit<T>], len: usize) -> &mut [T] {
    let prefix = &mut out[..len];
    unsafe { std::mem::transmute::<&mut [MaybeUninit<T>], &mut [T]>(prefix) }
}
