use crate::errors::PackError;

/// Borrowed view of a column-major matrix.
///
/// Elements within a column are contiguous. Consecutive columns are separated
/// by `col_stride` elements, which may be larger than the number of rows if
/// the matrix is a view of part of a larger one.
#[derive(Clone, Copy, Debug)]
pub struct ColMajorMatrix<'a, T> {
    data: &'a [T],
    rows: usize,
    cols: usize,
    col_stride: usize,
}

impl<'a, T> ColMajorMatrix<'a, T> {
    /// Create a view of `data` with a given shape and column stride.
    pub fn new(
        data: &'a [T],
        rows: usize,
        cols: usize,
        col_stride: usize,
    ) -> Result<Self, PackError> {
        if cols > 1 && col_stride < rows {
            return Err(PackError::InvalidStride);
        }
        let min_len = if rows == 0 || cols == 0 {
            0
        } else {
            (cols - 1) * col_stride + rows
        };
        if data.len() < min_len {
            return Err(PackError::DataTooShort);
        }
        Ok(ColMajorMatrix {
            data,
            rows,
            cols,
            col_stride,
        })
    }

    /// Create a view of contiguous column-major data.
    pub fn from_data(data: &'a [T], rows: usize, cols: usize) -> Result<Self, PackError> {
        Self::new(data, rows, cols, rows)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn col_stride(&self) -> usize {
        self.col_stride
    }

    /// Return the data starting at column `col`.
    ///
    /// Returns an empty slice if the matrix is empty.
    pub fn data_from_col(&self, col: usize) -> &'a [T] {
        let offset = (col * self.col_stride).min(self.data.len());
        &self.data[offset..]
    }

    /// Return the element at a given row and column, or `None` if out of
    /// bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<&'a T> {
        if row < self.rows && col < self.cols {
            self.data.get(col * self.col_stride + row)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use tilepack_testing::TestCases;

    use super::ColMajorMatrix;
    use crate::errors::PackError;

    #[test]
    fn test_col_major_matrix_new() {
        #[derive(Debug)]
        struct Case {
            len: usize,
            rows: usize,
            cols: usize,
            col_stride: usize,
            expected: Result<(), PackError>,
        }

        let cases = [
            Case {
                len: 6,
                rows: 2,
                cols: 3,
                col_stride: 2,
                expected: Ok(()),
            },
            // Final column does not need to be padded to the stride.
            Case {
                len: 10,
                rows: 2,
                cols: 3,
                col_stride: 4,
                expected: Ok(()),
            },
            Case {
                len: 9,
                rows: 2,
                cols: 3,
                col_stride: 4,
                expected: Err(PackError::DataTooShort),
            },
            Case {
                len: 6,
                rows: 3,
                cols: 2,
                col_stride: 2,
                expected: Err(PackError::InvalidStride),
            },
            // Stride is irrelevant for a single column.
            Case {
                len: 5,
                rows: 5,
                cols: 1,
                col_stride: 0,
                expected: Ok(()),
            },
            Case {
                len: 0,
                rows: 0,
                cols: 4,
                col_stride: 0,
                expected: Ok(()),
            },
        ];

        cases.test_each(|case| {
            let data = vec![0i8; case.len];
            let result = ColMajorMatrix::new(&data, case.rows, case.cols, case.col_stride);
            assert_eq!(result.map(|_| ()), case.expected);
        })
    }

    #[test]
    fn test_col_major_matrix_get() {
        let data = [1, 2, 3, 0, 4, 5, 6];
        let mat = ColMajorMatrix::new(&data, 3, 2, 4).unwrap();
        assert_eq!(mat.get(2, 0), Some(&3));
        assert_eq!(mat.get(0, 1), Some(&4));
        assert_eq!(mat.get(3, 0), None);
        assert_eq!(mat.get(0, 2), None);
        assert_eq!(mat.data_from_col(1), &[4, 5, 6]);
    }
}
