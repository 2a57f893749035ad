use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Errors with inputs to the prepacking functions.
#[derive(Clone, Debug, PartialEq)]
pub enum PackError {
    /// Column stride is smaller than the number of rows, so columns overlap.
    InvalidStride,
    /// Source data is too short for the given shape and stride.
    DataTooShort,
    /// The buffer provided for the packed output has the wrong length.
    OutputSizeMismatch,
    /// The data was packed with different encoding parameters than the
    /// consumer expects.
    ParamsMismatch,
}

impl Display for PackError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidStride => {
                write!(fmt, "column stride must be at least the number of rows")
            }
            Self::DataTooShort => write!(fmt, "data is too short for matrix shape"),
            Self::OutputSizeMismatch => write!(fmt, "output buffer has wrong length"),
            Self::ParamsMismatch => {
                write!(fmt, "matrix was packed with different parameters")
            }
        }
    }
}

impl Error for PackError {}
