//! tilepack rearranges the operands of a matrix multiplication into the
//! tiled layouts that SIMD multiplication kernels consume.
//!
//! # Packed layouts
//!
//! Source matrices are column-major, with an arbitrary stride between
//! columns. They are packed one panel of [`PANEL_COLS`] columns at a time.
//!
//! - **int8**: each panel is split into tiles of 8 columns x 4 rows. Within a
//!   tile the 4 values of a column are contiguous, matching the `4 x i8 -> i32`
//!   dot product instructions. Every packed value is XOR-ed with a bias
//!   (`input_xor`), and the sum of each packed column can be computed at the
//!   same time for use in zero point correction.
//! - **f32**: each panel is stored row-major, with the 8 values from one row
//!   of the panel contiguous.
//!
//! Columns past the right edge of the matrix are filled from a zero buffer,
//! and rows of an int8 panel are padded to a multiple of 4.
//!
//! # Packing a panel
//!
//! [`pack_i8_panel`] and [`pack_f32_panel`] pack a single panel described by a
//! [`PanelSource`] into caller-provided storage, using a [`PackKernel`]
//! appropriate for the CPU.
//!
//! # Packing a whole matrix
//!
//! [`PackExecutor`] selects a kernel at runtime and packs all panels of a
//! [`ColMajorMatrix`], producing a [`PrepackedMatrix`]:
//!
//! ```
//! use tilepack::{ColMajorMatrix, Int8Params, PackExecutor};
//!
//! let data: Vec<i8> = (0..40).collect();
//! let mat = ColMajorMatrix::from_data(&data, 5, 8).unwrap();
//! let packed = PackExecutor::default().prepack_i8(
//!     mat,
//!     Int8Params {
//!         zero_point: 0,
//!         input_xor: 0,
//!         with_sums: true,
//!     },
//! );
//! assert_eq!(packed.panel_count(), 1);
//! assert_eq!(packed.sums().unwrap()[0], 1 + 2 + 3 + 4);
//! ```
//!
//! ## Threading
//!
//! Panels of large matrices are packed in parallel using a Rayon thread pool,
//! sized to the number of physical cores. See [`threading::thread_pool`].
//!
//! ## Environment variables
//!
//! - `TILEPACK_FORCE_GENERIC`: use the portable kernel even if a faster one
//!   is available.
//! - `TILEPACK_NUM_THREADS`: size of the thread pool.
//! - `TILEPACK_TIMING`: print the time taken to pack each matrix.

mod env;
mod errors;
mod kernels;
mod matrix;
mod packing;
mod prepack;
mod timer;

pub mod threading;


pub use errors::PackError;
pub use kernels::generic::GenericKernel;
#[cfg(target_arch = "x86_64")]
pub use kernels::x86_64::Avx2Kernel;
pub use kernels::{
    kernel_types, PackKernel, PackerType, F32_CHUNK_ROWS, I8_CHUNK_ROWS, I8_TILE_ROWS,
};
pub use matrix::ColMajorMatrix;
pub use packing::float::{pack_f32_panel, packed_f32_panel_len};
pub use packing::int8::{pack_i8_panel, packed_i8_panel_len};
pub use packing::{PanelSource, PANEL_COLS};
pub use prepack::{
    packed_f32_layout, packed_i8_layout, Int8Params, PackExecutor, PackedElement, PackedLayout,
    PrepackedMatrix,
};
