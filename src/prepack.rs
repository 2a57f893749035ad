//! Packing of whole matrices ahead of time.
//!
//! When the same matrix is used as an input to many multiplications, the
//! work of packing it can be done once with [`PackExecutor::prepack_i8`] or
//! [`PackExecutor::prepack_f32`]. The resulting [`PrepackedMatrix`] holds the
//! packed panels, the column sums and the parameters used to encode it.

use std::fmt::Debug;
use std::mem::MaybeUninit;

use crate::env::Flag;
use crate::errors::PackError;
use crate::kernels::generic::GenericKernel;
use crate::kernels::{
    kernel_types, new_kernel, PackKernel, PackerType, F32_CHUNK_ROWS, I8_CHUNK_ROWS,
};
use crate::matrix::ColMajorMatrix;
use crate::packing::float::{pack_f32_panel, packed_f32_panel_len};
use crate::packing::int8::{pack_i8_panel, packed_i8_panel_len};
use crate::packing::{PanelSource, PANEL_COLS};
use crate::threading::for_each_maybe_parallel;
use crate::timer::Timer;

/// Minimum number of matrix elements for panels to be packed in parallel.
const PARALLEL_MIN_ELEMENTS: usize = 1 << 16;

/// Parameters that control how an int8 matrix is encoded when packed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Int8Params {
    /// Value of the source matrix which represents zero. This is used for
    /// columns past the edge of the matrix and for rows that pad the final
    /// tile.
    pub zero_point: i8,

    /// Value XOR-ed with every packed element. `-128` (`0x80`) converts
    /// between the signed and unsigned ranges, zero leaves values unchanged.
    pub input_xor: i8,

    /// Whether to compute the sum of each packed column.
    pub with_sums: bool,
}

impl Int8Params {
    /// Return the value that the zero point has in the packed data.
    pub fn packed_zero_point(&self) -> i8 {
        self.zero_point ^ self.input_xor
    }
}

impl Default for Int8Params {
    fn default() -> Self {
        Int8Params {
            zero_point: 0,
            input_xor: 0,
            with_sums: true,
        }
    }
}

/// Element types which can be prepacked.
pub trait PackedElement: Copy + Send + Sync {
    /// Parameters which determine how the data is encoded.
    type Params: Copy + Debug + PartialEq;
}

impl PackedElement for i8 {
    type Params = Int8Params;
}

impl PackedElement for f32 {
    type Params = ();
}

/// Size of a packed matrix and the stride between its panels, in elements.
#[derive(Clone, Debug, PartialEq)]
pub struct PackedLayout {
    size: usize,
    panel_stride: usize,
    panels: usize,
}

impl PackedLayout {
    fn new(cols: usize, panel_stride: usize) -> PackedLayout {
        let panels = cols.div_ceil(PANEL_COLS);
        PackedLayout {
            size: panels * panel_stride,
            panel_stride,
            panels,
        }
    }

    /// Return the number of elements in the packed matrix.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Return the stride between panels.
    pub fn panel_stride(&self) -> usize {
        self.panel_stride
    }

    /// Return the number of column panels.
    pub fn panels(&self) -> usize {
        self.panels
    }
}

/// Return the layout of an int8 matrix packed with [`PackExecutor::prepack_i8`].
pub fn packed_i8_layout(rows: usize, cols: usize) -> PackedLayout {
    PackedLayout::new(cols, packed_i8_panel_len(rows))
}

/// Return the layout of an f32 matrix packed with [`PackExecutor::prepack_f32`].
pub fn packed_f32_layout(rows: usize, cols: usize) -> PackedLayout {
    PackedLayout::new(cols, packed_f32_panel_len(rows))
}

/// A matrix that has been packed for use by a matrix multiplication kernel.
#[derive(Clone, Debug)]
pub struct PrepackedMatrix<T: PackedElement> {
    data: Vec<T>,

    /// Sum of each packed column, padded to a multiple of `PANEL_COLS`.
    sums: Option<Vec<i32>>,

    rows: usize,
    cols: usize,
    panel_stride: usize,
    params: T::Params,

    /// Name of the kernel used to pack the data.
    kernel_name: &'static str,
}

impl<T: PackedElement> PrepackedMatrix<T> {
    /// Return number of rows in the source matrix.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Return number of columns in the source matrix.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Return the number of column panels.
    pub fn panel_count(&self) -> usize {
        self.cols.div_ceil(PANEL_COLS)
    }

    /// Return the number of elements in each panel.
    pub fn panel_stride(&self) -> usize {
        self.panel_stride
    }

    /// Return the packed data for the panel containing columns
    /// `index * PANEL_COLS..(index + 1) * PANEL_COLS`.
    pub fn panel(&self, index: usize) -> &[T] {
        let start = index * self.panel_stride;
        &self.data[start..start + self.panel_stride]
    }

    /// Return the packed data for all panels.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Return the column sums, if they were computed.
    ///
    /// There is one entry for each column, including the padding columns
    /// of the last panel.
    pub fn sums(&self) -> Option<&[i32]> {
        self.sums.as_deref()
    }

    /// Return true if column sums were computed.
    pub fn has_sums(&self) -> bool {
        self.sums.is_some()
    }

    /// Return the parameters the data was encoded with.
    pub fn params(&self) -> T::Params {
        self.params
    }

    /// Return the name of the kernel used to pack the data.
    pub fn kernel_name(&self) -> &'static str {
        self.kernel_name
    }

    /// Check that the matrix was encoded with the parameters a consumer
    /// expects.
    pub fn check_params(&self, expected: T::Params) -> Result<(), PackError> {
        if self.params != expected {
            return Err(PackError::ParamsMismatch);
        }
        Ok(())
    }

    /// Extract the packed data.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

/// Packs matrices using a kernel chosen for the current system.
pub struct PackExecutor {
    kernel: Box<dyn PackKernel>,
}

impl PackExecutor {
    /// Create an executor which uses the preferred kernel for the current
    /// system.
    ///
    /// Set the `TILEPACK_FORCE_GENERIC` environment variable to use the
    /// generic kernel instead.
    pub fn new() -> Self {
        if Flag::ForceGeneric.is_enabled() {
            return Self::with_generic_kernel();
        }
        kernel_types()
            .into_iter()
            .find_map(Self::with_kernel)
            .unwrap_or_else(Self::with_generic_kernel)
    }

    /// Create an executor using the given kernel. Returns `None` if the
    /// kernel is not supported.
    pub fn with_kernel(kern_type: PackerType) -> Option<Self> {
        new_kernel(kern_type).map(|kernel| PackExecutor { kernel })
    }

    /// Create an executor that uses the generic kernel.
    pub fn with_generic_kernel() -> Self {
        PackExecutor {
            kernel: Box::new(GenericKernel::default()),
        }
    }

    /// Return the name of the kernel that this executor uses.
    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Return the kernel that this executor uses.
    pub fn kernel(&self) -> &dyn PackKernel {
        self.kernel.as_ref()
    }

    /// Pack an int8 matrix.
    pub fn prepack_i8(&self, mat: ColMajorMatrix<i8>, params: Int8Params) -> PrepackedMatrix<i8> {
        let layout = packed_i8_layout(mat.rows(), mat.cols());
        let mut data = Vec::<i8>::with_capacity(layout.size());
        let mut sums = params
            .with_sums
            .then(|| vec![0i32; layout.panels() * PANEL_COLS]);

        self.pack_i8_panels(
            mat,
            params,
            &mut data.spare_capacity_mut()[..layout.size()],
            sums.as_deref_mut(),
        );

        // Safety: `pack_i8_panels` initialized `layout.size()` elements.
        unsafe { data.set_len(layout.size()) };

        PrepackedMatrix {
            data,
            sums,
            rows: mat.rows(),
            cols: mat.cols(),
            panel_stride: layout.panel_stride(),
            params,
            kernel_name: self.kernel_name(),
        }
    }

    /// Pack an int8 matrix into caller-provided storage.
    ///
    /// `out` must have the length given by [`packed_i8_layout`]. Returns the
    /// column sums if `params.with_sums` is set.
    pub fn prepack_i8_into(
        &self,
        mat: ColMajorMatrix<i8>,
        params: Int8Params,
        out: &mut [MaybeUninit<i8>],
    ) -> Result<Option<Vec<i32>>, PackError> {
        let layout = packed_i8_layout(mat.rows(), mat.cols());
        if out.len() != layout.size() {
            return Err(PackError::OutputSizeMismatch);
        }
        let mut sums = params
            .with_sums
            .then(|| vec![0i32; layout.panels() * PANEL_COLS]);
        self.pack_i8_panels(mat, params, out, sums.as_deref_mut());
        Ok(sums)
    }

    /// Pack an f32 matrix.
    pub fn prepack_f32(&self, mat: ColMajorMatrix<f32>) -> PrepackedMatrix<f32> {
        let layout = packed_f32_layout(mat.rows(), mat.cols());
        let mut data = Vec::<f32>::with_capacity(layout.size());

        self.pack_f32_panels(mat, &mut data.spare_capacity_mut()[..layout.size()]);

        // Safety: `pack_f32_panels` initialized `layout.size()` elements.
        unsafe { data.set_len(layout.size()) };

        PrepackedMatrix {
            data,
            sums: None,
            rows: mat.rows(),
            cols: mat.cols(),
            panel_stride: layout.panel_stride(),
            params: (),
            kernel_name: self.kernel_name(),
        }
    }

    /// Pack an f32 matrix into caller-provided storage.
    ///
    /// `out` must have the length given by [`packed_f32_layout`].
    pub fn prepack_f32_into(
        &self,
        mat: ColMajorMatrix<f32>,
        out: &mut [MaybeUninit<f32>],
    ) -> Result<(), PackError> {
        let layout = packed_f32_layout(mat.rows(), mat.cols());
        if out.len() != layout.size() {
            return Err(PackError::OutputSizeMismatch);
        }
        self.pack_f32_panels(mat, out);
        Ok(())
    }

    fn pack_i8_panels(
        &self,
        mat: ColMajorMatrix<i8>,
        params: Int8Params,
        out: &mut [MaybeUninit<i8>],
        sums: Option<&mut [i32]>,
    ) {
        let layout = packed_i8_layout(mat.rows(), mat.cols());
        debug_assert_eq!(out.len(), layout.size());
        if layout.size() == 0 {
            return;
        }

        let timer = Flag::Timing.is_enabled().then(Timer::start_new);

        let zero_buf = [params.zero_point; I8_CHUNK_ROWS];
        let kernel = self.kernel.as_ref();

        let mut panel_sums = sums.map(|sums| sums.chunks_mut(PANEL_COLS));
        let panels: Vec<_> = out
            .chunks_mut(layout.panel_stride())
            .enumerate()
            .map(|(panel, out)| {
                let sums = panel_sums.as_mut().and_then(|iter| iter.next());
                (panel, out, sums)
            })
            .collect();

        for_each_maybe_parallel(panels, use_parallel(&mat, &layout), |(panel, out, sums)| {
            let col = panel * PANEL_COLS;
            let src = PanelSource::new(
                mat.data_from_col(col),
                mat.col_stride(),
                mat.cols() - col,
                mat.rows(),
                &zero_buf,
            );
            pack_i8_panel(kernel, src, params.input_xor, out, sums);
        });

        if let Some(timer) = timer {
            log_timing("i8", &mat, kernel.name(), timer);
        }
    }

    fn pack_f32_panels(&self, mat: ColMajorMatrix<f32>, out: &mut [MaybeUninit<f32>]) {
        let layout = packed_f32_layout(mat.rows(), mat.cols());
        debug_assert_eq!(out.len(), layout.size());
        if layout.size() == 0 {
            return;
        }

        let timer = Flag::Timing.is_enabled().then(Timer::start_new);

        let zero_buf = [0f32; F32_CHUNK_ROWS];
        let kernel = self.kernel.as_ref();

        let panels: Vec<_> = out.chunks_mut(layout.panel_stride()).enumerate().collect();

        for_each_maybe_parallel(panels, use_parallel(&mat, &layout), |(panel, out)| {
            let col = panel * PANEL_COLS;
            let src = PanelSource::new(
                mat.data_from_col(col),
                mat.col_stride(),
                mat.cols() - col,
                mat.rows(),
                &zero_buf,
            );
            pack_f32_panel(kernel, src, out);
        });

        if let Some(timer) = timer {
            log_timing("f32", &mat, kernel.name(), timer);
        }
    }
}

impl Default for PackExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Return true if a matrix is large enough to pack its panels in parallel.
fn use_parallel<T>(mat: &ColMajorMatrix<T>, layout: &PackedLayout) -> bool {
    layout.panels() > 1 && mat.rows() * mat.cols() >= PARALLEL_MIN_ELEMENTS
}

fn log_timing<T>(dtype: &str, mat: &ColMajorMatrix<T>, kernel_name: &str, mut timer: Timer) {
    timer.end();
    println!(
        "prepack {} [{}, {}] kernel {} in {:.3}ms",
        dtype,
        mat.rows(),
        mat.cols(),
        kernel_name,
        timer.elapsed_ms()
    );
}
