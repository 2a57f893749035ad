use std::mem::MaybeUninit;

use crate::packing::PANEL_COLS;

pub mod generic;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

/// Rows in each tile of the int8 packed layout. Each group of this many
/// consecutive elements from one column is stored contiguously, as required
/// by `4 x i8 -> i32` dot product instructions.
pub const I8_TILE_ROWS: usize = 4;

/// Number of int8 tiles packed per iteration.
pub const I8_TILES_PER_CHUNK: usize = 8;

/// Rows of the source panel consumed by each int8 chunk.
pub const I8_CHUNK_ROWS: usize = I8_TILE_ROWS * I8_TILES_PER_CHUNK;

/// Packed elements produced by each int8 chunk.
pub const I8_CHUNK_LEN: usize = I8_CHUNK_ROWS * PANEL_COLS;

/// Rows of the source panel consumed by each f32 chunk.
pub const F32_CHUNK_ROWS: usize = 8;

/// Packed elements produced by each f32 chunk.
pub const F32_CHUNK_LEN: usize = F32_CHUNK_ROWS * PANEL_COLS;

/// Architecture-specific operations which pack one full chunk of a panel.
///
/// The iteration over chunks and the handling of the incomplete final chunk
/// are shared between implementations (see [`crate::packing`]). Only the
/// operations that pack a complete chunk, which is where nearly all the time
/// is spent, are specialized for each instruction set.
///
/// All implementations must produce bit-identical outputs and sums for the
/// same inputs, as the consumer of the packed data does not know which kernel
/// packed it.
///
/// # Safety
///
/// It must only be possible to construct the kernel using `new` if the
/// instructions it uses are supported on the current system.
pub unsafe trait PackKernel: Sync {
    /// Construct a new instance of this kernel, if supported on the current
    /// system.
    fn new() -> Option<Self>
    where
        Self: Sized;

    /// Return a name for this kernel for use in logging etc.
    fn name(&self) -> &'static str;

    /// Pack a chunk of [`I8_CHUNK_ROWS`] rows from each column of an int8
    /// panel.
    ///
    /// For tile `i`, column `j` and row-in-tile `s` this writes
    /// `out[(PANEL_COLS * i + j) * I8_TILE_ROWS + s] = cols[j][I8_TILE_ROWS * i + s] ^ input_xor`.
    ///
    /// If `sums` is provided, the biased values of each column, interpreted
    /// as `i8`, are added to the column's entry using wrapping arithmetic.
    fn pack_i8_chunk(
        &self,
        cols: [&[i8; I8_CHUNK_ROWS]; PANEL_COLS],
        input_xor: i8,
        out: &mut [MaybeUninit<i8>; I8_CHUNK_LEN],
        sums: Option<&mut [i32; PANEL_COLS]>,
    );

    /// Transpose an 8x8 chunk of an f32 panel, such that
    /// `out[PANEL_COLS * i + j] = cols[j][i]`.
    fn pack_f32_chunk(
        &self,
        cols: [&[f32; F32_CHUNK_ROWS]; PANEL_COLS],
        out: &mut [MaybeUninit<f32>; F32_CHUNK_LEN],
    );
}

/// Argument for [`PackExecutor::with_kernel`](crate::PackExecutor::with_kernel)
/// specifying which kernel to use.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PackerType {
    /// Use the fallback/generic kernel. Always available.
    Generic,

    /// Use the AVX 2 kernel. Intel x64 only.
    #[cfg(target_arch = "x86_64")]
    Avx2,
}

/// Return all the kernel types supported on the current system, in order of
/// preference.
pub fn kernel_types() -> Vec<PackerType> {
    let mut types = Vec::new();

    #[cfg(target_arch = "x86_64")]
    {
        if x86_64::Avx2Kernel::new().is_some() {
            types.push(PackerType::Avx2);
        }
    }

    types.push(PackerType::Generic);

    types
}

/// Instantiate a kernel of the given type, if supported.
pub fn new_kernel(kern_type: PackerType) -> Option<Box<dyn PackKernel>> {
    fn boxed<K: PackKernel + 'static>() -> Option<Box<dyn PackKernel>> {
        K::new().map(|k| Box::new(k) as Box<dyn PackKernel>)
    }

    match kern_type {
        #[cfg(target_arch = "x86_64")]
        PackerType::Avx2 => boxed::<x86_64::Avx2Kernel>(),
        PackerType::Generic => boxed::<generic::GenericKernel>(),
    }
}

#[cfg(test)]
mod tests {
    use std::mem::MaybeUninit;

    use super::{
        kernel_types, new_kernel, PackKernel, PackerType, F32_CHUNK_LEN, I8_CHUNK_LEN,
        I8_CHUNK_ROWS, I8_TILE_ROWS,
    };
    use crate::packing::PANEL_COLS;

    fn all_kernels() -> Vec<Box<dyn PackKernel>> {
        kernel_types()
            .into_iter()
            .map(|kt| new_kernel(kt).unwrap())
            .collect()
    }

    #[test]
    fn test_kernel_types() {
        let types = kernel_types();
        assert_eq!(types.last(), Some(&PackerType::Generic));
        for kt in types {
            assert!(new_kernel(kt).is_some());
        }
    }

    #[test]
    fn test_pack_i8_chunk() {
        let mut rng = fastrand::Rng::with_seed(1234);
        let cols: [[i8; I8_CHUNK_ROWS]; PANEL_COLS] =
            std::array::from_fn(|_| std::array::from_fn(|_| rng.i8(..)));
        let col_refs = cols.each_ref();

        for kernel in all_kernels() {
            for input_xor in [0, -128, 0x55] {
                let mut out = [MaybeUninit::new(0i8); I8_CHUNK_LEN];
                let mut sums = [7i32; PANEL_COLS];
                kernel.pack_i8_chunk(col_refs, input_xor, &mut out, Some(&mut sums));
                let out = out.map(|x| unsafe { x.assume_init() });

                for i in 0..I8_CHUNK_ROWS / I8_TILE_ROWS {
                    for j in 0..PANEL_COLS {
                        for s in 0..I8_TILE_ROWS {
                            assert_eq!(
                                out[(PANEL_COLS * i + j) * I8_TILE_ROWS + s],
                                cols[j][I8_TILE_ROWS * i + s] ^ input_xor,
                                "kernel {} tile {} col {} row {}",
                                kernel.name(),
                                i,
                                j,
                                s
                            );
                        }
                    }
                }

                for j in 0..PANEL_COLS {
                    let expected: i32 = cols[j].iter().map(|&x| (x ^ input_xor) as i32).sum();
                    assert_eq!(sums[j], 7 + expected, "kernel {}", kernel.name());
                }
            }
        }
    }

    #[test]
    fn test_pack_i8_chunk_without_sums() {
        let cols: [[i8; I8_CHUNK_ROWS]; PANEL_COLS] =
            std::array::from_fn(|j| std::array::from_fn(|r| (j * 32 + r) as i8));

        for kernel in all_kernels() {
            let mut out = [MaybeUninit::new(0i8); I8_CHUNK_LEN];
            kernel.pack_i8_chunk(cols.each_ref(), 0, &mut out, None);
            let out = out.map(|x| unsafe { x.assume_init() });

            // First tile holds rows 0..4 of each column in turn.
            assert_eq!(&out[..8], &[0, 1, 2, 3, 32, 33, 34, 35]);
        }
    }

    #[test]
    fn test_pack_f32_chunk() {
        let cols: [[f32; 8]; PANEL_COLS] =
            std::array::from_fn(|j| std::array::from_fn(|i| (j * 10 + i) as f32));

        for kernel in all_kernels() {
            let mut out = [MaybeUninit::new(0f32); F32_CHUNK_LEN];
            kernel.pack_f32_chunk(cols.each_ref(), &mut out);
            let out = out.map(|x| unsafe { x.assume_init() });

            for i in 0..8 {
                for j in 0..PANEL_COLS {
                    assert_eq!(out[i * 8 + j], cols[j][i], "kernel {}", kernel.name());
                }
            }
        }
    }
}
