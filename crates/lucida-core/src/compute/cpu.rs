//! CPU reference backend.
//!
//! Buffers are host vectors behind a mutex; the Hermitian-packed 3-D FFT is
//! built from per-axis rustfft single-precision transforms. Elementwise
//! passes snapshot their inputs before writing, so the output buffer may
//! alias either input. Passes over large volumes run on Rayon.

use std::sync::{Arc, Mutex, MutexGuard};

use rayon::prelude::*;
use rustfft::{num_complex::Complex32, Fft, FftPlanner};

use crate::compute::{BufferInner, ComputeBackend, DeviceBuffer, ElementKind, ZeroGuard};
use crate::consts::PARALLEL_VOXEL_THRESHOLD;
use crate::error::BackendResult;
use crate::volume::VolumeDims;

pub struct CpuBackend {
    planner: Mutex<FftPlanner<f32>>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            planner: Mutex::new(FftPlanner::new()),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Buffer access
// ---------------------------------------------------------------------------

fn cpu_data(buf: &DeviceBuffer) -> &Arc<Mutex<Vec<f32>>> {
    match &buf.inner {
        BufferInner::Cpu(data) => data,
        #[cfg(feature = "gpu")]
        BufferInner::Wgpu(_) => panic!("expected CPU buffer, got GPU buffer"),
    }
}

fn lock(data: &Arc<Mutex<Vec<f32>>>) -> MutexGuard<'_, Vec<f32>> {
    data.lock().expect("buffer lock poisoned")
}

// ---------------------------------------------------------------------------
// Elementwise passes
// ---------------------------------------------------------------------------

/// `out[i] = f(a[i], b[i])` over whole buffers. Inputs are snapshotted first,
/// which is what makes `out` aliasing `a` or `b` safe.
fn zip_apply<F>(a: &DeviceBuffer, b: &DeviceBuffer, out: &DeviceBuffer, f: F)
where
    F: Fn(f32, f32) -> f32 + Send + Sync,
{
    let av = lock(cpu_data(a)).clone();
    let bv = lock(cpu_data(b)).clone();
    let mut guard = lock(cpu_data(out));
    let ov: &mut [f32] = &mut guard;
    assert_eq!(av.len(), bv.len(), "elementwise operand length mismatch");
    assert_eq!(av.len(), ov.len(), "elementwise output length mismatch");

    if ov.len() >= PARALLEL_VOXEL_THRESHOLD {
        ov.par_iter_mut()
            .enumerate()
            .for_each(|(i, o)| *o = f(av[i], bv[i]));
    } else {
        for (i, o) in ov.iter_mut().enumerate() {
            *o = f(av[i], bv[i]);
        }
    }
}

/// Complex variant of [`zip_apply`] over interleaved (re, im) buffers.
fn zip_apply_complex<F>(a: &DeviceBuffer, b: &DeviceBuffer, out: &DeviceBuffer, f: F)
where
    F: Fn(Complex32, Complex32) -> Complex32 + Send + Sync,
{
    let av = lock(cpu_data(a)).clone();
    let bv = lock(cpu_data(b)).clone();
    let mut guard = lock(cpu_data(out));
    let ov: &mut [f32] = &mut guard;
    assert_eq!(av.len(), bv.len(), "elementwise operand length mismatch");
    assert_eq!(av.len(), ov.len(), "elementwise output length mismatch");

    let apply = |i: usize, pair: &mut [f32]| {
        let x = Complex32::new(av[2 * i], av[2 * i + 1]);
        let y = Complex32::new(bv[2 * i], bv[2 * i + 1]);
        let v = f(x, y);
        pair[0] = v.re;
        pair[1] = v.im;
    };

    if ov.len() >= PARALLEL_VOXEL_THRESHOLD {
        ov.par_chunks_exact_mut(2)
            .enumerate()
            .for_each(|(i, pair)| apply(i, pair));
    } else {
        for (i, pair) in ov.chunks_exact_mut(2).enumerate() {
            apply(i, pair);
        }
    }
}

/// Division with per-sample guard reporting. Returns the guarded count.
fn divide_counting<F>(a: &DeviceBuffer, b: &DeviceBuffer, out: &DeviceBuffer, f: F) -> u64
where
    F: Fn(f32, f32) -> (f32, bool) + Send + Sync,
{
    let av = lock(cpu_data(a)).clone();
    let bv = lock(cpu_data(b)).clone();
    let mut guard = lock(cpu_data(out));
    let ov: &mut [f32] = &mut guard;
    assert_eq!(av.len(), bv.len(), "elementwise operand length mismatch");
    assert_eq!(av.len(), ov.len(), "elementwise output length mismatch");

    if ov.len() >= PARALLEL_VOXEL_THRESHOLD {
        ov.par_iter_mut()
            .enumerate()
            .map(|(i, o)| {
                let (v, guarded) = f(av[i], bv[i]);
                *o = v;
                guarded as u64
            })
            .sum()
    } else {
        let mut count = 0u64;
        for (i, o) in ov.iter_mut().enumerate() {
            let (v, guarded) = f(av[i], bv[i]);
            *o = v;
            count += guarded as u64;
        }
        count
    }
}

// ---------------------------------------------------------------------------
// 3-D Hermitian-packed FFT
// ---------------------------------------------------------------------------

/// Run `fft` over every grid line along one axis, in place. Line `i` starts
/// at `base_of(i)` and its elements are `stride` apart.
fn transform_lines(
    grid: &mut [Complex32],
    fft: &Arc<dyn Fft<f32>>,
    lines: usize,
    len: usize,
    stride: usize,
    base_of: impl Fn(usize) -> usize + Sync,
) {
    // A length-1 transform is the identity.
    if len <= 1 {
        return;
    }

    if grid.len() >= PARALLEL_VOXEL_THRESHOLD {
        let source: &[Complex32] = grid;
        let transformed: Vec<(usize, Vec<Complex32>)> = (0..lines)
            .into_par_iter()
            .map(|i| {
                let base = base_of(i);
                let mut line: Vec<Complex32> =
                    (0..len).map(|j| source[base + j * stride]).collect();
                fft.process(&mut line);
                (base, line)
            })
            .collect();
        for (base, line) in transformed {
            for (j, v) in line.into_iter().enumerate() {
                grid[base + j * stride] = v;
            }
        }
    } else {
        let mut line = vec![Complex32::new(0.0, 0.0); len];
        for i in 0..lines {
            let base = base_of(i);
            for (j, slot) in line.iter_mut().enumerate() {
                *slot = grid[base + j * stride];
            }
            fft.process(&mut line);
            for (j, v) in line.iter().enumerate() {
                grid[base + j * stride] = *v;
            }
        }
    }
}

fn complex_to_interleaved(src: &[Complex32], dst: &mut [f32]) {
    assert_eq!(dst.len(), 2 * src.len(), "interleaved buffer length mismatch");
    for (pair, v) in dst.chunks_exact_mut(2).zip(src) {
        pair[0] = v.re;
        pair[1] = v.im;
    }
}

fn interleaved_to_complex(src: &[f32]) -> Vec<Complex32> {
    src.chunks_exact(2)
        .map(|pair| Complex32::new(pair[0], pair[1]))
        .collect()
}

// ---------------------------------------------------------------------------
// Backend implementation
// ---------------------------------------------------------------------------

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn supports_dims(&self, dims: VolumeDims) -> bool {
        // rustfft is mixed-radix; any positive extent works.
        !dims.is_empty()
    }

    fn alloc(&self, kind: ElementKind, len: usize) -> BackendResult<DeviceBuffer> {
        // Host allocation failure aborts rather than erroring, so this path
        // cannot observe it; Allocation errors are raised by the GPU backend.
        let f32_len = match kind {
            ElementKind::Real => len,
            ElementKind::Complex => 2 * len,
        };
        Ok(DeviceBuffer::new_cpu(vec![0.0; f32_len], kind))
    }

    fn upload(&self, host: &[f32], dst: &DeviceBuffer) -> BackendResult<()> {
        let mut guard = lock(cpu_data(dst));
        assert_eq!(host.len(), guard.len(), "upload length mismatch");
        guard.copy_from_slice(host);
        Ok(())
    }

    fn download(&self, src: &DeviceBuffer, host: &mut [f32]) -> BackendResult<()> {
        let guard = lock(cpu_data(src));
        assert_eq!(host.len(), guard.len(), "download length mismatch");
        host.copy_from_slice(&guard);
        Ok(())
    }

    fn forward_transform(
        &self,
        dims: VolumeDims,
        src: &DeviceBuffer,
        dst: &DeviceBuffer,
    ) -> BackendResult<()> {
        let (n0, n1, n2) = (dims.width, dims.height, dims.depth);
        let n0h = dims.spectrum_width();
        assert_eq!(src.len(), dims.len(), "forward transform input mismatch");
        assert_eq!(
            dst.len(),
            2 * dims.spectrum_len(),
            "forward transform output mismatch"
        );

        let (fft_x, fft_y, fft_z) = {
            let mut planner = self.planner.lock().expect("planner lock poisoned");
            (
                planner.plan_fft_forward(n0),
                planner.plan_fft_forward(n1),
                planner.plan_fft_forward(n2),
            )
        };

        let input = lock(cpu_data(src)).clone();
        let mut grid = vec![Complex32::new(0.0, 0.0); n0h * n1 * n2];

        // Width axis, real-to-complex: transform each contiguous row and keep
        // the non-redundant half of the spectrum.
        let r2c_row = |in_row: &[f32], out_row: &mut [Complex32]| {
            let mut row: Vec<Complex32> =
                in_row.iter().map(|&v| Complex32::new(v, 0.0)).collect();
            fft_x.process(&mut row);
            out_row.copy_from_slice(&row[..n0h]);
        };
        if dims.len() >= PARALLEL_VOXEL_THRESHOLD {
            grid.par_chunks_mut(n0h)
                .zip(input.par_chunks(n0))
                .for_each(|(out_row, in_row)| r2c_row(in_row, out_row));
        } else {
            for (out_row, in_row) in grid.chunks_mut(n0h).zip(input.chunks(n0)) {
                r2c_row(in_row, out_row);
            }
        }

        // Height axis: lines of length n1, one per (x, z) pair.
        transform_lines(&mut grid, &fft_y, n0h * n2, n1, n0h, |i| {
            let x = i % n0h;
            let z = i / n0h;
            x + n0h * n1 * z
        });

        // Depth axis: lines of length n2, one per (x, y) pair.
        transform_lines(&mut grid, &fft_z, n0h * n1, n2, n0h * n1, |i| i);

        complex_to_interleaved(&grid, &mut lock(cpu_data(dst)));
        Ok(())
    }

    fn inverse_transform(
        &self,
        dims: VolumeDims,
        src: &DeviceBuffer,
        dst: &DeviceBuffer,
    ) -> BackendResult<()> {
        let (n0, n1, n2) = (dims.width, dims.height, dims.depth);
        let n0h = dims.spectrum_width();
        assert_eq!(
            src.len(),
            2 * dims.spectrum_len(),
            "inverse transform input mismatch"
        );
        assert_eq!(dst.len(), dims.len(), "inverse transform output mismatch");

        let (ifft_x, ifft_y, ifft_z) = {
            let mut planner = self.planner.lock().expect("planner lock poisoned");
            (
                planner.plan_fft_inverse(n0),
                planner.plan_fft_inverse(n1),
                planner.plan_fft_inverse(n2),
            )
        };

        let mut grid = interleaved_to_complex(&lock(cpu_data(src)));

        transform_lines(&mut grid, &ifft_z, n0h * n1, n2, n0h * n1, |i| i);
        transform_lines(&mut grid, &ifft_y, n0h * n2, n1, n0h, |i| {
            let x = i % n0h;
            let z = i / n0h;
            x + n0h * n1 * z
        });

        // Width axis, complex-to-real: expand each packed row to the full
        // spectrum via conjugate symmetry, inverse transform, take the real
        // part. No normalization: the inverse is unscaled by convention.
        let mut guard = lock(cpu_data(dst));
        let output: &mut [f32] = &mut guard;
        let c2r_row = |packed: &[Complex32], out_row: &mut [f32]| {
            let mut row = vec![Complex32::new(0.0, 0.0); n0];
            row[..n0h].copy_from_slice(packed);
            for k in n0h..n0 {
                row[k] = packed[n0 - k].conj();
            }
            ifft_x.process(&mut row);
            for (o, v) in out_row.iter_mut().zip(&row) {
                *o = v.re;
            }
        };
        if dims.len() >= PARALLEL_VOXEL_THRESHOLD {
            output
                .par_chunks_mut(n0)
                .zip(grid.par_chunks(n0h))
                .for_each(|(out_row, packed)| c2r_row(packed, out_row));
        } else {
            for (out_row, packed) in output.chunks_mut(n0).zip(grid.chunks(n0h)) {
                c2r_row(packed, out_row);
            }
        }
        Ok(())
    }

    fn complex_multiply(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
    ) -> BackendResult<()> {
        zip_apply_complex(a, b, out, |x, y| x * y);
        Ok(())
    }

    fn complex_conjugate_multiply(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
    ) -> BackendResult<()> {
        zip_apply_complex(a, b, out, |x, y| x * y.conj());
        Ok(())
    }

    fn divide(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
        guard: ZeroGuard,
    ) -> BackendResult<u64> {
        match guard {
            ZeroGuard::Disabled => {
                zip_apply(a, b, out, |x, y| x / y);
                Ok(0)
            }
            ZeroGuard::ClampToZero { epsilon } => Ok(divide_counting(a, b, out, move |x, y| {
                if y.abs() <= epsilon {
                    (0.0, true)
                } else {
                    (x / y, false)
                }
            })),
            ZeroGuard::Floor { epsilon } => Ok(divide_counting(a, b, out, move |x, y| {
                if y < epsilon {
                    (x / epsilon, true)
                } else {
                    (x / y, false)
                }
            })),
        }
    }

    fn multiply(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
    ) -> BackendResult<()> {
        zip_apply(a, b, out, |x, y| x * y);
        Ok(())
    }

    fn synchronize(&self) -> BackendResult<()> {
        // CPU primitives complete before they return.
        Ok(())
    }
}
