use ndarray::Array3;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::error::{LucidaError, Result};

/// Dimensions of a volume as (N0, N1, N2) = (width, height, depth), with N0
/// the fastest-varying axis. Sample (x, y, z) lives at linear index
/// `x + N0*y + N0*N1*z` in host arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeDims {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl VolumeDims {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Total sample count N0*N1*N2.
    pub fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored complex samples per row of the Hermitian-packed spectrum:
    /// N0/2 + 1 (the redundant conjugate half is omitted).
    pub fn spectrum_width(&self) -> usize {
        self.width / 2 + 1
    }

    /// Total complex samples in the Hermitian-packed spectrum of a volume of
    /// these dimensions: (N0/2+1)*N1*N2.
    pub fn spectrum_len(&self) -> usize {
        self.spectrum_width() * self.height * self.depth
    }

    /// All three extents are powers of two. The GPU backend's radix-2 FFT
    /// only supports such volumes.
    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two()
            && self.height.is_power_of_two()
            && self.depth.is_power_of_two()
    }

    /// Reject non-positive extents.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(LucidaError::InvalidDimensions(format!(
                "volume extents must be positive, got {self}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for VolumeDims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}

/// A 3-D volume of single-precision samples.
///
/// Stored as `Array3<f32>` with shape `(depth, height, width)` in standard C
/// order, which gives the row-major stride {1, N0, N0*N1} expected by the
/// compute backends: `data[[z, y, x]]` is host index `x + N0*y + N0*N1*z`.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub data: Array3<f32>,
}

impl Volume {
    /// Wrap an existing array. Non-contiguous inputs (e.g. slices of a larger
    /// array) are copied into standard layout.
    pub fn new(data: Array3<f32>) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Self { data }
    }

    pub fn zeros(dims: VolumeDims) -> Self {
        Self {
            data: Array3::zeros((dims.depth, dims.height, dims.width)),
        }
    }

    pub fn from_elem(dims: VolumeDims, value: f32) -> Self {
        Self {
            data: Array3::from_elem((dims.depth, dims.height, dims.width), value),
        }
    }

    /// Build a volume from a row-major sample vector (x fastest).
    pub fn from_vec(dims: VolumeDims, samples: Vec<f32>) -> Result<Self> {
        if samples.len() != dims.len() {
            return Err(LucidaError::InvalidDimensions(format!(
                "sample count {} does not match dimensions {dims} ({} samples)",
                samples.len(),
                dims.len()
            )));
        }
        let data = Array3::from_shape_vec((dims.depth, dims.height, dims.width), samples)
            .map_err(|e| LucidaError::InvalidDimensions(e.to_string()))?;
        Ok(Self { data })
    }

    pub fn dims(&self) -> VolumeDims {
        let (depth, height, width) = self.data.dim();
        VolumeDims::new(width, height, depth)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Contiguous row-major view of the samples.
    pub fn as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("volume data is standard layout")
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.data
            .as_slice_mut()
            .expect("volume data is standard layout")
    }

    pub fn mean(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.as_slice().iter().map(|&v| v as f64).sum();
        (sum / self.len() as f64) as f32
    }

    pub fn sum(&self) -> f64 {
        self.as_slice().iter().map(|&v| v as f64).sum()
    }
}

/// The Hermitian-packed real-to-complex spectrum of a [`Volume`].
///
/// Holds `(N0/2+1)*N1*N2` complex samples, each stored as two consecutive
/// f32 values (real, imaginary). Bin (k, y, z) of a source volume with
/// dimensions (N0, N1, N2) lives at complex index `k + (N0/2+1)*y +
/// (N0/2+1)*N1*z`. Bins for k > N0/2 are implied by conjugate symmetry and
/// not stored.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyVolume {
    source_dims: VolumeDims,
    data: Vec<f32>,
}

impl FrequencyVolume {
    pub fn zeros(source_dims: VolumeDims) -> Self {
        Self {
            source_dims,
            data: vec![0.0; 2 * source_dims.spectrum_len()],
        }
    }

    /// Wrap an interleaved spectrum buffer. The vector length must be twice
    /// the packed complex sample count of `source_dims`.
    pub fn from_interleaved(source_dims: VolumeDims, data: Vec<f32>) -> Result<Self> {
        let expected = 2 * source_dims.spectrum_len();
        if data.len() != expected {
            return Err(LucidaError::InvalidDimensions(format!(
                "spectrum length {} does not match source dimensions {source_dims} \
                 (expected {expected} interleaved values)",
                data.len()
            )));
        }
        Ok(Self { source_dims, data })
    }

    /// Dimensions of the spatial volume this spectrum was transformed from.
    pub fn source_dims(&self) -> VolumeDims {
        self.source_dims
    }

    /// Number of stored complex samples.
    pub fn complex_len(&self) -> usize {
        self.data.len() / 2
    }

    /// Interleaved (re, im) view.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_interleaved(self) -> Vec<f32> {
        self.data
    }

    /// Packed bin (k, y, z); `k` must be < N0/2+1.
    pub fn bin(&self, k: usize, y: usize, z: usize) -> Complex32 {
        let sw = self.source_dims.spectrum_width();
        let idx = 2 * (k + sw * (y + self.source_dims.height * z));
        Complex32::new(self.data[idx], self.data[idx + 1])
    }
}
