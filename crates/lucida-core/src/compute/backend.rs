use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consts::DEFAULT_GUARD_EPSILON;
use crate::error::{BackendResult, Result};
use crate::volume::VolumeDims;

use super::cpu::CpuBackend;
#[cfg(feature = "gpu")]
use super::wgpu_backend::WgpuBackend;

/// What a device buffer holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    /// f32 samples.
    Real,
    /// Interleaved (re, im) f32 pairs.
    Complex,
}

/// Policy for the spatial-domain divide when the denominator is at or near
/// zero.
///
/// The default reproduces the unguarded upstream behavior: IEEE-754 division,
/// so zero denominators yield `inf`/`NaN` that propagate into later steps.
/// The guarded policies are opt-in for production data with empty regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroGuard {
    /// Unconditional division.
    #[default]
    Disabled,
    /// Quotient forced to 0.0 wherever |denominator| <= epsilon.
    ClampToZero {
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    /// Denominator replaced by epsilon wherever it falls below epsilon.
    Floor {
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
}

fn default_epsilon() -> f32 {
    DEFAULT_GUARD_EPSILON
}

impl ZeroGuard {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

#[derive(Clone)]
pub(crate) enum BufferInner {
    Cpu(Arc<Mutex<Vec<f32>>>),
    #[cfg(feature = "gpu")]
    Wgpu(Arc<wgpu::Buffer>),
}

/// Handle to a device buffer owned by one backend.
///
/// Handles are cheap reference-counted clones of the same device memory;
/// dropping the last one releases it, which is how buffers are released on
/// every exit path, including failures mid-run.
#[derive(Clone)]
pub struct DeviceBuffer {
    pub(crate) inner: BufferInner,
    len: usize,
    kind: ElementKind,
}

impl DeviceBuffer {
    pub(crate) fn new_cpu(data: Vec<f32>, kind: ElementKind) -> Self {
        let len = data.len();
        Self {
            inner: BufferInner::Cpu(Arc::new(Mutex::new(data))),
            len,
            kind,
        }
    }

    #[cfg(feature = "gpu")]
    pub(crate) fn new_wgpu(buffer: wgpu::Buffer, len: usize, kind: ElementKind) -> Self {
        Self {
            inner: BufferInner::Wgpu(Arc::new(buffer)),
            len,
            kind,
        }
    }

    /// Length in f32 values (a complex buffer of n samples reports 2n).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Both handles refer to the same device memory. Elementwise operations
    /// use this to honor their aliasing contract.
    pub fn aliases(&self, other: &DeviceBuffer) -> bool {
        match (&self.inner, &other.inner) {
            (BufferInner::Cpu(a), BufferInner::Cpu(b)) => Arc::ptr_eq(a, b),
            #[cfg(feature = "gpu")]
            (BufferInner::Wgpu(a), BufferInner::Wgpu(b)) => Arc::ptr_eq(a, b),
            #[cfg(feature = "gpu")]
            _ => false,
        }
    }
}

/// Device primitives the Richardson-Lucy engine is built from.
///
/// Transform convention: `forward_transform` packs the spectrum of a real
/// volume in Hermitian-interleaved layout ((N0/2+1)*N1*N2 complex samples);
/// `inverse_transform` is **unscaled**, so a forward/inverse round trip
/// reproduces the input multiplied by the volume sample count N0*N1*N2.
/// Callers needing a true inverse must divide that factor out themselves.
/// Both backends apply the convention identically.
///
/// Elementwise operations allow `out` to alias `a` or `b`; each output sample
/// depends only on the same-index input samples.
///
/// Every operation is synchronous from the caller's point of view once
/// [`ComputeBackend::synchronize`] returns; the engine calls it after every
/// primitive.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_gpu(&self) -> bool {
        false
    }

    /// Whether this backend can transform volumes of the given dimensions.
    /// The engine checks this before allocating anything.
    fn supports_dims(&self, dims: VolumeDims) -> bool;

    /// Allocate a zero-initialized device buffer of `len` elements of `kind`.
    fn alloc(&self, kind: ElementKind, len: usize) -> BackendResult<DeviceBuffer>;

    /// Copy a host slice into a device buffer. `host.len()` must equal the
    /// buffer's f32 length.
    fn upload(&self, host: &[f32], dst: &DeviceBuffer) -> BackendResult<()>;

    /// Copy a device buffer into a host slice of the same f32 length.
    fn download(&self, src: &DeviceBuffer, host: &mut [f32]) -> BackendResult<()>;

    /// Real-to-complex transform of a `dims`-shaped real buffer into a
    /// Hermitian-packed complex buffer of `dims.spectrum_len()` samples.
    fn forward_transform(
        &self,
        dims: VolumeDims,
        src: &DeviceBuffer,
        dst: &DeviceBuffer,
    ) -> BackendResult<()>;

    /// Unscaled complex-to-real inverse of [`ComputeBackend::forward_transform`].
    fn inverse_transform(
        &self,
        dims: VolumeDims,
        src: &DeviceBuffer,
        dst: &DeviceBuffer,
    ) -> BackendResult<()>;

    /// Per complex sample: `out = a * b`.
    fn complex_multiply(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
    ) -> BackendResult<()>;

    /// Per complex sample: `out = a * conj(b)`.
    fn complex_conjugate_multiply(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
    ) -> BackendResult<()>;

    /// Per real sample: `out = a / b`, subject to `guard`. Returns how many
    /// samples triggered the guard (always 0 when disabled).
    fn divide(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
        guard: ZeroGuard,
    ) -> BackendResult<u64>;

    /// Per real sample: `out = a * b`.
    fn multiply(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
    ) -> BackendResult<()>;

    /// Block until all previously issued operations have completed.
    fn synchronize(&self) -> BackendResult<()>;
}

/// Which backend `create_backend` should produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// GPU when one can be acquired, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

/// Create a compute backend according to the preference.
///
/// `Gpu` fails with [`LucidaError::PlatformUnavailable`] when the build has no
/// GPU support and [`LucidaError::DeviceUnavailable`] when no adapter/device
/// can be acquired. `Auto` logs the failure and falls back to the CPU.
pub fn create_backend(preference: &DevicePreference) -> Result<Arc<dyn ComputeBackend>> {
    match preference {
        DevicePreference::Cpu => Ok(Arc::new(CpuBackend::new())),
        DevicePreference::Gpu => create_gpu_backend(),
        DevicePreference::Auto => match create_gpu_backend() {
            Ok(backend) => Ok(backend),
            Err(e) => {
                warn!(error = %e, "GPU backend unavailable, falling back to CPU");
                Ok(Arc::new(CpuBackend::new()))
            }
        },
    }
}

#[cfg(feature = "gpu")]
fn create_gpu_backend() -> Result<Arc<dyn ComputeBackend>> {
    let backend = WgpuBackend::new()?;
    tracing::info!(adapter = %backend.adapter_name(), "using GPU backend");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "gpu"))]
fn create_gpu_backend() -> Result<Arc<dyn ComputeBackend>> {
    Err(crate::error::LucidaError::PlatformUnavailable(
        "built without GPU support (enable the `gpu` feature)".into(),
    ))
}
