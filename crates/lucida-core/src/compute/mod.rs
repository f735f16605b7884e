//! Compute backends: device buffers, Hermitian-packed FFT transforms, and the
//! elementwise operations the deconvolution engine is composed of.

mod backend;

pub mod cpu;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub(crate) use backend::BufferInner;
pub use backend::{
    create_backend, ComputeBackend, DeviceBuffer, DevicePreference, ElementKind, ZeroGuard,
};
