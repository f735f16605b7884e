//! Host-level transform and convolution entry points.
//!
//! These wrap the backend primitives for callers that want a one-shot
//! spectrum or convolution rather than a full deconvolution run. They
//! allocate their device buffers per call; the iteration engine manages
//! its own buffer set instead (see [`crate::deconv`]).

use tracing::debug;

use crate::compute::{ComputeBackend, ElementKind};
use crate::error::{BackendError, LucidaError, Result, RunStage};
use crate::volume::{FrequencyVolume, Volume, VolumeDims};

fn ensure_supported(backend: &dyn ComputeBackend, dims: VolumeDims, stage: RunStage) -> Result<()> {
    dims.validate()?;
    if !backend.supports_dims(dims) {
        return Err(LucidaError::compute(
            stage,
            BackendError::Transform(format!(
                "backend {} does not support dimensions {dims}",
                backend.name()
            )),
        ));
    }
    Ok(())
}

/// Forward real-to-complex transform of a volume, Hermitian-packed.
pub fn forward_transform(backend: &dyn ComputeBackend, volume: &Volume) -> Result<FrequencyVolume> {
    let dims = volume.dims();
    let stage = RunStage::ForwardTransform;
    ensure_supported(backend, dims, stage)?;
    debug!(%dims, backend = backend.name(), "forward transform");

    let wrap = |source| LucidaError::compute(stage, source);
    let spatial = backend.alloc(ElementKind::Real, dims.len()).map_err(wrap)?;
    let spectrum = backend
        .alloc(ElementKind::Complex, dims.spectrum_len())
        .map_err(wrap)?;

    backend.upload(volume.as_slice(), &spatial).map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;
    backend
        .forward_transform(dims, &spatial, &spectrum)
        .map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;

    let mut freq = FrequencyVolume::zeros(dims);
    backend.download(&spectrum, freq.as_mut_slice()).map_err(wrap)?;
    Ok(freq)
}

/// Inverse complex-to-real transform. Unscaled: the result of a forward
/// and inverse round trip is the input times the volume element count.
pub fn inverse_transform(backend: &dyn ComputeBackend, freq: &FrequencyVolume) -> Result<Volume> {
    let dims = freq.source_dims();
    let stage = RunStage::InverseTransform;
    ensure_supported(backend, dims, stage)?;
    debug!(%dims, backend = backend.name(), "inverse transform");

    let wrap = |source| LucidaError::compute(stage, source);
    let spectrum = backend
        .alloc(ElementKind::Complex, dims.spectrum_len())
        .map_err(wrap)?;
    let spatial = backend.alloc(ElementKind::Real, dims.len()).map_err(wrap)?;

    backend.upload(freq.as_slice(), &spectrum).map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;
    backend
        .inverse_transform(dims, &spectrum, &spatial)
        .map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;

    let mut out = Volume::zeros(dims);
    backend.download(&spatial, out.as_mut_slice()).map_err(wrap)?;
    Ok(out)
}

/// Circular convolution of `volume` with `kernel` via the frequency domain.
///
/// The output carries the unscaled-inverse factor: it is the true circular
/// convolution times the volume element count. Callers that want the
/// normalized result divide it out (the CLI does this before writing files).
pub fn convolve(backend: &dyn ComputeBackend, volume: &Volume, kernel: &Volume) -> Result<Volume> {
    let dims = volume.dims();
    if kernel.dims() != dims {
        return Err(LucidaError::InvalidDimensions(format!(
            "volume is {dims} but kernel is {}",
            kernel.dims()
        )));
    }
    let stage = RunStage::Convolution;
    ensure_supported(backend, dims, stage)?;
    debug!(%dims, backend = backend.name(), "convolve");

    let wrap = |source| LucidaError::compute(stage, source);
    let spatial = backend.alloc(ElementKind::Real, dims.len()).map_err(wrap)?;
    let volume_freq = backend
        .alloc(ElementKind::Complex, dims.spectrum_len())
        .map_err(wrap)?;
    let kernel_freq = backend
        .alloc(ElementKind::Complex, dims.spectrum_len())
        .map_err(wrap)?;

    backend.upload(volume.as_slice(), &spatial).map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;
    backend
        .forward_transform(dims, &spatial, &volume_freq)
        .map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;

    backend.upload(kernel.as_slice(), &spatial).map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;
    backend
        .forward_transform(dims, &spatial, &kernel_freq)
        .map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;

    // The product may land in one of its operands.
    backend
        .complex_multiply(&volume_freq, &kernel_freq, &volume_freq)
        .map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;
    backend
        .inverse_transform(dims, &volume_freq, &spatial)
        .map_err(wrap)?;
    backend.synchronize().map_err(wrap)?;

    let mut out = Volume::zeros(dims);
    backend.download(&spatial, out.as_mut_slice()).map_err(wrap)?;
    Ok(out)
}
