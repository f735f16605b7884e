use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::DeconvolutionConfig;
use super::observer::{NoOpObserver, RunObserver};
use crate::compute::{ComputeBackend, DeviceBuffer, ElementKind};
use crate::error::{BackendError, IterationStep, LucidaError, Result, RunStage};
use crate::volume::{Volume, VolumeDims};

/// Where a run currently stands. `Converged` means the iteration loop has
/// finished; `Finished` means the estimate has also been transferred back
/// to the host. Termination is by fixed iteration count; a convergence
/// criterion would be an additional exit into `Converged`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Initialized,
    Running { iteration: usize, total: usize },
    Converged,
    Finished,
    Failed,
}

/// Device buffers for one run, allocated up front and reused by every
/// iteration. Dropping them releases the device memory, so failure paths
/// need no explicit cleanup. `reblurred` doubles as the correction-factor
/// volume in the second half of each iteration and as the PSF staging
/// volume before the loop.
struct RunBuffers {
    observed: DeviceBuffer,
    psf: DeviceBuffer,
    estimate: DeviceBuffer,
    reblurred: DeviceBuffer,
    psf_freq: DeviceBuffer,
    estimate_freq: DeviceBuffer,
}

/// Richardson-Lucy deconvolution engine.
///
/// Drives the multiplicative update
/// `estimate <- estimate * (correlate(psf, observed / convolve(psf, estimate)))`
/// entirely through [`ComputeBackend`] primitives. Convolution and
/// correlation run in the frequency domain; the unscaled-inverse factors
/// cancel between the ratio's denominator and the correction factor, so no
/// explicit normalization appears in the loop.
pub struct RichardsonLucy {
    backend: Arc<dyn ComputeBackend>,
    config: DeconvolutionConfig,
    state: RunState,
}

impl RichardsonLucy {
    pub fn new(backend: Arc<dyn ComputeBackend>, config: DeconvolutionConfig) -> Self {
        Self {
            backend,
            config,
            state: RunState::Initialized,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &DeconvolutionConfig {
        &self.config
    }

    /// Run the configured number of iterations and return the restored
    /// volume. The caller supplies the initial estimate; the engine never
    /// seeds one itself (see [`super::FirstGuess`] for common choices).
    ///
    /// Inputs are validated before any device buffer is allocated. On any
    /// failure the device buffers are released and the error names the
    /// stage that failed.
    pub fn run(
        &mut self,
        observed: &Volume,
        psf: &Volume,
        initial_estimate: &Volume,
        observer: &dyn RunObserver,
    ) -> Result<Volume> {
        let result = self.run_guarded(observed, psf, initial_estimate, observer);
        self.state = match &result {
            Ok(_) => RunState::Finished,
            Err(_) => RunState::Failed,
        };
        result
    }

    fn run_guarded(
        &mut self,
        observed: &Volume,
        psf: &Volume,
        initial_estimate: &Volume,
        observer: &dyn RunObserver,
    ) -> Result<Volume> {
        let dims = self.validate(observed, psf, initial_estimate)?;
        info!(
            %dims,
            iterations = self.config.iterations,
            backend = self.backend.name(),
            "starting Richardson-Lucy run"
        );
        self.run_inner(dims, observed, psf, initial_estimate, observer)
    }

    fn validate(&self, observed: &Volume, psf: &Volume, estimate: &Volume) -> Result<VolumeDims> {
        let dims = observed.dims();
        dims.validate()?;
        if psf.dims() != dims {
            return Err(LucidaError::InvalidDimensions(format!(
                "PSF is {} but observed volume is {dims}",
                psf.dims()
            )));
        }
        if estimate.dims() != dims {
            return Err(LucidaError::InvalidDimensions(format!(
                "initial estimate is {} but observed volume is {dims}",
                estimate.dims()
            )));
        }
        if self.config.iterations == 0 {
            return Err(LucidaError::InvalidDimensions(
                "iteration count must be at least 1".into(),
            ));
        }
        if !self.backend.supports_dims(dims) {
            return Err(LucidaError::compute(
                RunStage::PsfTransform,
                BackendError::Transform(format!(
                    "backend {} does not support dimensions {dims}",
                    self.backend.name()
                )),
            ));
        }
        Ok(dims)
    }

    fn run_inner(
        &mut self,
        dims: VolumeDims,
        observed: &Volume,
        psf: &Volume,
        initial_estimate: &Volume,
        observer: &dyn RunObserver,
    ) -> Result<Volume> {
        let backend = self.backend.clone();
        let buffers = self.allocate(dims)?;

        let upload = |host: &[f32], buf: &DeviceBuffer| -> Result<()> {
            backend
                .upload(host, buf)
                .map_err(|e| LucidaError::compute(RunStage::UploadInputs, e))?;
            self.sync(RunStage::UploadInputs)
        };
        upload(observed.as_slice(), &buffers.observed)?;
        upload(psf.as_slice(), &buffers.psf)?;
        upload(initial_estimate.as_slice(), &buffers.estimate)?;

        // PSF spectrum is computed once and stays constant for the run.
        backend
            .forward_transform(dims, &buffers.psf, &buffers.psf_freq)
            .map_err(|e| LucidaError::compute(RunStage::PsfTransform, e))?;
        self.sync(RunStage::PsfTransform)?;

        let total = self.config.iterations;
        observer.begin(total);
        for index in 0..total {
            if observer.should_cancel() {
                warn!(completed = index, "run cancelled at iteration boundary");
                return Err(LucidaError::Cancelled { completed: index });
            }
            self.state = RunState::Running {
                iteration: index + 1,
                total,
            };
            self.iterate(&buffers, dims, index)?;
            observer.iteration_complete(index + 1);
        }
        self.state = RunState::Converged;

        let mut restored = Volume::zeros(dims);
        backend
            .download(&buffers.estimate, restored.as_mut_slice())
            .map_err(|e| LucidaError::compute(RunStage::DownloadEstimate, e))?;
        info!(iterations = total, "run complete");
        Ok(restored)
    }

    fn allocate(&self, dims: VolumeDims) -> Result<RunBuffers> {
        let wrap = |source| LucidaError::compute(RunStage::UploadInputs, source);
        let real = |len| self.backend.alloc(ElementKind::Real, len).map_err(wrap);
        let complex = |len| self.backend.alloc(ElementKind::Complex, len).map_err(wrap);

        let len = dims.len();
        let spectrum_len = dims.spectrum_len();
        Ok(RunBuffers {
            observed: real(len)?,
            psf: real(len)?,
            estimate: real(len)?,
            reblurred: real(len)?,
            psf_freq: complex(spectrum_len)?,
            estimate_freq: complex(spectrum_len)?,
        })
    }

    /// One iteration: blur the estimate by the PSF, divide the observed
    /// volume by the result, back-project the ratio through the PSF, and
    /// scale the estimate by the correction factor. Every primitive is
    /// followed by a device sync; each step writes into a buffer the next
    /// step reads, with the elementwise outputs aliasing an operand.
    fn iterate(&self, buffers: &RunBuffers, dims: VolumeDims, index: usize) -> Result<()> {
        use IterationStep as Step;

        let backend = self.backend.as_ref();
        let stage = |step: Step| RunStage::Iteration {
            index: index + 1,
            step,
        };
        let wrap = |step: Step| move |source| LucidaError::compute(stage(step), source);

        backend
            .forward_transform(dims, &buffers.estimate, &buffers.estimate_freq)
            .map_err(wrap(Step::EstimateTransform))?;
        self.sync(stage(Step::EstimateTransform))?;

        backend
            .complex_multiply(&buffers.estimate_freq, &buffers.psf_freq, &buffers.estimate_freq)
            .map_err(wrap(Step::BlurProduct))?;
        self.sync(stage(Step::BlurProduct))?;

        backend
            .inverse_transform(dims, &buffers.estimate_freq, &buffers.reblurred)
            .map_err(wrap(Step::ReblurInverse))?;
        self.sync(stage(Step::ReblurInverse))?;

        let guarded = backend
            .divide(
                &buffers.observed,
                &buffers.reblurred,
                &buffers.reblurred,
                self.config.zero_guard,
            )
            .map_err(wrap(Step::RatioDivide))?;
        self.sync(stage(Step::RatioDivide))?;
        self.check_degeneracy(index, guarded, dims.len() as u64)?;

        backend
            .forward_transform(dims, &buffers.reblurred, &buffers.estimate_freq)
            .map_err(wrap(Step::RatioTransform))?;
        self.sync(stage(Step::RatioTransform))?;

        backend
            .complex_conjugate_multiply(
                &buffers.estimate_freq,
                &buffers.psf_freq,
                &buffers.estimate_freq,
            )
            .map_err(wrap(Step::CorrelationProduct))?;
        self.sync(stage(Step::CorrelationProduct))?;

        backend
            .inverse_transform(dims, &buffers.estimate_freq, &buffers.reblurred)
            .map_err(wrap(Step::CorrectionInverse))?;
        self.sync(stage(Step::CorrectionInverse))?;

        backend
            .multiply(&buffers.estimate, &buffers.reblurred, &buffers.estimate)
            .map_err(wrap(Step::EstimateUpdate))?;
        self.sync(stage(Step::EstimateUpdate))?;

        debug!(iteration = index + 1, guarded, "iteration complete");
        Ok(())
    }

    fn check_degeneracy(&self, index: usize, guarded: u64, total: u64) -> Result<()> {
        let Some(threshold) = self.config.degeneracy_threshold else {
            return Ok(());
        };
        if !self.config.zero_guard.is_enabled() || total == 0 {
            return Ok(());
        }
        if guarded as f64 / total as f64 > threshold {
            return Err(LucidaError::NumericDegeneracy {
                iteration: index + 1,
                guarded,
                total,
            });
        }
        Ok(())
    }

    fn sync(&self, stage: RunStage) -> Result<()> {
        self.backend
            .synchronize()
            .map_err(|source| LucidaError::compute(stage, source))
    }
}

/// Convenience entry point: build an engine, run it with a no-op observer,
/// and return the restored volume.
pub fn deconvolve(
    backend: Arc<dyn ComputeBackend>,
    observed: &Volume,
    psf: &Volume,
    initial_estimate: &Volume,
    config: &DeconvolutionConfig,
) -> Result<Volume> {
    RichardsonLucy::new(backend, config.clone()).run(observed, psf, initial_estimate, &NoOpObserver)
}
