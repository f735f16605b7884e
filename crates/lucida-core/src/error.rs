use thiserror::Error;

/// One of the eight steps of a Richardson-Lucy iteration, named for error
/// reporting and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationStep {
    EstimateTransform,
    BlurProduct,
    ReblurInverse,
    RatioDivide,
    RatioTransform,
    CorrelationProduct,
    CorrectionInverse,
    EstimateUpdate,
}

impl std::fmt::Display for IterationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EstimateTransform => write!(f, "forward transform of estimate"),
            Self::BlurProduct => write!(f, "frequency product with PSF"),
            Self::ReblurInverse => write!(f, "inverse transform of reblurred estimate"),
            Self::RatioDivide => write!(f, "division of observed by reblurred"),
            Self::RatioTransform => write!(f, "forward transform of ratio"),
            Self::CorrelationProduct => write!(f, "conjugate frequency product with PSF"),
            Self::CorrectionInverse => write!(f, "inverse transform of correction"),
            Self::EstimateUpdate => write!(f, "estimate update"),
        }
    }
}

/// Stage of a run at which a compute failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStage {
    UploadInputs,
    PsfTransform,
    Iteration { index: usize, step: IterationStep },
    DownloadEstimate,
    ForwardTransform,
    InverseTransform,
    Convolution,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UploadInputs => write!(f, "input upload"),
            Self::PsfTransform => write!(f, "PSF transform"),
            Self::Iteration { index, step } => write!(f, "iteration {index}, {step}"),
            Self::DownloadEstimate => write!(f, "estimate download"),
            Self::ForwardTransform => write!(f, "forward transform"),
            Self::InverseTransform => write!(f, "inverse transform"),
            Self::Convolution => write!(f, "convolution"),
        }
    }
}

/// Failures raised by a compute backend primitive. The engine wraps these in
/// [`LucidaError::Compute`] together with the [`RunStage`] that issued the
/// primitive.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("allocation of {bytes} bytes failed: {detail}")]
    Allocation { bytes: usize, detail: String },

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("kernel launch failed: {0}")]
    KernelLaunch(String),

    #[error("host transfer failed: {0}")]
    Transfer(String),

    #[error("synchronization failed: {0}")]
    Sync(String),
}

#[derive(Error, Debug)]
pub enum LucidaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no compute platform available: {0}")]
    PlatformUnavailable(String),

    #[error("no compute device available: {0}")]
    DeviceUnavailable(String),

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("compute failure during {stage}: {source}")]
    Compute {
        stage: RunStage,
        #[source]
        source: BackendError,
    },

    #[error(
        "numeric degeneracy at iteration {iteration}: \
         {guarded} of {total} samples hit the zero guard"
    )]
    NumericDegeneracy {
        iteration: usize,
        guarded: u64,
        total: u64,
    },

    #[error("run cancelled after {completed} iterations")]
    Cancelled { completed: usize },

    #[error("invalid volume file: {0}")]
    InvalidVolume(String),

    #[error("image format error: {0}")]
    ImageError(#[from] image::ImageError),
}

impl LucidaError {
    /// Attach the run stage to a backend failure.
    pub fn compute(stage: RunStage, source: BackendError) -> Self {
        Self::Compute { stage, source }
    }
}

pub type Result<T> = std::result::Result<T, LucidaError>;

/// Result type of individual backend primitives, before the engine attaches
/// stage context.
pub type BackendResult<T> = std::result::Result<T, BackendError>;
