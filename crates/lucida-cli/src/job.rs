use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use lucida_core::compute::DevicePreference;
use lucida_core::deconv::{DeconvolutionConfig, FirstGuess};
use lucida_core::psf::PsfModel;

/// A full deconvolution job as stored in a TOML file. Exactly one of
/// `psf_file` and `psf_model` should be set; `psf_file` wins when both are.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Observed volume (.lvol).
    pub input: PathBuf,
    /// Restored volume destination (.lvol).
    pub output: PathBuf,

    /// Measured PSF volume, matching the input dimensions.
    #[serde(default)]
    pub psf_file: Option<PathBuf>,
    /// Synthetic PSF, generated at the input dimensions.
    #[serde(default)]
    pub psf_model: Option<PsfModel>,

    #[serde(default)]
    pub device: DevicePreference,
    #[serde(default)]
    pub deconvolution: DeconvolutionConfig,
    #[serde(default)]
    pub first_guess: FirstGuess,

    /// Optional preview image written next to the output (.png or .tiff).
    #[serde(default)]
    pub preview: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("observed.lvol"),
            output: PathBuf::from("restored.lvol"),
            psf_file: None,
            psf_model: Some(PsfModel::default()),
            device: DevicePreference::Auto,
            deconvolution: DeconvolutionConfig::default(),
            first_guess: FirstGuess::Observed,
            preview: None,
        }
    }
}
