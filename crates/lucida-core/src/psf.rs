//! Synthetic point-spread functions.
//!
//! PSFs are generated at the full volume dimensions in wrap-around layout:
//! the kernel center sits at sample (0, 0, 0) and the tails wrap to the far
//! edges, which is the layout circular convolution expects. All PSFs are
//! normalized to unit sum so convolving with them preserves total intensity.

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_PSF_SIGMA_AXIAL, DEFAULT_PSF_SIGMA_LATERAL};
use crate::volume::{Volume, VolumeDims};

/// Synthetic PSF shape.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsfModel {
    /// Anisotropic 3-D Gaussian. Microscope PSFs are wider along the optical
    /// (z) axis, hence separate lateral and axial sigmas in voxels.
    Gaussian {
        sigma_lateral: f32,
        sigma_axial: f32,
    },
    /// Unit impulse at the origin. Convolution by this PSF is the identity.
    Delta,
}

impl Default for PsfModel {
    fn default() -> Self {
        Self::Gaussian {
            sigma_lateral: DEFAULT_PSF_SIGMA_LATERAL,
            sigma_axial: DEFAULT_PSF_SIGMA_AXIAL,
        }
    }
}

/// Generate a PSF volume of the given dimensions.
pub fn generate_psf(dims: VolumeDims, model: PsfModel) -> Volume {
    match model {
        PsfModel::Gaussian {
            sigma_lateral,
            sigma_axial,
        } => gaussian(dims, sigma_lateral, sigma_axial),
        PsfModel::Delta => delta(dims),
    }
}

/// Origin-centered unit impulse.
pub fn delta(dims: VolumeDims) -> Volume {
    let mut psf = Volume::zeros(dims);
    psf.data[[0, 0, 0]] = 1.0;
    psf
}

/// Origin-centered anisotropic Gaussian, unit sum.
pub fn gaussian(dims: VolumeDims, sigma_lateral: f32, sigma_axial: f32) -> Volume {
    let mut psf = Volume::zeros(dims);
    let two_sl2 = 2.0 * sigma_lateral * sigma_lateral;
    let two_sa2 = 2.0 * sigma_axial * sigma_axial;

    let mut sum = 0.0f64;
    for z in 0..dims.depth {
        // Wrap-around distance from the origin along each axis.
        let dz = wrap_distance(z, dims.depth);
        for y in 0..dims.height {
            let dy = wrap_distance(y, dims.height);
            for x in 0..dims.width {
                let dx = wrap_distance(x, dims.width);
                let value = (-(dx * dx + dy * dy) / two_sl2 - (dz * dz) / two_sa2).exp();
                psf.data[[z, y, x]] = value;
                sum += value as f64;
            }
        }
    }

    if sum > 0.0 {
        let inv = (1.0 / sum) as f32;
        psf.data.mapv_inplace(|v| v * inv);
    }
    psf
}

fn wrap_distance(i: usize, n: usize) -> f32 {
    if i <= n / 2 {
        i as f32
    } else {
        (n - i) as f32
    }
}
