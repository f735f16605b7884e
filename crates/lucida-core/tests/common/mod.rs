use lucida_core::compute::ComputeBackend;
use lucida_core::transform::convolve;
use lucida_core::volume::{Volume, VolumeDims};

/// Smoothly varying, strictly positive test volume.
pub fn ramp_volume(dims: VolumeDims) -> Volume {
    let len = dims.len() as f32;
    let data = (0..dims.len()).map(|i| 0.1 + i as f32 / len).collect();
    Volume::from_vec(dims, data).expect("ramp volume")
}

/// Deterministic pseudo-random volume with values in (0, 1).
///
/// Uses a fixed LCG so failures reproduce exactly across runs.
pub fn noise_volume(dims: VolumeDims, seed: u64) -> Volume {
    let mut state = seed
        .wrapping_mul(0x5851_f42d_4c95_7f2d)
        .wrapping_add(0x1405_7b7e_f767_814f);
    let data = (0..dims.len())
        .map(|_| {
            state = state
                .wrapping_mul(0x5851_f42d_4c95_7f2d)
                .wrapping_add(0x1405_7b7e_f767_814f);
            0.05 + 0.9 * ((state >> 40) as f32 / (1u64 << 24) as f32)
        })
        .collect();
    Volume::from_vec(dims, data).expect("noise volume")
}

/// Direct spatial-domain circular convolution, the quadratic reference the
/// frequency-domain path is checked against. Accumulates in f64.
pub fn circular_convolve(a: &Volume, b: &Volume) -> Volume {
    let dims = a.dims();
    assert_eq!(dims, b.dims(), "operands must share dimensions");
    let (w, h, d) = (dims.width, dims.height, dims.depth);

    let mut out = Volume::zeros(dims);
    for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0.0f64;
                for kz in 0..d {
                    for ky in 0..h {
                        for kx in 0..w {
                            let sx = (x + w - kx) % w;
                            let sy = (y + h - ky) % h;
                            let sz = (z + d - kz) % d;
                            acc += a.data[[sz, sy, sx]] as f64 * b.data[[kz, ky, kx]] as f64;
                        }
                    }
                }
                out.data[[z, y, x]] = acc as f32;
            }
        }
    }
    out
}

/// L2 norm of `observed - psf (*) estimate`, with the transform scale of
/// [`convolve`] divided out so the residual compares against the true reblur.
pub fn fit_residual(
    backend: &dyn ComputeBackend,
    observed: &Volume,
    psf: &Volume,
    estimate: &Volume,
) -> f64 {
    let scale = observed.dims().len() as f64;
    let reblurred = convolve(backend, estimate, psf).expect("convolve for residual");
    observed
        .as_slice()
        .iter()
        .zip(reblurred.as_slice())
        .map(|(&o, &r)| {
            let diff = o as f64 - r as f64 / scale;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

/// Largest absolute difference between two volumes of equal dimensions.
pub fn max_abs_diff(a: &Volume, b: &Volume) -> f32 {
    a.as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(&x, &y)| (x - y).abs())
        .fold(0.0f32, f32::max)
}
