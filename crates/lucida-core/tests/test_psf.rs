use approx::assert_relative_eq;

use lucida_core::psf::{generate_psf, PsfModel};
use lucida_core::volume::VolumeDims;

// ---------------------------------------------------------------------------
// Gaussian PSF
// ---------------------------------------------------------------------------

#[test]
fn gaussian_psf_sums_to_one() {
    let dims = VolumeDims::new(32, 32, 16);
    let psf = generate_psf(
        dims,
        PsfModel::Gaussian {
            sigma_lateral: 2.0,
            sigma_axial: 4.0,
        },
    );
    assert_relative_eq!(psf.sum(), 1.0, epsilon = 1e-4);
}

#[test]
fn gaussian_psf_peak_at_origin() {
    let dims = VolumeDims::new(16, 16, 16);
    let psf = generate_psf(
        dims,
        PsfModel::Gaussian {
            sigma_lateral: 1.5,
            sigma_axial: 1.5,
        },
    );
    let max_val = psf
        .as_slice()
        .iter()
        .fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    assert!(
        (psf.data[[0, 0, 0]] - max_val).abs() < 1e-9,
        "peak should be at origin, got max={max_val} vs origin={}",
        psf.data[[0, 0, 0]]
    );
}

#[test]
fn gaussian_psf_is_nonnegative() {
    let dims = VolumeDims::new(16, 8, 8);
    let psf = generate_psf(
        dims,
        PsfModel::Gaussian {
            sigma_lateral: 2.0,
            sigma_axial: 3.0,
        },
    );
    assert!(
        psf.as_slice().iter().all(|&v| v >= 0.0),
        "PSF must be nonnegative"
    );
}

#[test]
fn gaussian_psf_wraps_symmetrically() {
    // Wrap-around layout: value one voxel right of origin equals the value
    // one voxel before the end of the axis.
    let dims = VolumeDims::new(16, 16, 16);
    let psf = generate_psf(
        dims,
        PsfModel::Gaussian {
            sigma_lateral: 2.0,
            sigma_axial: 2.0,
        },
    );
    assert_relative_eq!(psf.data[[0, 0, 1]], psf.data[[0, 0, 15]], epsilon = 1e-7);
    assert_relative_eq!(psf.data[[0, 1, 0]], psf.data[[0, 15, 0]], epsilon = 1e-7);
    assert_relative_eq!(psf.data[[1, 0, 0]], psf.data[[15, 0, 0]], epsilon = 1e-7);
}

#[test]
fn gaussian_psf_axial_sigma_widens_z() {
    // With a larger axial sigma the kernel must decay slower along z than
    // along x at the same offset.
    let dims = VolumeDims::new(16, 16, 16);
    let psf = generate_psf(
        dims,
        PsfModel::Gaussian {
            sigma_lateral: 1.0,
            sigma_axial: 3.0,
        },
    );
    let along_x = psf.data[[0, 0, 3]];
    let along_z = psf.data[[3, 0, 0]];
    assert!(
        along_z > along_x,
        "axial decay should be slower: z={along_z} x={along_x}"
    );
}

// ---------------------------------------------------------------------------
// Delta PSF
// ---------------------------------------------------------------------------

#[test]
fn delta_psf_is_unit_impulse_at_origin() {
    let dims = VolumeDims::new(8, 8, 8);
    let psf = generate_psf(dims, PsfModel::Delta);
    assert_eq!(psf.data[[0, 0, 0]], 1.0);
    assert_relative_eq!(psf.sum(), 1.0);
    let off_origin: f32 = psf.as_slice()[1..].iter().sum();
    assert_eq!(off_origin, 0.0, "all mass must sit at the origin");
}

// ---------------------------------------------------------------------------
// Model serialization
// ---------------------------------------------------------------------------

#[test]
fn psf_model_serde_round_trip() {
    let model = PsfModel::Gaussian {
        sigma_lateral: 1.8,
        sigma_axial: 5.2,
    };
    let json = serde_json::to_string(&model).expect("serialize");
    let back: PsfModel = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(model, back, "model should survive a serde round trip");
}
