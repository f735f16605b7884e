#[allow(dead_code)]
mod common;

use lucida_core::compute::cpu::CpuBackend;
use lucida_core::compute::{ComputeBackend, DeviceBuffer, ElementKind, ZeroGuard};
use lucida_core::volume::{Volume, VolumeDims};

use common::{noise_volume, ramp_volume};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn upload_real(backend: &CpuBackend, vol: &Volume) -> DeviceBuffer {
    let buf = backend
        .alloc(ElementKind::Real, vol.len())
        .expect("alloc real");
    backend.upload(vol.as_slice(), &buf).expect("upload");
    buf
}

fn download_all(backend: &CpuBackend, buf: &DeviceBuffer) -> Vec<f32> {
    let mut out = vec![0.0f32; buf.len()];
    backend.download(buf, &mut out).expect("download");
    out
}

/// Forward-then-inverse transform of `vol`, returned without rescaling.
fn round_trip(backend: &CpuBackend, vol: &Volume) -> Vec<f32> {
    let dims = vol.dims();
    let spatial = upload_real(backend, vol);
    let freq = backend
        .alloc(ElementKind::Complex, dims.spectrum_len())
        .expect("alloc complex");
    let restored = backend
        .alloc(ElementKind::Real, dims.len())
        .expect("alloc out");

    backend
        .forward_transform(dims, &spatial, &freq)
        .expect("forward");
    backend
        .inverse_transform(dims, &freq, &restored)
        .expect("inverse");
    download_all(backend, &restored)
}

// ---------------------------------------------------------------------------
// Buffer management
// ---------------------------------------------------------------------------

#[test]
fn alloc_is_zero_initialized() {
    let backend = CpuBackend::new();
    let buf = backend.alloc(ElementKind::Real, 64).expect("alloc");
    let data = download_all(&backend, &buf);
    assert!(data.iter().all(|&v| v == 0.0), "fresh buffers must be zero");
}

#[test]
fn complex_buffer_len_counts_f32s() {
    let backend = CpuBackend::new();
    let buf = backend.alloc(ElementKind::Complex, 10).expect("alloc");
    assert_eq!(buf.len(), 20, "complex buffers hold two f32 per sample");
    assert_eq!(buf.kind(), ElementKind::Complex);
}

#[test]
fn upload_download_round_trips() {
    let backend = CpuBackend::new();
    let vol = ramp_volume(VolumeDims::new(4, 3, 2));
    let buf = upload_real(&backend, &vol);
    let back = download_all(&backend, &buf);
    assert_eq!(back, vol.as_slice(), "upload/download must be lossless");
}

#[test]
fn buffers_know_when_they_alias() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Real, 8).expect("alloc");
    let b = backend.alloc(ElementKind::Real, 8).expect("alloc");
    let a2 = a.clone();
    assert!(a.aliases(&a2));
    assert!(!a.aliases(&b));
}

// ---------------------------------------------------------------------------
// Transform round trips: inverse(forward(v)) == v * N, no normalization
// ---------------------------------------------------------------------------

#[test]
fn round_trip_scales_by_len_power_of_two() {
    let backend = CpuBackend::new();
    let dims = VolumeDims::new(8, 8, 8);
    let vol = noise_volume(dims, 11);
    let restored = round_trip(&backend, &vol);

    let n = dims.len() as f32;
    for (i, (&orig, &got)) in vol.as_slice().iter().zip(&restored).enumerate() {
        assert!(
            (got - orig * n).abs() < 1e-2,
            "voxel {i}: expected {} got {got}",
            orig * n
        );
    }
}

#[test]
fn round_trip_scales_by_len_mixed_radix() {
    // The CPU path is not limited to power-of-two extents.
    let backend = CpuBackend::new();
    let dims = VolumeDims::new(6, 5, 3);
    let vol = noise_volume(dims, 23);
    let restored = round_trip(&backend, &vol);

    let n = dims.len() as f32;
    for (&orig, &got) in vol.as_slice().iter().zip(&restored) {
        assert!(
            (got - orig * n).abs() < 1e-2,
            "expected {} got {got}",
            orig * n
        );
    }
}

#[test]
fn round_trip_handles_flat_volume() {
    // Depth-1 volumes degenerate to a 2-D transform and must still work.
    let backend = CpuBackend::new();
    let dims = VolumeDims::new(8, 4, 1);
    let vol = ramp_volume(dims);
    let restored = round_trip(&backend, &vol);

    let n = dims.len() as f32;
    for (&orig, &got) in vol.as_slice().iter().zip(&restored) {
        assert!(
            (got - orig * n).abs() < 1e-3,
            "expected {} got {got}",
            orig * n
        );
    }
}

#[test]
fn round_trip_large_volume_spot_checked() {
    let backend = CpuBackend::new();
    let dims = VolumeDims::new(64, 64, 32);
    let vol = noise_volume(dims, 7);
    let restored = round_trip(&backend, &vol);

    let n = dims.len() as f32;
    let orig = vol.as_slice();
    // Sampling keeps the test fast while still covering the whole extent.
    for i in (0..dims.len()).step_by(997) {
        assert!(
            (restored[i] - orig[i] * n).abs() < 0.5,
            "voxel {i}: expected {} got {}",
            orig[i] * n,
            restored[i]
        );
    }
}

// ---------------------------------------------------------------------------
// Spectrum contents
// ---------------------------------------------------------------------------

#[test]
fn delta_transforms_to_unit_spectrum() {
    let backend = CpuBackend::new();
    let dims = VolumeDims::new(8, 4, 4);
    let mut vol = Volume::zeros(dims);
    vol.data[[0, 0, 0]] = 1.0;

    let spatial = upload_real(&backend, &vol);
    let freq = backend
        .alloc(ElementKind::Complex, dims.spectrum_len())
        .expect("alloc");
    backend
        .forward_transform(dims, &spatial, &freq)
        .expect("forward");

    let spectrum = download_all(&backend, &freq);
    for pair in spectrum.chunks_exact(2) {
        assert!(
            (pair[0] - 1.0).abs() < 1e-5 && pair[1].abs() < 1e-5,
            "delta spectrum should be 1+0i everywhere, got {}+{}i",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn constant_volume_concentrates_in_dc_bin() {
    let backend = CpuBackend::new();
    let dims = VolumeDims::new(4, 4, 4);
    let vol = Volume::from_elem(dims, 2.0);

    let spatial = upload_real(&backend, &vol);
    let freq = backend
        .alloc(ElementKind::Complex, dims.spectrum_len())
        .expect("alloc");
    backend
        .forward_transform(dims, &spatial, &freq)
        .expect("forward");

    let spectrum = download_all(&backend, &freq);
    let dc = 2.0 * dims.len() as f32;
    assert!(
        (spectrum[0] - dc).abs() < 1e-3,
        "DC bin should be {dc}, got {}",
        spectrum[0]
    );
    for (i, &v) in spectrum.iter().enumerate().skip(2) {
        assert!(v.abs() < 1e-3, "bin f32[{i}] should vanish, got {v}");
    }
}

// ---------------------------------------------------------------------------
// Elementwise arithmetic
// ---------------------------------------------------------------------------

#[test]
fn complex_multiply_matches_hand_computation() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Complex, 2).expect("alloc");
    let b = backend.alloc(ElementKind::Complex, 2).expect("alloc");
    let out = backend.alloc(ElementKind::Complex, 2).expect("alloc");

    // (1+2i)(3+4i) = -5+10i, (2-1i)(1+1i) = 3+1i
    backend.upload(&[1.0, 2.0, 2.0, -1.0], &a).expect("upload a");
    backend.upload(&[3.0, 4.0, 1.0, 1.0], &b).expect("upload b");
    backend.complex_multiply(&a, &b, &out).expect("multiply");

    let got = download_all(&backend, &out);
    assert_eq!(got, vec![-5.0, 10.0, 3.0, 1.0]);
}

#[test]
fn complex_conjugate_multiply_matches_hand_computation() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Complex, 2).expect("alloc");
    let b = backend.alloc(ElementKind::Complex, 2).expect("alloc");
    let out = backend.alloc(ElementKind::Complex, 2).expect("alloc");

    // (1+2i)*conj(3+4i) = (1+2i)(3-4i) = 11+2i
    // (2-1i)*conj(1+1i) = (2-1i)(1-1i) = 1-3i
    backend.upload(&[1.0, 2.0, 2.0, -1.0], &a).expect("upload a");
    backend.upload(&[3.0, 4.0, 1.0, 1.0], &b).expect("upload b");
    backend
        .complex_conjugate_multiply(&a, &b, &out)
        .expect("conjugate multiply");

    let got = download_all(&backend, &out);
    assert_eq!(got, vec![11.0, 2.0, 1.0, -3.0]);
}

#[test]
fn real_multiply_is_elementwise() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Real, 4).expect("alloc");
    let b = backend.alloc(ElementKind::Real, 4).expect("alloc");
    let out = backend.alloc(ElementKind::Real, 4).expect("alloc");

    backend.upload(&[1.0, 2.0, 3.0, 4.0], &a).expect("upload a");
    backend.upload(&[5.0, 6.0, 7.0, 8.0], &b).expect("upload b");
    backend.multiply(&a, &b, &out).expect("multiply");

    assert_eq!(download_all(&backend, &out), vec![5.0, 12.0, 21.0, 32.0]);
}

#[test]
fn divide_unguarded_propagates_nonfinite_values() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Real, 3).expect("alloc");
    let b = backend.alloc(ElementKind::Real, 3).expect("alloc");
    let out = backend.alloc(ElementKind::Real, 3).expect("alloc");

    backend.upload(&[1.0, 0.0, 6.0], &a).expect("upload a");
    backend.upload(&[0.0, 0.0, 2.0], &b).expect("upload b");
    let guarded = backend
        .divide(&a, &b, &out, ZeroGuard::Disabled)
        .expect("divide");

    assert_eq!(guarded, 0, "disabled guard never reports hits");
    let got = download_all(&backend, &out);
    assert!(got[0].is_infinite(), "1/0 should be inf, got {}", got[0]);
    assert!(got[1].is_nan(), "0/0 should be NaN, got {}", got[1]);
    assert_eq!(got[2], 3.0);
}

#[test]
fn divide_clamp_to_zero_counts_hits() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Real, 4).expect("alloc");
    let b = backend.alloc(ElementKind::Real, 4).expect("alloc");
    let out = backend.alloc(ElementKind::Real, 4).expect("alloc");

    backend.upload(&[1.0, 2.0, 3.0, 4.0], &a).expect("upload a");
    backend
        .upload(&[0.0, 1e-9, -1e-9, 2.0], &b)
        .expect("upload b");
    let guarded = backend
        .divide(&a, &b, &out, ZeroGuard::ClampToZero { epsilon: 1e-6 })
        .expect("divide");

    assert_eq!(guarded, 3, "three denominators fall inside the guard band");
    let got = download_all(&backend, &out);
    assert_eq!(&got[..3], &[0.0, 0.0, 0.0]);
    assert_eq!(got[3], 2.0);
}

#[test]
fn divide_floor_substitutes_epsilon_denominator() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Real, 3).expect("alloc");
    let b = backend.alloc(ElementKind::Real, 3).expect("alloc");
    let out = backend.alloc(ElementKind::Real, 3).expect("alloc");

    backend.upload(&[1.0, 4.0, 9.0], &a).expect("upload a");
    backend.upload(&[0.0, 1e-9, 3.0], &b).expect("upload b");
    let guarded = backend
        .divide(&a, &b, &out, ZeroGuard::Floor { epsilon: 0.5 })
        .expect("divide");

    assert_eq!(guarded, 2);
    let got = download_all(&backend, &out);
    assert_eq!(got[0], 2.0, "1.0 / max(0.0, 0.5)");
    assert_eq!(got[1], 8.0, "4.0 / max(1e-9, 0.5)");
    assert_eq!(got[2], 3.0, "large denominators pass through");
}

// ---------------------------------------------------------------------------
// Output aliasing: every elementwise op must accept out == a or out == b
// ---------------------------------------------------------------------------

#[test]
fn multiply_supports_aliased_output() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Real, 3).expect("alloc");
    let b = backend.alloc(ElementKind::Real, 3).expect("alloc");

    backend.upload(&[1.0, 2.0, 3.0], &a).expect("upload a");
    backend.upload(&[4.0, 5.0, 6.0], &b).expect("upload b");
    backend.multiply(&a, &b, &a).expect("multiply into a");
    assert_eq!(download_all(&backend, &a), vec![4.0, 10.0, 18.0]);

    backend.upload(&[1.0, 2.0, 3.0], &a).expect("reset a");
    backend.multiply(&a, &b, &b).expect("multiply into b");
    assert_eq!(download_all(&backend, &b), vec![4.0, 10.0, 18.0]);
}

#[test]
fn complex_multiply_supports_aliased_output() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Complex, 1).expect("alloc");
    let b = backend.alloc(ElementKind::Complex, 1).expect("alloc");

    backend.upload(&[1.0, 2.0], &a).expect("upload a");
    backend.upload(&[3.0, 4.0], &b).expect("upload b");
    backend.complex_multiply(&a, &b, &a).expect("multiply into a");
    assert_eq!(
        download_all(&backend, &a),
        vec![-5.0, 10.0],
        "(1+2i)(3+4i) = -5+10i even when out aliases a"
    );
}

#[test]
fn divide_supports_aliased_output() {
    let backend = CpuBackend::new();
    let a = backend.alloc(ElementKind::Real, 2).expect("alloc");
    let b = backend.alloc(ElementKind::Real, 2).expect("alloc");

    backend.upload(&[8.0, 9.0], &a).expect("upload a");
    backend.upload(&[2.0, 3.0], &b).expect("upload b");
    backend
        .divide(&a, &b, &b, ZeroGuard::Disabled)
        .expect("divide into b");
    assert_eq!(download_all(&backend, &b), vec![4.0, 3.0]);
}

// ---------------------------------------------------------------------------
// Capability probes
// ---------------------------------------------------------------------------

#[test]
fn cpu_backend_identifies_itself() {
    let backend = CpuBackend::new();
    assert_eq!(backend.name(), "cpu");
    assert!(!backend.is_gpu());
}

#[test]
fn cpu_backend_accepts_any_nonempty_dims() {
    let backend = CpuBackend::new();
    assert!(backend.supports_dims(VolumeDims::new(7, 13, 5)));
    assert!(backend.supports_dims(VolumeDims::new(1, 1, 1)));
    assert!(!backend.supports_dims(VolumeDims::new(0, 4, 4)));
}

#[test]
fn synchronize_is_a_no_op_on_cpu() {
    let backend = CpuBackend::new();
    assert!(backend.synchronize().is_ok());
}
