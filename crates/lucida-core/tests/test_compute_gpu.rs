#![cfg(feature = "gpu")]

#[allow(dead_code)]
mod common;

use std::sync::Arc;

use lucida_core::compute::{
    create_backend, ComputeBackend, DevicePreference, ElementKind, ZeroGuard,
};
use lucida_core::deconv::{deconvolve, DeconvolutionConfig};
use lucida_core::error::LucidaError;
use lucida_core::psf::{generate_psf, PsfModel};
use lucida_core::transform::{forward_transform, inverse_transform};
use lucida_core::volume::{Volume, VolumeDims};

use common::{circular_convolve, max_abs_diff, noise_volume};

/// The GPU backend, or `None` when no adapter is available so the test
/// can skip instead of failing on machines without one.
fn gpu() -> Option<Arc<dyn ComputeBackend>> {
    create_backend(&DevicePreference::Gpu).ok()
}

fn cpu() -> Arc<dyn ComputeBackend> {
    create_backend(&DevicePreference::Cpu).expect("cpu backend")
}

// ---------------------------------------------------------------------------
// Identification and capability
// ---------------------------------------------------------------------------

#[test]
fn gpu_backend_identifies_itself() {
    let Some(backend) = gpu() else {
        return; // skip if no GPU available
    };
    assert!(backend.is_gpu());
    assert!(!backend.name().is_empty(), "adapter name should be set");
}

#[test]
fn gpu_requires_power_of_two_dims() {
    let Some(backend) = gpu() else {
        return;
    };
    assert!(backend.supports_dims(VolumeDims::new(8, 16, 4)));
    assert!(!backend.supports_dims(VolumeDims::new(6, 8, 8)));
    assert!(!backend.supports_dims(VolumeDims::new(8, 8, 0)));
}

#[test]
fn gpu_rejects_unsupported_dims_cleanly() {
    let Some(backend) = gpu() else {
        return;
    };
    let dims = VolumeDims::new(6, 8, 8);
    let observed = noise_volume(dims, 1);
    let psf = generate_psf(dims, PsfModel::Delta);
    let cfg = DeconvolutionConfig {
        iterations: 1,
        ..Default::default()
    };

    let err = deconvolve(backend, &observed, &psf, &observed, &cfg).unwrap_err();
    assert!(
        matches!(err, LucidaError::Compute { .. }),
        "expected a compute error naming the stage, got {err:?}"
    );
}

// ---------------------------------------------------------------------------
// Transfer and elementwise parity with the CPU backend
// ---------------------------------------------------------------------------

#[test]
fn gpu_upload_download_round_trips() {
    let Some(backend) = gpu() else {
        return;
    };
    let data: Vec<f32> = (0..64).map(|i| i as f32 * 0.25 - 3.0).collect();
    let buf = backend.alloc(ElementKind::Real, 64).expect("alloc");
    backend.upload(&data, &buf).expect("upload");

    let mut back = vec![0.0f32; 64];
    backend.download(&buf, &mut back).expect("download");
    assert_eq!(back, data, "device transfer must be lossless");
}

#[test]
fn gpu_alloc_is_zero_initialized() {
    let Some(backend) = gpu() else {
        return;
    };
    let buf = backend.alloc(ElementKind::Real, 128).expect("alloc");
    let mut back = vec![1.0f32; 128];
    backend.download(&buf, &mut back).expect("download");
    assert!(back.iter().all(|&v| v == 0.0), "fresh buffers must be zero");
}

#[test]
fn gpu_elementwise_ops_match_cpu() {
    let Some(gpu) = gpu() else {
        return;
    };
    let cpu = cpu();

    let a_host: Vec<f32> = (0..32).map(|i| 0.5 + i as f32 * 0.3).collect();
    let b_host: Vec<f32> = (0..32).map(|i| 1.5 - i as f32 * 0.07).collect();

    let run = |backend: &Arc<dyn ComputeBackend>, op: &str| -> Vec<f32> {
        let a = backend.alloc(ElementKind::Complex, 16).expect("alloc");
        let b = backend.alloc(ElementKind::Complex, 16).expect("alloc");
        let out = backend.alloc(ElementKind::Complex, 16).expect("alloc");
        backend.upload(&a_host, &a).expect("upload");
        backend.upload(&b_host, &b).expect("upload");
        match op {
            "mul" => backend.complex_multiply(&a, &b, &out).expect("mul"),
            "conj" => backend
                .complex_conjugate_multiply(&a, &b, &out)
                .expect("conj"),
            _ => unreachable!(),
        }
        backend.synchronize().expect("sync");
        let mut host = vec![0.0f32; 32];
        backend.download(&out, &mut host).expect("download");
        host
    };

    for op in ["mul", "conj"] {
        let g = run(&gpu, op);
        let c = run(&cpu, op);
        for (i, (x, y)) in g.iter().zip(&c).enumerate() {
            assert!(
                (x - y).abs() < 1e-4,
                "{op} f32[{i}]: gpu={x} cpu={y}"
            );
        }
    }
}

#[test]
fn gpu_divide_guard_counts_match_cpu() {
    let Some(gpu) = gpu() else {
        return;
    };
    let cpu = cpu();

    let a_host = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    let b_host = [0.0f32, 1e-9, -1e-9, 2.0, 0.5, 1e-8, 4.0, 0.0];
    let guard = ZeroGuard::ClampToZero { epsilon: 1e-6 };

    let run = |backend: &Arc<dyn ComputeBackend>| -> (u64, Vec<f32>) {
        let a = backend.alloc(ElementKind::Real, 8).expect("alloc");
        let b = backend.alloc(ElementKind::Real, 8).expect("alloc");
        let out = backend.alloc(ElementKind::Real, 8).expect("alloc");
        backend.upload(&a_host, &a).expect("upload");
        backend.upload(&b_host, &b).expect("upload");
        let hits = backend.divide(&a, &b, &out, guard).expect("divide");
        backend.synchronize().expect("sync");
        let mut host = vec![0.0f32; 8];
        backend.download(&out, &mut host).expect("download");
        (hits, host)
    };

    let (gpu_hits, gpu_out) = run(&gpu);
    let (cpu_hits, cpu_out) = run(&cpu);
    assert_eq!(gpu_hits, cpu_hits, "guard counters must agree");
    assert_eq!(gpu_hits, 5);
    for (i, (x, y)) in gpu_out.iter().zip(&cpu_out).enumerate() {
        assert!((x - y).abs() < 1e-6, "voxel {i}: gpu={x} cpu={y}");
    }
}

// ---------------------------------------------------------------------------
// Transform parity
// ---------------------------------------------------------------------------

#[test]
fn gpu_round_trip_scales_by_len() {
    let Some(backend) = gpu() else {
        return;
    };
    let dims = VolumeDims::new(8, 8, 8);
    let vol = noise_volume(dims, 19);

    let freq = forward_transform(backend.as_ref(), &vol).expect("forward");
    let restored = inverse_transform(backend.as_ref(), &freq).expect("inverse");

    let n = dims.len() as f32;
    for (i, (&orig, &got)) in vol.as_slice().iter().zip(restored.as_slice()).enumerate() {
        assert!(
            (got - orig * n).abs() < 0.05,
            "voxel {i}: expected {} got {got}",
            orig * n
        );
    }
}

#[test]
fn gpu_spectrum_matches_cpu() {
    let Some(gpu) = gpu() else {
        return;
    };
    let cpu = cpu();
    let dims = VolumeDims::new(8, 4, 4);
    let vol = noise_volume(dims, 29);

    let gpu_freq = forward_transform(gpu.as_ref(), &vol).expect("gpu forward");
    let cpu_freq = forward_transform(cpu.as_ref(), &vol).expect("cpu forward");

    for (i, (g, c)) in gpu_freq
        .as_slice()
        .iter()
        .zip(cpu_freq.as_slice())
        .enumerate()
    {
        assert!(
            (g - c).abs() < 1e-3 * (1.0 + c.abs()),
            "bin f32[{i}]: gpu={g} cpu={c}"
        );
    }
}

#[test]
fn gpu_round_trip_depth_one() {
    // A single z-slice exercises the length-1 axis skip in the plan.
    let Some(backend) = gpu() else {
        return;
    };
    let dims = VolumeDims::new(8, 8, 1);
    let vol = noise_volume(dims, 37);

    let freq = forward_transform(backend.as_ref(), &vol).expect("forward");
    let restored = inverse_transform(backend.as_ref(), &freq).expect("inverse");

    let n = dims.len() as f32;
    for (&orig, &got) in vol.as_slice().iter().zip(restored.as_slice()) {
        assert!(
            (got - orig * n).abs() < 0.01,
            "expected {} got {got}",
            orig * n
        );
    }
}

// ---------------------------------------------------------------------------
// Full deconvolution parity
// ---------------------------------------------------------------------------

#[test]
fn gpu_deconvolve_matches_cpu() {
    let Some(gpu) = gpu() else {
        return;
    };
    let cpu = cpu();

    let dims = VolumeDims::new(8, 8, 8);
    let psf = generate_psf(
        dims,
        PsfModel::Gaussian {
            sigma_lateral: 1.2,
            sigma_axial: 1.2,
        },
    );
    let truth = {
        let mut t = Volume::from_elem(dims, 0.05);
        t.data[[2, 3, 3]] = 4.0;
        t.data[[5, 2, 6]] = 2.5;
        t
    };
    let observed = circular_convolve(&truth, &psf);

    let cfg = DeconvolutionConfig {
        iterations: 5,
        ..Default::default()
    };
    let from_gpu = deconvolve(gpu, &observed, &psf, &observed, &cfg).expect("gpu run");
    let from_cpu = deconvolve(cpu, &observed, &psf, &observed, &cfg).expect("cpu run");

    let diff = max_abs_diff(&from_gpu, &from_cpu);
    assert!(
        diff < 0.05,
        "GPU and CPU runs should approximately agree: max diff {diff}"
    );
}
