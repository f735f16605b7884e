/// Minimum voxel count (w*h*d) to use Rayon parallelism in CPU backend passes.
pub const PARALLEL_VOXEL_THRESHOLD: usize = 65_536;

/// Default denominator epsilon when a zero-guard policy is enabled without an
/// explicit epsilon.
pub const DEFAULT_GUARD_EPSILON: f32 = 1e-6;

/// Default Richardson-Lucy iteration count for CLI runs. Classical RL runs
/// use anywhere from 10 to a few hundred iterations.
pub const DEFAULT_ITERATIONS: usize = 30;

/// Default lateral (x/y) sigma, in voxels, for synthetic Gaussian PSFs.
pub const DEFAULT_PSF_SIGMA_LATERAL: f32 = 2.0;

/// Default axial (z) sigma, in voxels, for synthetic Gaussian PSFs. Microscope
/// PSFs are elongated along the optical axis, so this is larger than lateral.
pub const DEFAULT_PSF_SIGMA_AXIAL: f32 = 4.0;
