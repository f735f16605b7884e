use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use lucida_core::compute::{create_backend, ZeroGuard};
use lucida_core::deconv::{DeconvolutionConfig, FirstGuess, RichardsonLucy, RunObserver};
use lucida_core::io::preview::{save_preview, PreviewPlane};
use lucida_core::io::volume_io::{read_raw_volume, read_volume, write_volume};
use lucida_core::psf::{generate_psf, PsfModel};
use lucida_core::volume::{Volume, VolumeDims};

use super::devices::DeviceArg;
use crate::job::JobConfig;

#[derive(Args)]
pub struct DeconvolveArgs {
    /// Observed volume (.lvol, or raw f32 with --raw-dims)
    pub file: PathBuf,

    /// Job config file (TOML); replaces the flags below
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Measured PSF volume (.lvol); a Gaussian is synthesized when omitted
    #[arg(long)]
    pub psf: Option<PathBuf>,

    /// Lateral sigma of the synthetic Gaussian PSF, in voxels
    #[arg(long, default_value = "2.0")]
    pub psf_sigma: f32,

    /// Axial sigma of the synthetic Gaussian PSF; defaults to the lateral one
    #[arg(long)]
    pub psf_sigma_z: Option<f32>,

    /// Richardson-Lucy iteration count
    #[arg(long, default_value = "30")]
    pub iterations: usize,

    /// Zero-guard policy for the observed / reblurred division
    #[arg(long, value_enum, default_value = "off")]
    pub guard: GuardArg,

    /// Denominator threshold used by the zero guard
    #[arg(long, default_value = "1e-6")]
    pub guard_epsilon: f32,

    /// Fail when more than this fraction of samples hit the guard
    #[arg(long)]
    pub degeneracy_threshold: Option<f64>,

    /// How to seed the initial estimate
    #[arg(long, value_enum, default_value = "observed")]
    pub first_guess: FirstGuessArg,

    /// Compute device
    #[arg(long, value_enum, default_value = "auto")]
    pub device: DeviceArg,

    /// Interpret the input as headerless little-endian f32 of these dimensions
    #[arg(long, value_name = "WxHxD", value_parser = super::parse_dims)]
    pub raw_dims: Option<VolumeDims>,

    /// Write a mid-slice preview of the result (.png or .tiff)
    #[arg(long)]
    pub preview: Option<PathBuf>,

    /// Output volume path
    #[arg(short, long, default_value = "restored.lvol")]
    pub output: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum GuardArg {
    /// Plain IEEE division, NaN and infinity propagate
    Off,
    /// Guarded quotients become zero
    Clamp,
    /// Denominators below epsilon are replaced by epsilon
    Floor,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FirstGuessArg {
    Observed,
    Uniform,
}

struct ProgressObserver {
    bar: ProgressBar,
}

impl RunObserver for ProgressObserver {
    fn begin(&self, total_iterations: usize) {
        self.bar.set_length(total_iterations as u64);
    }

    fn iteration_complete(&self, index: usize) {
        self.bar.set_position(index as u64);
    }
}

pub fn run(args: &DeconvolveArgs) -> Result<()> {
    let job = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid job config")?
    } else {
        build_job_from_args(args)
    };

    let observed = load_observed(&job.input, args.raw_dims)?;
    let psf = load_psf(&job, observed.dims())?;
    let estimate = job.first_guess.build(&observed);

    let backend = create_backend(&job.device)?;
    crate::summary::print_job_summary(&job, backend.name());

    let bar = ProgressBar::new(job.deconvolution.iterations as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:14} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    bar.set_message("deconvolving");
    let observer = ProgressObserver { bar: bar.clone() };

    let started = Instant::now();
    let mut engine = RichardsonLucy::new(backend, job.deconvolution.clone());
    let restored = engine.run(&observed, &psf, &estimate, &observer)?;
    bar.finish_with_message("done");

    write_volume(&restored, &job.output)
        .with_context(|| format!("Failed to write {}", job.output.display()))?;

    if let Some(ref preview_path) = job.preview {
        let mid = restored.dims().depth / 2;
        save_preview(&restored, PreviewPlane::Slice(mid), preview_path)
            .with_context(|| format!("Failed to write preview {}", preview_path.display()))?;
        println!("Preview saved to {}", preview_path.display());
    }

    println!(
        "\nRestored volume saved to {} ({:.1}s)",
        job.output.display(),
        started.elapsed().as_secs_f32()
    );

    Ok(())
}

fn build_job_from_args(args: &DeconvolveArgs) -> JobConfig {
    let zero_guard = match args.guard {
        GuardArg::Off => ZeroGuard::Disabled,
        GuardArg::Clamp => ZeroGuard::ClampToZero {
            epsilon: args.guard_epsilon,
        },
        GuardArg::Floor => ZeroGuard::Floor {
            epsilon: args.guard_epsilon,
        },
    };

    JobConfig {
        input: args.file.clone(),
        output: args.output.clone(),
        psf_file: args.psf.clone(),
        psf_model: Some(PsfModel::Gaussian {
            sigma_lateral: args.psf_sigma,
            sigma_axial: args.psf_sigma_z.unwrap_or(args.psf_sigma),
        }),
        device: args.device.into(),
        deconvolution: DeconvolutionConfig {
            iterations: args.iterations,
            zero_guard,
            degeneracy_threshold: args.degeneracy_threshold,
        },
        first_guess: match args.first_guess {
            FirstGuessArg::Observed => FirstGuess::Observed,
            FirstGuessArg::Uniform => FirstGuess::Uniform,
        },
        preview: args.preview.clone(),
    }
}

fn load_observed(path: &Path, raw_dims: Option<VolumeDims>) -> Result<Volume> {
    match raw_dims {
        Some(dims) => read_raw_volume(path, dims),
        None => read_volume(path),
    }
    .with_context(|| format!("Failed to load {}", path.display()))
}

fn load_psf(job: &JobConfig, dims: VolumeDims) -> Result<Volume> {
    match (&job.psf_file, job.psf_model) {
        (Some(path), _) => read_volume(path)
            .with_context(|| format!("Failed to load PSF {}", path.display())),
        (None, Some(model)) => Ok(generate_psf(dims, model)),
        (None, None) => bail!("job config must set psf_file or psf_model"),
    }
}
