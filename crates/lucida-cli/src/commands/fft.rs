use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use lucida_core::compute::{create_backend, DevicePreference};
use lucida_core::io::volume_io::read_volume;
use lucida_core::transform::{forward_transform, inverse_transform};

use super::devices::DeviceArg;

#[derive(Args)]
pub struct FftArgs {
    /// Input volume (.lvol)
    pub file: PathBuf,

    /// Dump the Hermitian-packed spectrum as raw interleaved f32 pairs
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Reconstruct the volume from its spectrum and report the deviation
    #[arg(long)]
    pub round_trip: bool,

    /// Compute device
    #[arg(long, value_enum, default_value = "auto")]
    pub device: DeviceArg,
}

pub fn run(args: &FftArgs) -> Result<()> {
    let volume = read_volume(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;

    let preference: DevicePreference = args.device.into();
    let backend = create_backend(&preference)?;

    let spectrum = forward_transform(backend.as_ref(), &volume)?;

    let dims = volume.dims();
    println!("Volume:     {dims} ({} voxels)", dims.len());
    println!(
        "Spectrum:   {}x{}x{} Hermitian-packed bins",
        dims.spectrum_width(),
        dims.height,
        dims.depth
    );
    println!(
        "Device:     {}",
        backend.name()
    );

    let dc = spectrum.bin(0, 0, 0);
    println!("DC bin:     {:.6} (volume sum)", dc.re);

    let mut peak = 0.0f32;
    let mut peak_index = 0usize;
    for (i, pair) in spectrum.as_slice().chunks_exact(2).enumerate().skip(1) {
        let mag = (pair[0] * pair[0] + pair[1] * pair[1]).sqrt();
        if mag > peak {
            peak = mag;
            peak_index = i;
        }
    }
    println!("Peak bin:   |X| = {peak:.6} at complex index {peak_index}");

    if let Some(ref path) = args.output {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for v in spectrum.as_slice() {
            writer.write_all(&v.to_le_bytes())?;
        }
        writer.flush()?;
        println!("Spectrum written to {}", path.display());
    }

    if args.round_trip {
        let restored = inverse_transform(backend.as_ref(), &spectrum)?;
        let n = dims.len() as f32;
        let max_dev = volume
            .as_slice()
            .iter()
            .zip(restored.as_slice())
            .map(|(&o, &r)| (r / n - o).abs())
            .fold(0.0f32, f32::max);
        println!("Round trip: max deviation {max_dev:.3e} after 1/N rescale");
    }

    Ok(())
}
