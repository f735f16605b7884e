use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use lucida_core::io::preview::{save_preview, PreviewPlane};
use lucida_core::io::volume_io::{read_raw_volume, read_volume};
use lucida_core::volume::VolumeDims;

#[derive(Args)]
pub struct PreviewArgs {
    /// Input volume (.lvol, or raw f32 with --raw-dims)
    pub file: PathBuf,

    /// Export a single z-slice (defaults to the middle slice)
    #[arg(long, conflicts_with = "mip")]
    pub slice: Option<usize>,

    /// Export a maximum-intensity projection instead of a slice
    #[arg(long)]
    pub mip: bool,

    /// Interpret the input as headerless little-endian f32 of these dimensions
    #[arg(long, value_name = "WxHxD", value_parser = super::parse_dims)]
    pub raw_dims: Option<VolumeDims>,

    /// Output image (.png or .tiff)
    #[arg(short, long, default_value = "preview.png")]
    pub output: PathBuf,
}

pub fn run(args: &PreviewArgs) -> Result<()> {
    let volume = match args.raw_dims {
        Some(dims) => read_raw_volume(&args.file, dims),
        None => read_volume(&args.file),
    }
    .with_context(|| format!("Failed to load {}", args.file.display()))?;

    let plane = if args.mip {
        PreviewPlane::MaxIntensity
    } else {
        PreviewPlane::Slice(args.slice.unwrap_or(volume.dims().depth / 2))
    };

    save_preview(&volume, plane, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    match plane {
        PreviewPlane::Slice(z) => println!(
            "Slice {z} of {} saved to {}",
            volume.dims(),
            args.output.display()
        ),
        PreviewPlane::MaxIntensity => println!(
            "Max-intensity projection of {} saved to {}",
            volume.dims(),
            args.output.display()
        ),
    }

    Ok(())
}
