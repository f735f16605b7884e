pub mod config;
pub mod convolve;
pub mod deconvolve;
pub mod devices;
pub mod fft;
pub mod preview;

use anyhow::{bail, Result};
use lucida_core::volume::VolumeDims;

/// Parse a "WxHxD" dimension triple, e.g. "256x256x64".
pub fn parse_dims(s: &str) -> Result<VolumeDims> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 3 {
        bail!("expected WxHxD, got '{s}'");
    }
    let mut extents = [0usize; 3];
    for (slot, part) in extents.iter_mut().zip(&parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid extent '{part}' in '{s}'"))?;
    }
    Ok(VolumeDims::new(extents[0], extents[1], extents[2]))
}
