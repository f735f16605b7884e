use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;

use crate::error::{LucidaError, Result};
use crate::volume::Volume;

/// Which 2-D view of a volume to export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewPlane {
    /// A single z-slice by index.
    Slice(usize),
    /// Maximum-intensity projection along the depth axis.
    MaxIntensity,
}

fn extract_plane(volume: &Volume, plane: PreviewPlane) -> Result<Array2<f32>> {
    let dims = volume.dims();
    match plane {
        PreviewPlane::Slice(z) => {
            if z >= dims.depth {
                return Err(LucidaError::InvalidDimensions(format!(
                    "z-slice {z} out of range for volume {dims}"
                )));
            }
            Ok(volume.data.index_axis(ndarray::Axis(0), z).to_owned())
        }
        PreviewPlane::MaxIntensity => {
            let mut out = Array2::<f32>::from_elem((dims.height, dims.width), f32::NEG_INFINITY);
            for slice in volume.data.outer_iter() {
                out.zip_mut_with(&slice, |m, &v| {
                    if v > *m {
                        *m = v;
                    }
                });
            }
            Ok(out)
        }
    }
}

/// Min-max normalize into [0, 1]. A constant plane maps to all zeros.
fn normalize(plane: &mut Array2<f32>) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &v in plane.iter() {
        if v < lo {
            lo = v;
        }
        if v > hi {
            hi = v;
        }
    }
    let range = hi - lo;
    if range > 0.0 && range.is_finite() {
        plane.mapv_inplace(|v| (v - lo) / range);
    } else {
        plane.fill(0.0);
    }
}

/// Save a volume preview as 8-bit grayscale PNG.
pub fn save_preview_png(volume: &Volume, plane: PreviewPlane, path: &Path) -> Result<()> {
    let mut data = extract_plane(volume, plane)?;
    normalize(&mut data);
    let (h, w) = data.dim();

    let mut img = GrayImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let val = (data[[row, col]].clamp(0.0, 1.0) * 255.0) as u8;
            img.put_pixel(col as u32, row as u32, Luma([val]));
        }
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a volume preview as 16-bit grayscale TIFF.
pub fn save_preview_tiff(volume: &Volume, plane: PreviewPlane, path: &Path) -> Result<()> {
    let mut data = extract_plane(volume, plane)?;
    normalize(&mut data);
    let (h, w) = data.dim();

    let mut pixels: Vec<u16> = Vec::with_capacity(h * w);
    for row in 0..h {
        for col in 0..w {
            pixels.push((data[[row, col]].clamp(0.0, 1.0) * 65535.0) as u16);
        }
    }
    let img = image::ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .expect("buffer size matches dimensions");
    img.save(path)?;
    Ok(())
}

/// Save a preview, choosing the format from the file extension.
pub fn save_preview(volume: &Volume, plane: PreviewPlane, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tiff" | "tif") => save_preview_tiff(volume, plane, path),
        Some("png") => save_preview_png(volume, plane, path),
        _ => save_preview_png(volume, plane, path),
    }
}
