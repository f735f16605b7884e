use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;

use crate::error::{LucidaError, Result};
use crate::volume::{Volume, VolumeDims};

pub const LVOL_MAGIC: &[u8; 8] = b"LUCIDAVL";
pub const LVOL_VERSION: u32 = 1;
/// 8-byte magic, u32 version, u32 width/height/depth.
pub const LVOL_HEADER_SIZE: usize = 24;

fn payload_bytes(dims: VolumeDims) -> Result<usize> {
    dims.len()
        .checked_mul(4)
        .ok_or_else(|| LucidaError::InvalidVolume(format!("dimensions {dims} overflow")))
}

/// Read a volume from an LVOL container file (memory-mapped).
pub fn read_volume(path: &Path) -> Result<Volume> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < LVOL_HEADER_SIZE {
        return Err(LucidaError::InvalidVolume(
            "file too small for LVOL header".into(),
        ));
    }
    if &mmap[0..8] != LVOL_MAGIC {
        return Err(LucidaError::InvalidVolume("missing LUCIDAVL magic".into()));
    }

    let mut cursor = Cursor::new(&mmap[8..LVOL_HEADER_SIZE]);
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != LVOL_VERSION {
        return Err(LucidaError::InvalidVolume(format!(
            "unsupported LVOL version {version}"
        )));
    }
    let width = cursor.read_u32::<LittleEndian>()? as usize;
    let height = cursor.read_u32::<LittleEndian>()? as usize;
    let depth = cursor.read_u32::<LittleEndian>()? as usize;
    let dims = VolumeDims::new(width, height, depth);
    dims.validate()?;

    let expected = LVOL_HEADER_SIZE + payload_bytes(dims)?;
    if mmap.len() < expected {
        return Err(LucidaError::InvalidVolume(format!(
            "file truncated: expected at least {} bytes, got {}",
            expected,
            mmap.len()
        )));
    }

    let mut data = vec![0.0f32; dims.len()];
    Cursor::new(&mmap[LVOL_HEADER_SIZE..expected]).read_f32_into::<LittleEndian>(&mut data)?;
    Volume::from_vec(dims, data)
}

/// Write a volume as an LVOL container file.
pub fn write_volume(volume: &Volume, path: &Path) -> Result<()> {
    let dims = volume.dims();
    let mut writer = BufWriter::new(File::create(path)?);

    writer.write_all(LVOL_MAGIC)?;
    writer.write_u32::<LittleEndian>(LVOL_VERSION)?;
    writer.write_u32::<LittleEndian>(dims.width as u32)?;
    writer.write_u32::<LittleEndian>(dims.height as u32)?;
    writer.write_u32::<LittleEndian>(dims.depth as u32)?;
    for &sample in volume.as_slice() {
        writer.write_f32::<LittleEndian>(sample)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a headerless little-endian f32 volume with caller-supplied
/// dimensions. The file size must match exactly.
pub fn read_raw_volume(path: &Path, dims: VolumeDims) -> Result<Volume> {
    dims.validate()?;
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    let expected = payload_bytes(dims)?;
    if mmap.len() != expected {
        return Err(LucidaError::InvalidVolume(format!(
            "raw volume size mismatch: {dims} needs {} bytes, file has {}",
            expected,
            mmap.len()
        )));
    }

    let mut data = vec![0.0f32; dims.len()];
    Cursor::new(&mmap[..]).read_f32_into::<LittleEndian>(&mut data)?;
    Volume::from_vec(dims, data)
}
