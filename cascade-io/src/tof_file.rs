//! Raw TOF files: the full cube as little-endian u32 counts.
//!
//! Same conventions as PAD files at cube scale; the expected size
//! depends on the storage layout in the configuration.

use crate::overlay::OverlayConfig;
use crate::pad_file::merge_sibling_conf;
use crate::{Error, Result};
use cascade_core::{TofConfig, TofCube};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A loaded TOF cube together with any overlay configuration found.
#[derive(Debug)]
pub struct LoadedTof {
    pub cube: TofCube,
    pub overlay: OverlayConfig,
}

/// Loads a raw TOF file against a known geometry.
///
/// # Errors
/// [`Error::Io`] if the file cannot be opened or mapped,
/// [`Error::SizeMismatch`] if it is smaller than the geometry requires;
/// trailing bytes feed the overlay configuration instead of failing.
pub fn load_tof<P: AsRef<Path>>(path: P, config: &TofConfig) -> Result<LoadedTof> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        log::error!("could not open TOF file {}: {e}", path.display());
        e
    })?;
    // SAFETY: The file is opened read-only and we assume it is not modified
    // concurrently. This is the standard safety contract for memory mapping.
    #[allow(unsafe_code)]
    let mmap = unsafe { Mmap::map(&file)? };

    let expected = config.byte_len();
    if mmap.len() < expected {
        log::error!(
            "TOF file {} holds {} bytes, expected {expected}",
            path.display(),
            mmap.len()
        );
        return Err(Error::SizeMismatch {
            expected,
            actual: mmap.len(),
        });
    }

    let cube = TofCube::from_bytes(config, &mmap[..expected])?;

    let mut overlay = OverlayConfig::new();
    if mmap.len() > expected {
        overlay.absorb_trailing(&mmap[expected..]);
    }
    merge_sibling_conf(path, &mut overlay);

    Ok(LoadedTof { cube, overlay })
}

/// Writes the full cube as little-endian counts.
///
/// # Errors
/// [`Error::Io`] on any short or failed write.
pub fn save_tof<P: AsRef<Path>>(path: P, cube: &TofCube) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        log::error!("could not open {} for writing: {e}", path.display());
        e
    })?;
    let mut writer = BufWriter::new(file);
    for &count in cube.raw() {
        writer.write_all(&count.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}
