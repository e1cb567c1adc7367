//! Raw PAD files: `width * height` little-endian u32 counts.

use crate::overlay::OverlayConfig;
use crate::{Error, Result};
use cascade_core::{PadConfig, PadImage};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A loaded PAD image together with any overlay configuration found in
/// the trailing block or a sibling `.conf` file.
#[derive(Debug)]
pub struct LoadedPad {
    pub image: PadImage,
    pub overlay: OverlayConfig,
}

/// Loads a raw PAD file against a known geometry.
///
/// The file is size-probed through a memory map. A file shorter than the
/// geometry is a [`Error::SizeMismatch`]; extra trailing bytes are
/// treated as an appended overlay-configuration block and never
/// downgrade the load.
///
/// # Errors
/// [`Error::Io`] if the file cannot be opened or mapped,
/// [`Error::SizeMismatch`] if it is too small.
pub fn load_pad<P: AsRef<Path>>(path: P, config: &PadConfig) -> Result<LoadedPad> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        log::error!("could not open PAD file {}: {e}", path.display());
        e
    })?;
    // SAFETY: The file is opened read-only and we assume it is not modified
    // concurrently. This is the standard safety contract for memory mapping.
    #[allow(unsafe_code)]
    let mmap = unsafe { Mmap::map(&file)? };

    let expected = config.byte_len();
    if mmap.len() < expected {
        log::error!(
            "PAD file {} holds {} bytes, expected {expected}",
            path.display(),
            mmap.len()
        );
        return Err(Error::SizeMismatch {
            expected,
            actual: mmap.len(),
        });
    }

    let image = PadImage::from_bytes(config, &mmap[..expected])?;

    let mut overlay = OverlayConfig::new();
    if mmap.len() > expected {
        overlay.absorb_trailing(&mmap[expected..]);
    }
    merge_sibling_conf(path, &mut overlay);

    Ok(LoadedPad { image, overlay })
}

/// Writes exactly `width * height` little-endian counts.
///
/// # Errors
/// [`Error::Io`] on any short or failed write.
pub fn save_pad<P: AsRef<Path>>(path: P, image: &PadImage) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        log::error!("could not open {} for writing: {e}", path.display());
        e
    })?;
    let mut writer = BufWriter::new(file);
    for &count in image.raw() {
        writer.write_all(&count.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Consults `<stem>.conf` next to a raw file, best-effort.
pub(crate) fn merge_sibling_conf(path: &Path, overlay: &mut OverlayConfig) {
    let sibling = path.with_extension("conf");
    if sibling.is_file() {
        if let Err(e) = overlay.merge_file(&sibling) {
            log::warn!("could not read sidecar {}: {e}", sibling.display());
        }
    }
}
