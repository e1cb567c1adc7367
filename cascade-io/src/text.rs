//! Text renditions of PAD frames and TOF cubes.

use crate::{Error, Result};
use cascade_core::{PadConfig, PadImage, TofCube};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes a PAD frame as a tab-separated count matrix, one row per
/// detector row.
///
/// # Errors
/// [`Error::Io`] on write failure.
pub fn save_pad_text<P: AsRef<Path>>(path: P, image: &PadImage) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for y in 0..image.height() {
        for x in 0..image.width() {
            write!(writer, "{}\t", image.data(x, y))?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a whitespace-separated count matrix into a PAD frame.
///
/// # Errors
/// [`Error::Io`] if the file cannot be read,
/// [`Error::InvalidFormat`] for an unparseable token, and
/// [`Error::SizeMismatch`] if the file ends before the frame is full.
pub fn load_pad_text<P: AsRef<Path>>(path: P, config: &PadConfig) -> Result<PadImage> {
    let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        log::error!(
            "could not open text PAD {}: {e}",
            path.as_ref().display()
        );
        e
    })?;

    let mut counts = Vec::with_capacity(config.pixel_count());
    for token in text.split_whitespace().take(config.pixel_count()) {
        let value: u32 = token
            .parse()
            .map_err(|_| Error::InvalidFormat(format!("bad count {token:?}")))?;
        counts.push(value);
    }
    if counts.len() < config.pixel_count() {
        log::warn!(
            "text PAD ended after {} of {} counts",
            counts.len(),
            config.pixel_count()
        );
        return Err(Error::SizeMismatch {
            expected: config.pixel_count(),
            actual: counts.len(),
        });
    }

    Ok(PadImage::from_counts(config, counts)?)
}

/// Dumps a cube as one text file per foil: rows of per-channel counts
/// for each pixel, with an axis-labeling header.
///
/// Files are named `<base>.foil<N>`.
///
/// # Errors
/// [`Error::Io`] on write failure.
pub fn save_tof_foils<P: AsRef<Path>>(base: P, cube: &TofCube) -> Result<()> {
    let config = cube.config();
    for foil in 0..config.foil_count() {
        let path = base.as_ref().with_extension(format!("foil{foil}"));
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "# type: array_3d")?;
        writeln!(writer, "# xlabel: x pixels")?;
        writeln!(writer, "# ylabel: y pixels")?;
        writeln!(writer, "# zlabel: time channels")?;

        for y in 0..config.height() {
            for x in 0..config.width() {
                for channel in 0..config.channels_per_foil() {
                    write!(writer, "{} ", cube.data(foil, channel, x, y))?;
                }
                writeln!(writer)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::TofConfig;

    #[test]
    fn test_pad_text_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.txt");
        let config = PadConfig::new(4, 3);
        let image =
            PadImage::from_counts(&config, (0..12).map(|v| v * 7).collect()).unwrap();

        save_pad_text(&path, &image).unwrap();
        let loaded = load_pad_text(&path, &config).unwrap();
        assert_eq!(loaded.raw(), image.raw());
    }

    #[test]
    fn test_truncated_text_is_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.txt");
        std::fs::write(&path, "1 2 3 4 5").unwrap();
        let result = load_pad_text(&path, &PadConfig::new(4, 4));
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_bad_token_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.txt");
        std::fs::write(&path, "1 2 x 4").unwrap();
        let result = load_pad_text(&path, &PadConfig::new(2, 2));
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_tof_foil_dump() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("run.dat");
        let config = TofConfig::new(PadConfig::new(2, 2), 2, 4, 8);
        let mut cube = TofCube::zeroed(&config).unwrap();
        cube.set_data(1, 2, 0, 0, 9);

        save_tof_foils(&base, &cube).unwrap();
        let foil1 = std::fs::read_to_string(dir.path().join("run.foil1")).unwrap();
        assert!(foil1.starts_with("# type: array_3d"));
        assert!(foil1.contains("0 0 9 0"));
    }
}
