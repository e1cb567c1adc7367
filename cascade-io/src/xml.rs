//! Measurement-file XML export of a derived image.
//!
//! Matches the instrument's exchange format: metadata followed by the
//! detector values expanded onto the fixed reporting resolution.

use crate::Result;
use cascade_core::DerivedImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Reporting grid of the exchange format.
const RESOLUTION: usize = 1024;

/// Measurement metadata accompanying the detector values.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementMeta {
    /// Sample-detector distance in mm.
    pub sample_detector: i64,
    /// Neutron wavelength in Angstrom.
    pub wavelength: f64,
    /// Spin-echo lifetime in ns.
    pub lifetime: f64,
    /// Beam monitor counts.
    pub beam_monitor: i64,
}

/// Writes the measurement file.
///
/// # Errors
/// [`crate::Error::Io`] on write failure.
pub fn write_measurement_xml<P: AsRef<Path>>(
    path: P,
    image: &DerivedImage,
    meta: &MeasurementMeta,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        log::error!("could not open {} for writing: {e}", path.display());
        e
    })?;
    let mut out = BufWriter::new(file);

    writeln!(out, "<measurement_file>")?;
    writeln!(out)?;
    writeln!(out, "<instrument_name>MIRA</instrument_name>")?;
    writeln!(
        out,
        "<location>Forschungsreaktor Muenchen II - FRM2</location>"
    )?;
    writeln!(out)?;
    writeln!(out, "<measurement_data>")?;
    writeln!(
        out,
        "<Sample_Detector>{}</Sample_Detector>",
        meta.sample_detector
    )?;
    writeln!(out, "<wavelength>{:.2}</wavelength>", meta.wavelength)?;
    writeln!(out, "<lifetime>{:.3}</lifetime>", meta.lifetime)?;
    writeln!(out, "<beam_monitor>{}</beam_monitor>", meta.beam_monitor)?;
    writeln!(out, "<resolution>{RESOLUTION}</resolution>")?;
    writeln!(out)?;
    writeln!(out, "<detector_value>")?;

    let width = image.width().max(1);
    let height = image.height().max(1);
    if RESOLUTION % width != 0 || RESOLUTION % height != 0 {
        log::warn!("detector shape does not divide the reporting resolution");
    }
    let expand_x = (RESOLUTION / width).max(1);
    let expand_y = (RESOLUTION / height).max(1);

    // Values are spread sparsely onto the reporting grid: one carrier
    // cell per 4x4 sub-block, scaled down accordingly.
    for x in 0..width {
        for sub_x in 0..expand_x {
            for y in 0..height {
                for sub_y in 0..expand_y {
                    if sub_x % 4 == 0 && sub_y % 4 == 0 {
                        write!(out, "{} ", image.value(x, y) / 4.0)?;
                    } else {
                        write!(out, "0 ")?;
                    }
                }
            }
            writeln!(out)?;
        }
    }

    writeln!(out, "</detector_value>")?;
    writeln!(out)?;
    writeln!(out, "</measurement_data>")?;
    writeln!(out)?;
    writeln!(out, "</measurement_file>")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::SharedBuffer;

    #[test]
    fn test_writes_metadata_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meas.xml");

        let image =
            DerivedImage::from_counts(2, 2, SharedBuffer::from_vec(vec![4, 8, 12, 16])).unwrap();
        let meta = MeasurementMeta {
            sample_detector: 1500,
            wavelength: 4.8,
            lifetime: 0.1,
            beam_monitor: 42,
        };
        write_measurement_xml(&path, &image, &meta).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("<measurement_file>"));
        assert!(text.contains("<wavelength>4.80</wavelength>"));
        assert!(text.contains("<beam_monitor>42</beam_monitor>"));
        assert!(text.contains("<resolution>1024</resolution>"));
        assert!(text.trim_end().ends_with("</measurement_file>"));
    }
}
