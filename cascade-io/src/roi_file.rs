//! ROI persistence as a JSON list of named elements.

use crate::Result;
use cascade_core::Roi;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Loads a ROI definition.
///
/// A failed load is expected to leave the caller's ROI disabled, not to
/// abort anything; the error is logged here and returned for the caller
/// to downgrade.
///
/// # Errors
/// [`crate::Error::Io`] if the file cannot be read,
/// [`crate::Error::Json`] if the contents do not parse.
pub fn load_roi<P: AsRef<Path>>(path: P) -> Result<Roi> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        log::error!("could not open ROI file {}: {e}", path.display());
        e
    })?;
    let roi = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        log::error!("could not parse ROI file {}: {e}", path.display());
        e
    })?;
    Ok(roi)
}

/// Saves a ROI definition.
///
/// # Errors
/// [`crate::Error::Io`] or [`crate::Error::Json`] on failure.
pub fn save_roi<P: AsRef<Path>>(path: P, roi: &Roi) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), roi)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::RoiElement;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beam.roi");

        let mut roi = Roi::new();
        roi.add(
            "beam",
            RoiElement::Circle {
                cx: 64.0,
                cy: 64.0,
                radius: 12.5,
            },
        );
        roi.add(
            "halo",
            RoiElement::CircleRing {
                cx: 64.0,
                cy: 64.0,
                inner: 20.0,
                outer: 30.0,
            },
        );
        roi.add(
            "edge",
            RoiElement::Polygon {
                points: vec![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]],
            },
        );

        save_roi(&path, &roi).unwrap();
        let loaded = load_roi(&path).unwrap();
        assert_eq!(loaded, roi);
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.roi");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_roi(&path).is_err());
    }
}
