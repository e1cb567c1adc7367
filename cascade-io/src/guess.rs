//! Geometry guessing for files of unannounced size.
//!
//! Measurement files carry no header; when the configured geometry does
//! not match a file, the loader can fall back to guessing it from the
//! count of 32-bit words. Known instrument geometries are tried first,
//! then power-of-two sweeps, then an exhaustive divisor search.

use cascade_core::{Compression, PadConfig, TofConfig};

const MIN_SIDE: usize = 64;
const MAX_SIDE: usize = 1024;

/// Known detector geometries, `(width, height, image_count)`.
const KNOWN: [(usize, usize, usize); 2] = [(64, 128, 196), (128, 128, 128)];

/// Guesses a PAD geometry from a file's word count.
#[must_use]
pub fn guess_pad_geometry(words: usize) -> Option<PadConfig> {
    for (width, height, _) in KNOWN {
        if width * height == words {
            return found_pad(width, height);
        }
    }

    let mut side_x = MIN_SIDE;
    while side_x <= MAX_SIDE {
        let mut side_y = MIN_SIDE;
        while side_y <= MAX_SIDE {
            if side_x * side_y == words {
                return found_pad(side_x, side_y);
            }
            side_y *= 2;
        }
        side_x *= 2;
    }

    for side_x in MIN_SIDE..MAX_SIDE {
        if words % side_x != 0 {
            continue;
        }
        let side_y = words / side_x;
        if (MIN_SIDE..MAX_SIDE).contains(&side_y) {
            return found_pad(side_x, side_y);
        }
    }
    None
}

fn found_pad(width: usize, height: usize) -> Option<PadConfig> {
    log::warn!("guessed PAD geometry {width}x{height} from file size");
    Some(PadConfig::new(width, height))
}

/// Guesses a TOF geometry from a file's word count, keeping the foil
/// structure of the template and replacing frame geometry and image
/// count.
///
/// Pseudo-compressed layouts cannot be guessed (no independent image
/// count to solve for).
#[must_use]
pub fn guess_tof_geometry(words: usize, template: &TofConfig) -> Option<TofConfig> {
    if template.compression() == Compression::Pseudo {
        log::error!("cannot guess geometry of a pseudo-compressed TOF file");
        return None;
    }

    for (width, height, images) in KNOWN {
        if width * height * images == words {
            return found_tof(template, width, height, images);
        }
    }

    let mut images = MIN_SIDE;
    while images <= MAX_SIDE {
        if words % images == 0 {
            if let Some(pad) = guess_pad_geometry(words / images) {
                return found_tof(template, pad.width(), pad.height(), images);
            }
        }
        images *= 2;
    }

    for images in MIN_SIDE..MAX_SIDE {
        if words % images == 0 {
            if let Some(pad) = guess_pad_geometry(words / images) {
                return found_tof(template, pad.width(), pad.height(), images);
            }
        }
    }
    None
}

fn found_tof(
    template: &TofConfig,
    width: usize,
    height: usize,
    images: usize,
) -> Option<TofConfig> {
    log::warn!("guessed TOF geometry {width}x{height} with {images} frames from file size");
    let mut config = template.clone();
    config.set_pad(PadConfig::new(width, height));
    config.set_image_count(images);
    Some(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_pad_geometries() {
        let config = guess_pad_geometry(64 * 128).unwrap();
        assert_eq!((config.width(), config.height()), (64, 128));
        let config = guess_pad_geometry(128 * 128).unwrap();
        assert_eq!((config.width(), config.height()), (128, 128));
    }

    #[test]
    fn test_power_of_two_pad() {
        let config = guess_pad_geometry(256 * 512).unwrap();
        assert_eq!(config.pixel_count(), 256 * 512);
    }

    #[test]
    fn test_unguessable_pad() {
        assert!(guess_pad_geometry(97).is_none());
    }

    #[test]
    fn test_known_tof_geometry() {
        let template = TofConfig::default();
        let config = guess_tof_geometry(64 * 128 * 196, &template).unwrap();
        assert_eq!((config.width(), config.height()), (64, 128));
        assert_eq!(config.image_count(), 196);
        // Foil structure carries over from the template.
        assert_eq!(config.foil_count(), template.foil_count());
    }

    #[test]
    fn test_pseudo_compressed_is_not_guessed() {
        let template = TofConfig::default().with_compression(Compression::Pseudo);
        assert!(guess_tof_geometry(128 * 128 * 128, &template).is_none());
    }
}
