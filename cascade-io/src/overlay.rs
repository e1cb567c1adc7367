//! Overlay configuration carried alongside raw detector files.
//!
//! The detector server may append a configuration block after the raw
//! counts, and measurements may ship a sibling `.conf` file. The block's
//! format is owned by the server; this module retains the raw bytes and
//! extracts `key = value` text entries on a best-effort basis.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Best-effort view of trailing/sibling configuration data.
#[derive(Debug, Clone, Default)]
pub struct OverlayConfig {
    raw: Vec<u8>,
    entries: BTreeMap<String, String>,
}

impl OverlayConfig {
    /// Creates an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorbs a trailing block from a raw file. The bytes are retained
    /// verbatim; any parseable `key = value` lines become entries.
    pub fn absorb_trailing(&mut self, bytes: &[u8]) {
        self.parse_text(bytes);
        self.raw.extend_from_slice(bytes);
        log::info!(
            "absorbed {} bytes of overlay configuration ({} entries total)",
            bytes.len(),
            self.entries.len()
        );
    }

    /// Merges entries from a sidecar file, if it is readable. Failure is
    /// reported to the caller but is expected to be non-fatal.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the file cannot be read.
    pub fn merge_file(&mut self, path: &Path) -> std::io::Result<()> {
        let bytes = fs::read(path)?;
        self.absorb_trailing(&bytes);
        Ok(())
    }

    fn parse_text(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.entries
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    /// The retained raw bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Parsed `key = value` entries.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Looks up one entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// True if nothing was absorbed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_key_value_lines() {
        let mut overlay = OverlayConfig::new();
        overlay.absorb_trailing(b"# comment\nfoil_count = 6\nmode=tof\n");
        assert_eq!(overlay.get("foil_count"), Some("6"));
        assert_eq!(overlay.get("mode"), Some("tof"));
        assert_eq!(overlay.get("missing"), None);
    }

    #[test]
    fn test_opaque_payload_is_retained() {
        let mut overlay = OverlayConfig::new();
        let blob = [0u8, 159, 146, 150, 7];
        overlay.absorb_trailing(&blob);
        assert_eq!(overlay.raw(), &blob);
        assert!(overlay.entries().is_empty());
    }
}
