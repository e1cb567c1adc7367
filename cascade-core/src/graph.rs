//! Per-time-channel count sequences derived from a TOF cube.

use crate::config::TofConfig;
use crate::shared::SharedBuffer;

/// Counts per time channel for one foil (or a phase-aligned foil sum).
///
/// Read-only after construction; clones share the underlying buffer, so
/// a graph can be returned by value cheaply. The configuration it was
/// derived from rides along, principally for the oscillation count the
/// fitter needs.
#[derive(Debug, Clone)]
pub struct DerivedGraph {
    config: TofConfig,
    data: SharedBuffer<u32>,
}

impl DerivedGraph {
    /// Wraps an already-reduced channel sequence.
    #[must_use]
    pub fn new(config: TofConfig, data: SharedBuffer<u32>) -> Self {
        Self { config, data }
    }

    /// Builds a graph from a plain vector of channel counts.
    #[must_use]
    pub fn from_counts(config: TofConfig, counts: Vec<u32>) -> Self {
        Self {
            config,
            data: SharedBuffer::from_vec(counts),
        }
    }

    /// The configuration the graph was derived from.
    #[must_use]
    pub fn config(&self) -> &TofConfig {
        &self.config
    }

    /// Number of time channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the graph holds no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Counts in channel `i`, 0 when out of range.
    #[must_use]
    pub fn value(&self, i: usize) -> u32 {
        self.data.as_slice().get(i).copied().unwrap_or(0)
    }

    /// All channel counts.
    #[must_use]
    pub fn values(&self) -> &[u32] {
        self.data.as_slice()
    }

    /// Total counts over all channels.
    #[must_use]
    pub fn sum(&self) -> u64 {
        self.data.iter().map(|&v| u64::from(v)).sum()
    }

    /// Smallest channel count, 0 for an empty graph.
    #[must_use]
    pub fn min(&self) -> u32 {
        self.data.iter().copied().min().unwrap_or(0)
    }

    /// Largest channel count, 0 for an empty graph.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// True if the total counts fall below `limit`. Used as the
    /// low-statistics gate before fitting.
    #[must_use]
    pub fn is_below(&self, limit: u64) -> bool {
        self.sum() < limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_and_bounds() {
        let graph = DerivedGraph::from_counts(TofConfig::default(), vec![3, 1, 4, 1, 5]);
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.value(2), 4);
        assert_eq!(graph.value(99), 0);
        assert_eq!(graph.sum(), 14);
        assert_eq!(graph.min(), 1);
        assert_eq!(graph.max(), 5);
    }

    #[test]
    fn test_low_statistics_gate() {
        let graph = DerivedGraph::from_counts(TofConfig::default(), vec![10, 10]);
        assert!(graph.is_below(50));
        assert!(!graph.is_below(20));
    }

    #[test]
    fn test_clone_shares_buffer() {
        let graph = DerivedGraph::from_counts(TofConfig::default(), vec![1, 2, 3]);
        let copy = graph.clone();
        assert_eq!(copy.values(), graph.values());
    }
}
