//! Fixed 1° sampling lattice over the supported region.
//!
//! Points are kept in the provider's longitude convention ([0, 360)); the
//! normalizer rewraps them to signed longitude before they reach the warehouse.

use std::collections::HashSet;
use std::ops::RangeInclusive;

/// Tolerance when matching decoded grid coordinates to integer lattice nodes.
const COORD_EPSILON: f32 = 1e-3;

/// A node of the lattice, in whole degrees (source longitude convention).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPoint {
    pub latitude: i32,
    pub longitude: i32,
}

/// Immutable set of lattice nodes, built once at startup and shared by the
/// ingester.
#[derive(Debug, Clone)]
pub struct GridLattice {
    index: HashSet<GridPoint>,
}

impl GridLattice {
    /// Build a lattice from longitude bands and a latitude band (inclusive,
    /// 1° steps). Duplicate nodes across overlapping bands are dropped.
    pub fn from_ranges(
        longitude_bands: &[RangeInclusive<i32>],
        latitudes: RangeInclusive<i32>,
    ) -> Self {
        let mut index = HashSet::new();
        for band in longitude_bands {
            for longitude in band.clone() {
                for latitude in latitudes.clone() {
                    let point = GridPoint {
                        latitude,
                        longitude: longitude.rem_euclid(360),
                    };
                    index.insert(point);
                }
            }
        }
        Self { index }
    }

    /// Europe and the North Atlantic: 0–45°E and 300–359°E, 30–90°N.
    pub fn europe() -> Self {
        Self::from_ranges(&[0..=45, 300..=359], 30..=90)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Match a decoded coordinate to a lattice node.
    ///
    /// Returns `None` for off-lattice coordinates (e.g. the half-degree nodes
    /// of the 0.5° source grid, or anything outside the region).
    pub fn node_at(&self, latitude: f32, longitude: f32) -> Option<GridPoint> {
        let lat = latitude.round();
        let lon = longitude.round();
        if (latitude - lat).abs() > COORD_EPSILON || (longitude - lon).abs() > COORD_EPSILON {
            return None;
        }
        let point = GridPoint {
            latitude: lat as i32,
            longitude: (lon as i32).rem_euclid(360),
        };
        self.index.contains(&point).then_some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_europe_lattice_size() {
        // (46 + 60) longitudes × 61 latitudes
        let lattice = GridLattice::europe();
        assert_eq!(lattice.len(), 106 * 61);
    }

    #[test]
    fn test_overlapping_bands_deduplicated() {
        let lattice = GridLattice::from_ranges(&[0..=2, 1..=3], 10..=10);
        assert_eq!(lattice.len(), 4);
    }

    #[test]
    fn test_negative_longitudes_wrap_into_source_convention() {
        let lattice = GridLattice::from_ranges(&[-1..=-1], 45..=45);
        assert_eq!(lattice.len(), 1);
        assert_eq!(
            lattice.node_at(45.0, 359.0),
            Some(GridPoint {
                latitude: 45,
                longitude: 359
            })
        );
    }

    #[test]
    fn test_node_at_matches_integer_nodes() {
        let lattice = GridLattice::europe();
        assert_eq!(
            lattice.node_at(45.0, 10.0),
            Some(GridPoint {
                latitude: 45,
                longitude: 10
            })
        );
        assert_eq!(
            lattice.node_at(60.0001, 350.0),
            Some(GridPoint {
                latitude: 60,
                longitude: 350
            })
        );
    }

    #[test]
    fn test_node_at_rejects_half_degree_and_out_of_region() {
        let lattice = GridLattice::europe();
        assert_eq!(lattice.node_at(45.5, 10.0), None);
        assert_eq!(lattice.node_at(45.0, 100.0), None);
        assert_eq!(lattice.node_at(-10.0, 10.0), None);
    }
}
