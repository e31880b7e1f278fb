//! Drag snapping for shelves.
//!
//! While a shelf is dragged across the ground plane, each candidate X and Z
//! coordinate is pulled onto the matching coordinate of any other shelf with
//! the same footprint (width and depth) when it is close enough. This lines
//! same-sized shelves up in rows and columns.

use crate::model::{Position, Shelf, Size};

/// Two footprints match when width and depth each differ by less than this.
pub const SIZE_TOLERANCE: f64 = 0.01;

/// A coordinate snaps when it is closer than this to a matching shelf's.
pub const SNAP_DISTANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapRules {
    pub size_tolerance: f64,
    pub snap_distance: f64,
}

impl Default for SnapRules {
    fn default() -> Self {
        Self {
            size_tolerance: SIZE_TOLERANCE,
            snap_distance: SNAP_DISTANCE,
        }
    }
}

impl SnapRules {
    pub fn same_footprint(&self, a: &Size, b: &Size) -> bool {
        (a.width - b.width).abs() < self.size_tolerance
            && (a.depth - b.depth).abs() < self.size_tolerance
    }

    /// Snap the unsnapped ground-plane point `(x, z)` for `dragged`.
    ///
    /// Other shelves are visited in collection order; each comparison uses
    /// the coordinate as snapped so far, so a later match overrides an
    /// earlier one. The vertical coordinate is kept.
    pub fn snap(&self, dragged: &Shelf, x: f64, z: f64, shelves: &[Shelf]) -> Position {
        let mut snapped_x = x;
        let mut snapped_z = z;

        for other in shelves.iter().filter(|s| s.id != dragged.id) {
            if !self.same_footprint(&dragged.size, &other.size) {
                continue;
            }
            if (snapped_x - other.position.x).abs() < self.snap_distance {
                snapped_x = other.position.x;
            }
            if (snapped_z - other.position.z).abs() < self.snap_distance {
                snapped_z = other.position.z;
            }
        }

        Position::new(snapped_x, dragged.position.y, snapped_z)
    }
}

/// Snap with the default tolerance and threshold.
pub fn snap_position(dragged: &Shelf, x: f64, z: f64, shelves: &[Shelf]) -> Position {
    SnapRules::default().snap(dragged, x, z, shelves)
}

/// A pointer ray in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerRay {
    pub origin: [f64; 3],
    pub direction: [f64; 3],
}

impl PointerRay {
    /// Intersection with the ground plane `y = 0` as `(x, z)`.
    ///
    /// `None` when the ray is parallel to the ground or points away from it.
    pub fn ground_intersection(&self) -> Option<(f64, f64)> {
        let [ox, oy, oz] = self.origin;
        let [dx, dy, dz] = self.direction;
        if dy.abs() < f64::EPSILON {
            return None;
        }
        let t = -oy / dy;
        if t < 0.0 {
            return None;
        }
        Some((ox + t * dx, oz + t * dz))
    }
}
