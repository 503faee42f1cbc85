//! Axis-aligned envelopes used for map-extent filtering.

use serde::{Deserialize, Serialize};

/// A rectangular extent. Points are represented as zero-area envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Envelope {
    /// Builds an envelope, normalizing swapped corners.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            xmin: x1.min(x2),
            ymin: y1.min(y2),
            xmax: x1.max(x2),
            ymax: y1.max(y2),
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// True when `self` lies entirely inside `extent` (boundaries inclusive).
    pub fn within(&self, extent: &Envelope) -> bool {
        self.xmin >= extent.xmin
            && self.xmax <= extent.xmax
            && self.ymin >= extent.ymin
            && self.ymax <= extent.ymax
    }

    /// True when the interiors of `self` and `extent` share any area.
    ///
    /// Touching edges do not count. A shape that covers the whole extent
    /// overlaps it.
    pub fn overlaps(&self, extent: &Envelope) -> bool {
        self.xmin < extent.xmax
            && self.xmax > extent.xmin
            && self.ymin < extent.ymax
            && self.ymax > extent.ymin
    }
}

impl From<[f64; 4]> for Envelope {
    fn from(v: [f64; 4]) -> Self {
        Envelope::new(v[0], v[1], v[2], v[3])
    }
}
