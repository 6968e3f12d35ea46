// src/lanes.rs

use crate::types::{Centroid, LanesSetting};
use anyhow::{bail, Result};

pub const EQUAL_VERTICAL_3: &str = "equal_vertical_3";

/// Lane regions for one video. With explicit polygons, a point belongs to
/// the first polygon (configuration order, 1-based) that contains it,
/// boundary included. Points outside every polygon, and the
/// `equal_vertical_3` preset, fall back to three equal vertical bands.
pub struct LaneLayout {
    polygons: Vec<Vec<(f32, f32)>>,
    frame_width: f32,
}

impl LaneLayout {
    pub fn new(setting: &LanesSetting, frame_width: usize, frame_height: usize) -> Result<Self> {
        if frame_width == 0 || frame_height == 0 {
            bail!(
                "frame dimensions must be non-zero, got {}x{}",
                frame_width,
                frame_height
            );
        }
        let polygons = match setting {
            LanesSetting::Preset(name) if name == EQUAL_VERTICAL_3 => Vec::new(),
            LanesSetting::Preset(other) => bail!("unknown lanes preset: {}", other),
            LanesSetting::Polygons(polygons) => {
                for (i, polygon) in polygons.iter().enumerate() {
                    if polygon.len() < 3 {
                        bail!(
                            "lane polygon {} has {} points, need at least 3",
                            i + 1,
                            polygon.len()
                        );
                    }
                }
                polygons.clone()
            }
        };
        Ok(Self {
            polygons,
            frame_width: frame_width as f32,
        })
    }

    /// Pure point-to-lane mapping; never fails for finite points.
    /// Degenerate polygons contain nothing and fall through to the bands.
    pub fn classify(&self, point: Centroid) -> u32 {
        for (i, polygon) in self.polygons.iter().enumerate() {
            if point_in_polygon(point, polygon) {
                return i as u32 + 1;
            }
        }
        // Equal vertical thirds; boundary values go to the higher band.
        let third = self.frame_width / 3.0;
        if point.0 < third {
            1
        } else if point.0 < 2.0 * third {
            2
        } else {
            3
        }
    }

    pub fn lane_count(&self) -> u32 {
        (self.polygons.len() as u32).max(3)
    }

    pub fn polygons(&self) -> &[Vec<(f32, f32)>] {
        &self.polygons
    }

    pub fn frame_width(&self) -> f32 {
        self.frame_width
    }
}

/// Even-odd ray casting with an explicit edge check so boundary points
/// count as inside (matching OpenCV's pointPolygonTest >= 0 convention).
fn point_in_polygon(point: Centroid, polygon: &[(f32, f32)]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let (px, py) = point;
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if on_segment(point, polygon[i], polygon[j]) {
            return true;
        }
        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(p: Centroid, a: (f32, f32), b: (f32, f32)) -> bool {
    const EPS: f32 = 1e-4;
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > EPS * (1.0 + (b.0 - a.0).abs() + (b.1 - a.1).abs()) {
        return false;
    }
    p.0 >= a.0.min(b.0) - EPS
        && p.0 <= a.0.max(b.0) + EPS
        && p.1 >= a.1.min(b.1) - EPS
        && p.1 <= a.1.max(b.1) + EPS
}
