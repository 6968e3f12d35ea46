use crate::types::{Config, LanesSetting};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects bad thresholds before any frame is processed. Per-frame
    /// geometric anomalies are handled locally and are never errors.
    fn validate(&self) -> Result<()> {
        if self.tracking.max_disappeared < 0 {
            bail!(
                "tracking.max_disappeared must be >= 0, got {}",
                self.tracking.max_disappeared
            );
        }
        if !self.tracking.max_distance.is_finite() || self.tracking.max_distance <= 0.0 {
            bail!(
                "tracking.max_distance must be a positive number, got {}",
                self.tracking.max_distance
            );
        }
        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            bail!(
                "detection.min_confidence must be in [0, 1], got {}",
                self.detection.min_confidence
            );
        }
        if self.detection.classes.is_empty() {
            bail!("detection.classes must name at least one class");
        }
        if let LanesSetting::Polygons(polygons) = &self.lanes {
            for (i, polygon) in polygons.iter().enumerate() {
                if polygon.len() < 3 {
                    bail!(
                        "lane polygon {} has {} points, need at least 3",
                        i + 1,
                        polygon.len()
                    );
                }
            }
        }
        Ok(())
    }
}
