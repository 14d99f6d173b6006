use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to the built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let speed = &self.speed;
        if !(speed.distance_m > 0.0) {
            bail!("speed.distance_m must be positive, got {}", speed.distance_m);
        }
        if speed.line1_y == speed.line2_y {
            bail!("speed.line1_y and speed.line2_y must differ");
        }
        if speed.band_half_width_px <= 0 {
            bail!("speed.band_half_width_px must be positive");
        }
        if speed.plausible_min_kmh > speed.plausible_max_kmh {
            bail!(
                "speed.plausible_min_kmh ({}) exceeds plausible_max_kmh ({})",
                speed.plausible_min_kmh,
                speed.plausible_max_kmh
            );
        }
        if self.association.proximity_px <= 0 {
            bail!("association.proximity_px must be positive");
        }
        if !(self.motion.resize_factor > 0.0) {
            bail!("motion.resize_factor must be positive");
        }
        Ok(())
    }
}
