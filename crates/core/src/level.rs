//! XP → level arithmetic.
//!
//! Levels are flat: every level costs the same amount of XP. Level numbering
//! starts at 1 so a learner with zero XP is already "level 1".

use serde::{Deserialize, Serialize};

use crate::settings::{ConfigError, ProgressionSettings};

/// Display-ready breakdown of a learner's position inside their level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u64,
    pub xp_into_level: u64,
    pub xp_per_level: u64,
    /// 0.0..=100.0
    pub percent_to_next: f64,
}

/// Maps accumulated XP to a level, given a fixed per-level cost.
///
/// # Examples
///
/// ```
/// # use raccoon_core::level::LevelCalculator;
/// let calc = LevelCalculator::new(100)?;
/// assert_eq!(calc.level(250), 3);
/// assert_eq!(calc.progress_within_level(250), 50);
/// # Ok::<(), raccoon_core::ConfigError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCalculator {
    xp_per_level: u64,
}

impl LevelCalculator {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidXpPerLevel` when `xp_per_level` is not positive.
    pub fn new(xp_per_level: i64) -> Result<Self, ConfigError> {
        match u64::try_from(xp_per_level) {
            Ok(v) if v > 0 => Ok(Self { xp_per_level: v }),
            _ => Err(ConfigError::InvalidXpPerLevel {
                provided: xp_per_level,
            }),
        }
    }

    /// Settings are validated on construction, so this cannot fail.
    #[must_use]
    pub fn from_settings(settings: &ProgressionSettings) -> Self {
        Self {
            xp_per_level: settings.xp_per_level(),
        }
    }

    #[must_use]
    pub fn xp_per_level(&self) -> u64 {
        self.xp_per_level
    }

    #[must_use]
    pub fn level(&self, xp: u64) -> u64 {
        (xp / self.xp_per_level).saturating_add(1).max(1)
    }

    #[must_use]
    pub fn progress_within_level(&self, xp: u64) -> u64 {
        xp % self.xp_per_level
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_to_next_level(&self, xp: u64) -> f64 {
        let pct = self.progress_within_level(xp) as f64 / self.xp_per_level as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }

    #[must_use]
    pub fn progress(&self, xp: u64) -> LevelProgress {
        LevelProgress {
            level: self.level(xp),
            xp_into_level: self.progress_within_level(xp),
            xp_per_level: self.xp_per_level,
            percent_to_next: self.percent_to_next_level(xp),
        }
    }
}
