use thiserror::Error;

use crate::time::DayBoundary;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Invalid progression constants. Fatal: callers must not fall back to defaults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("xp per level must be > 0, got {provided}")]
    InvalidXpPerLevel { provided: i64 },

    #[error("section completion xp must be >= 0, got {provided}")]
    InvalidSectionCompletionXp { provided: i64 },

    #[error("campaign completion xp must be >= 0, got {provided}")]
    InvalidCampaignCompletionXp { provided: i64 },

    #[error("conflict retry attempts must be >= 1")]
    InvalidRetryAttempts,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

pub const DEFAULT_XP_PER_LEVEL: u64 = 100;
pub const DEFAULT_SECTION_COMPLETION_XP: u64 = 40;
pub const DEFAULT_CAMPAIGN_COMPLETION_XP: u64 = 150;
pub const DEFAULT_CONFLICT_RETRY_ATTEMPTS: u32 = 3;

/// Tunable constants for XP, levels, streaks and persistence retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionSettings {
    xp_per_level: u64,
    section_completion_xp: u64,
    campaign_completion_xp: u64,
    day_boundary: DayBoundary,
    conflict_retry_attempts: u32,
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        Self {
            xp_per_level: DEFAULT_XP_PER_LEVEL,
            section_completion_xp: DEFAULT_SECTION_COMPLETION_XP,
            campaign_completion_xp: DEFAULT_CAMPAIGN_COMPLETION_XP,
            day_boundary: DayBoundary::Local,
            conflict_retry_attempts: DEFAULT_CONFLICT_RETRY_ATTEMPTS,
        }
    }
}

impl ProgressionSettings {
    /// Creates custom settings.
    ///
    /// Values arrive as signed integers because they usually come from
    /// environment variables or config files; negative input must be reported,
    /// not wrapped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `xp_per_level <= 0`, a completion bonus is
    /// negative, or `conflict_retry_attempts == 0`.
    pub fn new(
        xp_per_level: i64,
        section_completion_xp: i64,
        campaign_completion_xp: i64,
        day_boundary: DayBoundary,
        conflict_retry_attempts: u32,
    ) -> Result<Self, ConfigError> {
        let per_level = u64::try_from(xp_per_level)
            .ok()
            .filter(|v| *v > 0)
            .ok_or(ConfigError::InvalidXpPerLevel {
                provided: xp_per_level,
            })?;
        let section = u64::try_from(section_completion_xp).map_err(|_| {
            ConfigError::InvalidSectionCompletionXp {
                provided: section_completion_xp,
            }
        })?;
        let campaign = u64::try_from(campaign_completion_xp).map_err(|_| {
            ConfigError::InvalidCampaignCompletionXp {
                provided: campaign_completion_xp,
            }
        })?;
        if conflict_retry_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts);
        }

        Ok(Self {
            xp_per_level: per_level,
            section_completion_xp: section,
            campaign_completion_xp: campaign,
            day_boundary,
            conflict_retry_attempts,
        })
    }

    /// Same defaults, but with an explicit day boundary.
    #[must_use]
    pub fn with_day_boundary(mut self, day_boundary: DayBoundary) -> Self {
        self.day_boundary = day_boundary;
        self
    }

    #[must_use]
    pub fn xp_per_level(&self) -> u64 {
        self.xp_per_level
    }

    #[must_use]
    pub fn section_completion_xp(&self) -> u64 {
        self.section_completion_xp
    }

    #[must_use]
    pub fn campaign_completion_xp(&self) -> u64 {
        self.campaign_completion_xp
    }

    #[must_use]
    pub fn day_boundary(&self) -> DayBoundary {
        self.day_boundary
    }

    #[must_use]
    pub fn conflict_retry_attempts(&self) -> u32 {
        self.conflict_retry_attempts
    }
}
