use crate::application::collaborators::RetryPolicy;
use crate::domain::booking::DurationLimits;
use crate::domain::money::FeeRate;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `SESSION_LEDGER__PLATFORM_FEE_RATE=0.10`.
pub const ENV_PREFIX: &str = "SESSION_LEDGER";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub platform_fee_rate: Decimal,
    pub min_duration_hours: Decimal,
    pub max_duration_hours: Decimal,
    /// How many times a transition is re-planned after a version conflict.
    pub commit_attempts: u32,
    pub collaborators: CollaboratorSettings,
}

/// Timeout and bounded backoff applied to catalog and proof store calls.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CollaboratorSettings {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::new(13, 2),
            min_duration_hours: Decimal::ONE,
            max_duration_hours: Decimal::from(8),
            commit_attempts: 3,
            collaborators: CollaboratorSettings::default(),
        }
    }
}

impl Default for CollaboratorSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            max_attempts: 3,
            backoff_base_ms: 50,
            backoff_max_ms: 1_000,
        }
    }
}

impl Settings {
    /// Defaults, then the optional file, then `SESSION_LEDGER__*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();
        let mut builder = config::Config::builder()
            .set_default("platform_fee_rate", defaults.platform_fee_rate.to_string())?
            .set_default("min_duration_hours", defaults.min_duration_hours.to_string())?
            .set_default("max_duration_hours", defaults.max_duration_hours.to_string())?
            .set_default("commit_attempts", i64::from(defaults.commit_attempts))?
            .set_default(
                "collaborators.timeout_ms",
                defaults.collaborators.timeout_ms as i64,
            )?
            .set_default(
                "collaborators.max_attempts",
                i64::from(defaults.collaborators.max_attempts),
            )?
            .set_default(
                "collaborators.backoff_base_ms",
                defaults.collaborators.backoff_base_ms as i64,
            )?
            .set_default(
                "collaborators.backoff_max_ms",
                defaults.collaborators.backoff_max_ms as i64,
            )?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let settings: Settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.fee_rate()?;
        if self.min_duration_hours <= Decimal::ZERO
            || self.min_duration_hours > self.max_duration_hours
        {
            return Err(LedgerError::ValidationError(format!(
                "duration bounds must satisfy 0 < min <= max, got {}..{}",
                self.min_duration_hours, self.max_duration_hours
            )));
        }
        if self.commit_attempts == 0 || self.collaborators.max_attempts == 0 {
            return Err(LedgerError::ValidationError(
                "attempt counts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fee_rate(&self) -> Result<FeeRate> {
        FeeRate::new(self.platform_fee_rate)
    }

    pub fn duration_limits(&self) -> DurationLimits {
        DurationLimits {
            min_hours: self.min_duration_hours,
            max_hours: self.max_duration_hours,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.collaborators.max_attempts,
            timeout: Duration::from_millis(self.collaborators.timeout_ms),
            backoff_base: Duration::from_millis(self.collaborators.backoff_base_ms),
            backoff_max: Duration::from_millis(self.collaborators.backoff_max_ms),
        }
    }
}
