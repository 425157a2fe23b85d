//! Access engine configuration

use crate::error::{AccessError, AccessResult};

/// Valid range for the optional invite-link TTL (one minute to one week)
const INVITE_TTL_RANGE: std::ops::RangeInclusive<i64> = 60..=604_800;
/// Valid range for the optional invite-link member limit
const INVITE_MAX_USES_RANGE: std::ops::RangeInclusive<i32> = 1..=100_000;

/// Tunables for the access lifecycle engine
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Days of grace after a payment failure before access is torn down
    pub grace_period_days: i64,
    /// Optional TTL applied to created invite links, in seconds
    pub invite_ttl_seconds: Option<i64>,
    /// Optional member limit applied to created invite links
    pub invite_max_uses: Option<i32>,
    /// Telegram Stars conversion rate, cents per star
    pub stars_rate_cents: i64,
    /// Retry budget for grant/revoke jobs before they land in the DLQ
    pub job_max_attempts: i32,
    /// Base delay of the exponential job backoff, in seconds
    pub job_backoff_base_secs: i64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            grace_period_days: 5,
            invite_ttl_seconds: None,
            invite_max_uses: None,
            stars_rate_cents: 2,
            job_max_attempts: 10,
            job_backoff_base_secs: 300,
        }
    }
}

impl AccessConfig {
    /// Create config from environment variables, validating ranges
    pub fn from_env() -> AccessResult<Self> {
        let defaults = Self::default();

        let config = Self {
            grace_period_days: parse_var("GRACE_PERIOD_DAYS")?.unwrap_or(defaults.grace_period_days),
            invite_ttl_seconds: parse_var("INVITE_TTL_SECONDS")?,
            invite_max_uses: parse_var("INVITE_MAX_USES")?,
            stars_rate_cents: parse_var("STARS_RATE_CENTS")?.unwrap_or(defaults.stars_rate_cents),
            job_max_attempts: parse_var("JOB_MAX_ATTEMPTS")?.unwrap_or(defaults.job_max_attempts),
            job_backoff_base_secs: parse_var("JOB_BACKOFF_BASE_SECS")?
                .unwrap_or(defaults.job_backoff_base_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AccessResult<()> {
        if self.grace_period_days < 0 {
            return Err(AccessError::Config(
                "GRACE_PERIOD_DAYS must not be negative".to_string(),
            ));
        }
        if let Some(ttl) = self.invite_ttl_seconds {
            if !INVITE_TTL_RANGE.contains(&ttl) {
                return Err(AccessError::Config(format!(
                    "INVITE_TTL_SECONDS must be within {}..={}, got {}",
                    INVITE_TTL_RANGE.start(),
                    INVITE_TTL_RANGE.end(),
                    ttl
                )));
            }
        }
        if let Some(uses) = self.invite_max_uses {
            if !INVITE_MAX_USES_RANGE.contains(&uses) {
                return Err(AccessError::Config(format!(
                    "INVITE_MAX_USES must be within {}..={}, got {}",
                    INVITE_MAX_USES_RANGE.start(),
                    INVITE_MAX_USES_RANGE.end(),
                    uses
                )));
            }
        }
        if self.stars_rate_cents <= 0 {
            return Err(AccessError::Config(
                "STARS_RATE_CENTS must be positive".to_string(),
            ));
        }
        if self.job_max_attempts < 1 {
            return Err(AccessError::Config(
                "JOB_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.job_backoff_base_secs < 1 {
            return Err(AccessError::Config(
                "JOB_BACKOFF_BASE_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> AccessResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AccessError::Config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AccessConfig::default();
        assert_eq!(config.grace_period_days, 5);
        assert_eq!(config.stars_rate_cents, 2);
        assert_eq!(config.job_max_attempts, 10);
        assert_eq!(config.job_backoff_base_secs, 300);
        assert!(config.invite_ttl_seconds.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invite_ttl_range_enforced() {
        let config = AccessConfig {
            invite_ttl_seconds: Some(59),
            ..AccessConfig::default()
        };
        assert!(matches!(config.validate(), Err(AccessError::Config(_))));

        let config = AccessConfig {
            invite_ttl_seconds: Some(604_801),
            ..AccessConfig::default()
        };
        assert!(matches!(config.validate(), Err(AccessError::Config(_))));

        let config = AccessConfig {
            invite_ttl_seconds: Some(3_600),
            ..AccessConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invite_max_uses_range_enforced() {
        let config = AccessConfig {
            invite_max_uses: Some(0),
            ..AccessConfig::default()
        };
        assert!(matches!(config.validate(), Err(AccessError::Config(_))));

        let config = AccessConfig {
            invite_max_uses: Some(1),
            ..AccessConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
