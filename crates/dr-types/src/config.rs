use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{InputError, RollError, RollResult};

/// What to do with a selection whose delta misses the tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToleranceAction {
    /// Keep the degraded match and report the breach.
    Accept,
    /// Drop the month (reported as a gap) and report the breach.
    Reject,
}

/// How an instrument's active window is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowPolicy {
    /// End at the next roll date or at expiry, whichever comes first.
    RollToRoll,
    /// Hold until expiry; consecutive windows overlap.
    HoldToExpiry,
}

/// Where the volatility used for deltas comes from on each roll date.
///
/// A candidate that carries its own implied volatility always uses it; the
/// source only decides the value for candidates without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilitySource {
    /// Always [`RollConfig::volatility`].
    Fixed,
    /// Realised volatility of the underlying over the last `window_days`
    /// trading days up to the roll date.
    Historical { window_days: usize },
    /// Implied from the settlement of the call struck nearest the underlying.
    Implied,
}

/// Immutable run parameters threaded through every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollConfig {
    /// Root used for underlying quotes and option chains (e.g. `HO`).
    pub underlying_root: String,
    /// Root used in option symbols (e.g. `OH`).
    pub option_root: String,
    pub target_delta: f64,
    pub delta_tolerance: Option<f64>,
    pub tolerance_action: ToleranceAction,
    /// Target expiration offset from the roll month (M+n).
    pub months_ahead: u32,
    /// Annualised volatility assumed when a candidate carries none, and the
    /// fallback when the volatility source cannot produce an estimate.
    pub volatility: f64,
    pub volatility_source: VolatilitySource,
    pub risk_free_rate: f64,
    pub window_policy: WindowPolicy,
    /// Months scheduled before the output range so the held instrument is priced.
    pub lookback_months: u32,
    /// Resolve months and fetch histories on the rayon pool.
    pub parallel: bool,
}

impl Default for RollConfig {
    fn default() -> Self {
        Self {
            underlying_root: "HO".to_string(),
            option_root: "OH".to_string(),
            target_delta: 0.15,
            delta_tolerance: Some(0.02),
            tolerance_action: ToleranceAction::Accept,
            months_ahead: 2,
            volatility: 0.30,
            volatility_source: VolatilitySource::Fixed,
            risk_free_rate: 0.05,
            window_policy: WindowPolicy::RollToRoll,
            lookback_months: 1,
            parallel: true,
        }
    }
}

impl RollConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> RollResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: RollConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn with_roots(mut self, underlying_root: &str, option_root: &str) -> Self {
        self.underlying_root = underlying_root.to_string();
        self.option_root = option_root.to_string();
        self
    }

    pub fn with_target_delta(mut self, target_delta: f64) -> Self {
        self.target_delta = target_delta;
        self
    }

    pub fn with_tolerance(mut self, tolerance: Option<f64>) -> Self {
        self.delta_tolerance = tolerance;
        self
    }

    pub fn with_tolerance_action(mut self, action: ToleranceAction) -> Self {
        self.tolerance_action = action;
        self
    }

    pub fn with_months_ahead(mut self, months_ahead: u32) -> Self {
        self.months_ahead = months_ahead;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn with_volatility_source(mut self, source: VolatilitySource) -> Self {
        self.volatility_source = source;
        self
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    pub fn with_window_policy(mut self, policy: WindowPolicy) -> Self {
        self.window_policy = policy;
        self
    }

    pub fn with_lookback_months(mut self, months: u32) -> Self {
        self.lookback_months = months;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> RollResult<()> {
        if self.underlying_root.is_empty() || self.option_root.is_empty() {
            return Err(RollError::Config("roots must not be empty".to_string()));
        }
        if !self.option_root.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(RollError::Config(format!(
                "option root {:?} must be upper-case letters",
                self.option_root
            )));
        }
        if !(self.target_delta > 0.0 && self.target_delta < 1.0) {
            return Err(InputError::OutOfRange {
                parameter: "target_delta",
                value: self.target_delta,
                min: 0.0,
                max: 1.0,
            }
            .into());
        }
        if let Some(tolerance) = self.delta_tolerance {
            if !(tolerance >= 0.0) {
                return Err(InputError::NonPositive {
                    parameter: "delta_tolerance",
                    value: tolerance,
                }
                .into());
            }
        }
        if !(self.volatility > 0.0) {
            return Err(InputError::NonPositive {
                parameter: "volatility",
                value: self.volatility,
            }
            .into());
        }
        if let VolatilitySource::Historical { window_days } = self.volatility_source {
            if window_days < 3 {
                return Err(RollError::Config(format!(
                    "historical volatility needs a window of at least 3 trading days, got {window_days}"
                )));
            }
        }
        if !self.risk_free_rate.is_finite() {
            return Err(InputError::Invalid {
                message: format!("risk_free_rate must be finite, got {}", self.risk_free_rate),
            }
            .into());
        }
        if self.months_ahead == 0 {
            return Err(RollError::Config(
                "months_ahead must be at least 1: the M+0 contract expires before its roll date"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RollConfig::default();
        assert_eq!(config.target_delta, 0.15);
        assert_eq!(config.months_ahead, 2);
        assert_eq!(config.delta_tolerance, Some(0.02));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RollConfig::new().with_volatility(0.0).validate().is_err());
        assert!(RollConfig::new().with_volatility(f64::NAN).validate().is_err());
        assert!(RollConfig::new().with_target_delta(1.2).validate().is_err());
        assert!(RollConfig::new().with_tolerance(Some(-0.1)).validate().is_err());
        assert!(RollConfig::new().with_months_ahead(0).validate().is_err());
        assert!(RollConfig::new().with_roots("HO", "oh").validate().is_err());
        let short = VolatilitySource::Historical { window_days: 2 };
        assert!(RollConfig::new().with_volatility_source(short).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RollConfig =
            serde_json::from_str(r#"{"target_delta": 0.25, "months_ahead": 3}"#).unwrap();
        assert_eq!(config.target_delta, 0.25);
        assert_eq!(config.months_ahead, 3);
        assert_eq!(config.underlying_root, "HO");
        assert_eq!(config.window_policy, WindowPolicy::RollToRoll);
        assert_eq!(config.volatility_source, VolatilitySource::Fixed);
    }

    #[test]
    fn test_volatility_source_from_json() {
        let config: RollConfig =
            serde_json::from_str(r#"{"volatility_source": {"Historical": {"window_days": 30}}}"#).unwrap();
        assert_eq!(config.volatility_source, VolatilitySource::Historical { window_days: 30 });
        assert!(config.validate().is_ok());

        let config: RollConfig = serde_json::from_str(r#"{"volatility_source": "Implied"}"#).unwrap();
        assert_eq!(config.volatility_source, VolatilitySource::Implied);
    }

    #[test]
    fn test_builders() {
        let config = RollConfig::new()
            .with_roots("CL", "LO")
            .with_tolerance_action(ToleranceAction::Reject)
            .with_window_policy(WindowPolicy::HoldToExpiry)
            .with_parallel(false);
        assert_eq!(config.option_root, "LO");
        assert_eq!(config.tolerance_action, ToleranceAction::Reject);
        assert!(!config.parallel);
    }
}
