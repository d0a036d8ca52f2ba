//! Volatility estimates for the delta calculation: realised from underlying
//! closes, or implied from an observed call price.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use dr_types::InputError;

use crate::contract::TRADING_DAYS_PER_YEAR;
use crate::pricing::{call_price, call_vega, require_positive, validate};

/// Realised volatility is clipped to this band.
pub const HISTORICAL_VOLATILITY_BOUNDS: (f64, f64) = (0.05, 2.0);

/// Search bracket for the implied volatility solver.
const IMPLIED_SEARCH_BOUNDS: (f64, f64) = (0.01, 5.0);
/// Solved implied volatility is clipped to this band.
const IMPLIED_VOLATILITY_BOUNDS: (f64, f64) = (0.01, 2.0);
const IMPLIED_PRICE_TOLERANCE: f64 = 1e-10;
const MAX_ITERATIONS: usize = 100;

/// Annualised volatility of daily log returns over `closes`, oldest first.
///
/// Uses the sample standard deviation scaled by `sqrt(252)`, clipped to
/// [`HISTORICAL_VOLATILITY_BOUNDS`]. Non-positive closes are skipped.
/// Returns `None` when fewer than two returns are available.
pub fn historical_volatility(closes: &[Decimal]) -> Option<f64> {
    let closes: Vec<f64> = closes
        .iter()
        .filter_map(|c| c.to_f64())
        .filter(|c| *c > 0.0)
        .collect();
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    if returns.len() < 2 {
        return None;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let annualised = variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt();

    let (min, max) = HISTORICAL_VOLATILITY_BOUNDS;
    let clipped = annualised.clamp(min, max);
    debug!(returns = returns.len(), raw = annualised, volatility = clipped, "Historical volatility");
    Some(clipped)
}

/// Volatility at which the Black-Scholes call price matches `option_price`.
///
/// Newton steps on vega, falling back to bisection whenever a step leaves
/// the current bracket. A price outside what the model can produce for
/// volatilities in 1%..500% is rejected.
pub fn implied_volatility(
    option_price: f64,
    underlying_price: f64,
    strike: f64,
    years_to_expiry: f64,
    risk_free_rate: f64,
) -> Result<f64, InputError> {
    require_positive("option_price", option_price)?;
    let (mut lo, mut hi) = IMPLIED_SEARCH_BOUNDS;
    validate(underlying_price, strike, years_to_expiry, lo, risk_free_rate)?;

    let price_at = |sigma: f64| call_price(underlying_price, strike, years_to_expiry, sigma, risk_free_rate);
    let (floor, ceiling) = (price_at(lo), price_at(hi));
    if option_price < floor || option_price > ceiling {
        return Err(InputError::OutOfRange {
            parameter: "option_price",
            value: option_price,
            min: floor,
            max: ceiling,
        });
    }

    let mut sigma = 0.30;
    for _ in 0..MAX_ITERATIONS {
        let diff = price_at(sigma) - option_price;
        if diff.abs() < IMPLIED_PRICE_TOLERANCE {
            break;
        }
        // price is increasing in volatility
        if diff > 0.0 {
            hi = sigma;
        } else {
            lo = sigma;
        }
        let vega = call_vega(underlying_price, strike, years_to_expiry, sigma, risk_free_rate);
        let newton = sigma - diff / vega;
        sigma = if vega > f64::EPSILON && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }

    let (min, max) = IMPLIED_VOLATILITY_BOUNDS;
    let clipped = sigma.clamp(min, max);
    if clipped != sigma {
        warn!(implied = sigma, clipped, "Unusual implied volatility");
    }
    Ok(clipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_historical_volatility_alternating_returns() {
        // returns +ln 1.1, -ln 1.1, ... : sample std = ln(1.1) * sqrt(4/3)
        let closes = [dec!(100), dec!(110), dec!(100), dec!(110), dec!(100)];
        let vol = historical_volatility(&closes).unwrap();
        assert!((vol - 1.747_064).abs() < 1e-5, "vol = {vol}");
    }

    #[test]
    fn test_historical_volatility_is_clipped() {
        let flat = [dec!(2.50); 10];
        assert_eq!(historical_volatility(&flat), Some(0.05));

        let wild = [dec!(1), dec!(3), dec!(1), dec!(3), dec!(1)];
        assert_eq!(historical_volatility(&wild), Some(2.0));
    }

    #[test]
    fn test_historical_volatility_needs_two_returns() {
        assert_eq!(historical_volatility(&[]), None);
        assert_eq!(historical_volatility(&[dec!(2.5), dec!(2.6)]), None);
        // zero close is dropped, leaving one return
        assert_eq!(historical_volatility(&[dec!(2.5), dec!(0), dec!(2.6)]), None);
    }

    #[test]
    fn test_implied_volatility_recovers_model_input() {
        let t = 41.0 / 252.0;
        let price = call_price(2.50, 2.75, t, 0.42, 0.05);
        let vol = implied_volatility(price, 2.50, 2.75, t, 0.05).unwrap();
        assert!((vol - 0.42).abs() < 1e-6, "vol = {vol}");
    }

    #[test]
    fn test_implied_volatility_reference() {
        // Hull: S=42, K=40, r=10%, T=0.5, c=4.7594 -> sigma = 20%
        let vol = implied_volatility(4.759_422, 42.0, 40.0, 0.5, 0.10).unwrap();
        assert!((vol - 0.20).abs() < 1e-4, "vol = {vol}");
    }

    #[test]
    fn test_implied_volatility_rejects_unreachable_prices() {
        let t = 41.0 / 252.0;
        // above the 500% price and below the 1% price
        assert!(matches!(
            implied_volatility(3.0, 2.50, 2.50, t, 0.05),
            Err(InputError::OutOfRange { parameter: "option_price", .. })
        ));
        assert!(implied_volatility(0.001, 2.50, 2.50, t, 0.05).is_err());
        assert!(matches!(
            implied_volatility(0.0, 2.50, 2.50, t, 0.05),
            Err(InputError::NonPositive { parameter: "option_price", .. })
        ));
        assert!(implied_volatility(0.10, 2.50, 2.50, 0.0, 0.05).is_err());
    }
}
