//! Black-Scholes delta and price for European calls.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dr_types::InputError;

/// Inputs shared by all pricing calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingInput {
    /// Current underlying price.
    pub spot: f64,
    /// Annualised risk-free rate (e.g. 0.05 = 5 %).
    pub risk_free_rate: f64,
    /// Annualised volatility (e.g. 0.30 = 30 %).
    pub volatility: f64,
    /// Time to expiry in years.
    pub time_to_expiry: f64,
}

/// Result of a pricing calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    /// Theoretical call price.
    pub price: Decimal,
    /// Call delta in [0, 1].
    pub delta: f64,
}

// ---------- normal distribution helpers (no external dep) ----------

/// Standard normal cumulative distribution function.
///
/// Uses the Abramowitz & Stegun 7.1.26 erf approximation (|ε| < 1.5e-7).
pub fn norm_cdf(x: f64) -> f64 {
    if x >= 8.0 {
        return 1.0;
    }
    if x <= -8.0 {
        return 0.0;
    }

    let a1 = 0.254829592_f64;
    let a2 = -0.284496736_f64;
    let a3 = 1.421413741_f64;
    let a4 = -1.453152027_f64;
    let a5 = 1.061405429_f64;
    let p = 0.3275911_f64;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let z = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + p * z);
    let erf = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-z * z).exp();

    0.5 * (1.0 + sign * erf)
}

// ---------- Black-Scholes core ----------

pub(crate) fn require_positive(parameter: &'static str, value: f64) -> Result<(), InputError> {
    // NaN fails this comparison too
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(InputError::NonPositive { parameter, value })
    }
}

pub(crate) fn validate(spot: f64, strike: f64, t: f64, sigma: f64, r: f64) -> Result<(), InputError> {
    require_positive("underlying_price", spot)?;
    require_positive("strike", strike)?;
    require_positive("years_to_expiry", t)?;
    require_positive("volatility", sigma)?;
    if !r.is_finite() {
        return Err(InputError::Invalid {
            message: format!("risk_free_rate must be finite, got {r}"),
        });
    }
    Ok(())
}

/// Compute d1 and d2.
fn d1_d2(s: f64, k: f64, r: f64, sigma: f64, t: f64) -> (f64, f64) {
    let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt());
    let d2 = d1 - sigma * t.sqrt();
    (d1, d2)
}

/// Call delta `N(d1)`.
///
/// Fails with [`InputError::NonPositive`] when any of spot, strike, time to
/// expiry or volatility is not strictly positive.
pub fn call_delta(
    underlying_price: f64,
    strike: f64,
    years_to_expiry: f64,
    volatility: f64,
    risk_free_rate: f64,
) -> Result<f64, InputError> {
    validate(underlying_price, strike, years_to_expiry, volatility, risk_free_rate)?;
    let (d1, _) = d1_d2(
        underlying_price,
        strike,
        risk_free_rate,
        volatility,
        years_to_expiry,
    );
    Ok(norm_cdf(d1))
}

/// Call price in `f64`; inputs must already be validated.
pub(crate) fn call_price(s: f64, k: f64, t: f64, sigma: f64, r: f64) -> f64 {
    let (d1, d2) = d1_d2(s, k, r, sigma, t);
    (s * norm_cdf(d1) - k * (-r * t).exp() * norm_cdf(d2)).max(0.0)
}

/// Sensitivity of the call price to volatility, `S * phi(d1) * sqrt(T)`.
pub(crate) fn call_vega(s: f64, k: f64, t: f64, sigma: f64, r: f64) -> f64 {
    let (d1, _) = d1_d2(s, k, r, sigma, t);
    let density = (-0.5 * d1 * d1).exp() / (2.0 * std::f64::consts::PI).sqrt();
    s * density * t.sqrt()
}

pub(crate) fn strike_to_f64(strike: Decimal) -> Result<f64, InputError> {
    strike.to_f64().ok_or_else(|| InputError::Invalid {
        message: format!("strike {strike} is not representable"),
    })
}

/// Price a European call and return its delta alongside.
pub fn black_scholes_call(strike: Decimal, input: &PricingInput) -> Result<PricingResult, InputError> {
    let s = input.spot;
    let k = strike_to_f64(strike)?;
    let r = input.risk_free_rate;
    let sigma = input.volatility;
    let t = input.time_to_expiry;
    validate(s, k, t, sigma, r)?;

    let (d1, _) = d1_d2(s, k, r, sigma, t);
    let price = call_price(s, k, t, sigma, r);

    Ok(PricingResult {
        price: Decimal::from_f64(price).ok_or_else(|| InputError::Invalid {
            message: format!("call price {price} for strike {strike} is not representable"),
        })?,
        delta: norm_cdf(d1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(spot: f64) -> PricingInput {
        PricingInput {
            spot,
            risk_free_rate: 0.05,
            volatility: 0.30,
            time_to_expiry: 0.25,
        }
    }

    #[test]
    fn test_norm_cdf_reference_values() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((norm_cdf(1.0) - 0.841_344_746).abs() < 1e-6);
        assert!((norm_cdf(-1.0) - 0.158_655_254).abs() < 1e-6);
        assert!((norm_cdf(1.959_964) - 0.975).abs() < 1e-6);
        assert!((norm_cdf(-2.326_348) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_norm_cdf_boundaries() {
        assert!(norm_cdf(8.0) == 1.0);
        assert!(norm_cdf(-8.0) == 0.0);
    }

    #[test]
    fn test_atm_delta_slightly_above_half() {
        let delta = call_delta(100.0, 100.0, 0.5, 0.2, 0.05).unwrap();
        // d1 = (0 + 0.07 * 0.5) / (0.2 * sqrt(0.5)) = 0.2475
        assert!((delta - 0.5977).abs() < 1e-3, "delta = {delta}");
    }

    #[test]
    fn test_delta_strictly_inside_unit_interval() {
        for spot in [1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0] {
            for strike in [2.0, 2.5, 3.0] {
                let delta = call_delta(spot, strike, 0.25, 0.3, 0.05).unwrap();
                assert!(delta > 0.0 && delta < 1.0, "delta = {delta} at S={spot} K={strike}");
            }
        }
    }

    #[test]
    fn test_delta_monotonic_in_spot() {
        let mut previous = 0.0;
        for i in 0..40 {
            let spot = 1.5 + i as f64 * 0.05;
            let delta = call_delta(spot, 2.5, 60.0 / 252.0, 0.3, 0.05).unwrap();
            assert!(delta > previous, "delta not increasing at S={spot}");
            previous = delta;
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let cases = [
            (0.0, 2.5, 0.25, 0.3, "underlying_price"),
            (2.5, -1.0, 0.25, 0.3, "strike"),
            (2.5, 2.5, 0.0, 0.3, "years_to_expiry"),
            (2.5, 2.5, 0.25, 0.0, "volatility"),
            (2.5, 2.5, 0.25, f64::NAN, "volatility"),
        ];
        for (s, k, t, v, name) in cases {
            match call_delta(s, k, t, v, 0.05) {
                Err(InputError::NonPositive { parameter, .. }) => assert_eq!(parameter, name),
                other => panic!("expected NonPositive({name}), got {other:?}"),
            }
        }
    }

    #[test]
    fn test_call_price_sanity() {
        let res = black_scholes_call(dec!(150), &input(155.0)).unwrap();
        let price = res.price.to_f64().unwrap();
        // ITM call should be worth at least intrinsic ($5)
        assert!(price > 5.0, "call price = {price}");
        assert!(price < 20.0, "call price unreasonably high = {price}");
        assert!(res.delta > 0.5);
    }

    #[test]
    fn test_call_price_matches_reference() {
        // Hull: S=42, K=40, r=10%, sigma=20%, T=0.5 -> c = 4.76
        let res = black_scholes_call(
            dec!(40),
            &PricingInput {
                spot: 42.0,
                risk_free_rate: 0.10,
                volatility: 0.20,
                time_to_expiry: 0.5,
            },
        )
        .unwrap();
        let price = res.price.to_f64().unwrap();
        assert!((price - 4.76).abs() < 0.01, "price = {price}");
    }

    #[test]
    fn test_call_price_rejects_expired() {
        let mut expired = input(2.5);
        expired.time_to_expiry = 0.0;
        assert!(black_scholes_call(dec!(2.5), &expired).is_err());
    }
}
