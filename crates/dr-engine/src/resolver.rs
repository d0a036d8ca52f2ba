//! Turning a roll event into a concrete option instrument.

use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use dr_data::{ChainProvider, HistoryProvider, QuoteProvider};
use dr_options::{
    expiry_for, historical_volatility, implied_volatility, select_strike, years_to_expiry, CandidateStrike,
    CandidateTrace, OptionContract,
};
use dr_types::{
    ActiveWindow, DataError, DateRange, InputError, OptionSymbol, RollConfig, RollEvent, RollResult,
    SelectedInstrument, SelectionError, ToleranceAction, TradingCalendar, VolatilitySource,
};

use crate::diagnostics::{GapReason, RollGap, ToleranceBreach};

/// An instrument chosen for a roll event, before its window is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInstrument {
    pub contract: OptionContract,
    pub delta: f64,
    pub within_tolerance: bool,
    pub underlying_price: Decimal,
    pub volatility: f64,
    pub years_to_expiry: f64,
    pub trace: Vec<CandidateTrace>,
}

impl ResolvedInstrument {
    pub fn into_selected(self, roll_date: NaiveDate, window: ActiveWindow) -> SelectedInstrument {
        let OptionContract {
            symbol,
            underlying_contract,
            expiry_date,
        } = self.contract;
        SelectedInstrument {
            strike: symbol.strike,
            symbol,
            underlying_contract,
            delta: self.delta,
            within_tolerance: self.within_tolerance,
            roll_date,
            expiry_date,
            underlying_price: self.underlying_price,
            volatility: self.volatility,
            years_to_expiry: self.years_to_expiry,
            window,
        }
    }
}

/// What a roll event turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum RollOutcome {
    Resolved {
        instrument: ResolvedInstrument,
        breach: Option<ToleranceBreach>,
    },
    Gap {
        gap: RollGap,
        breach: Option<ToleranceBreach>,
    },
}

impl RollOutcome {
    fn gap(event: &RollEvent, contract: String, reason: GapReason) -> Self {
        RollOutcome::Gap {
            gap: RollGap {
                roll_date: event.roll_date,
                target_contract: contract,
                reason,
            },
            breach: None,
        }
    }
}

/// Picks the instrument held from a roll event.
///
/// `Err` is reserved for fatal failures; anything that should only cost the
/// month its column comes back as [`RollOutcome::Gap`].
pub trait InstrumentResolver: Send + Sync {
    fn resolve(&self, event: &RollEvent, calendar: &TradingCalendar) -> RollResult<RollOutcome>;
}

/// Chooses the call whose Black-Scholes delta is closest to the configured target.
#[derive(Debug, Clone, Copy)]
pub struct DeltaTargetResolver<'a> {
    config: &'a RollConfig,
    quotes: &'a dyn QuoteProvider,
    chains: &'a dyn ChainProvider,
    /// Settlement prices for implied volatility.
    history: Option<&'a dyn HistoryProvider>,
}

impl<'a> DeltaTargetResolver<'a> {
    pub fn new(config: &'a RollConfig, quotes: &'a dyn QuoteProvider, chains: &'a dyn ChainProvider) -> Self {
        Self {
            config,
            quotes,
            chains,
            history: None,
        }
    }

    pub fn with_history(mut self, history: &'a dyn HistoryProvider) -> Self {
        self.history = Some(history);
        self
    }

    /// Volatility for candidates without their own, per the configured source.
    /// Falls back to the fixed volatility when no estimate can be made.
    fn roll_volatility(
        &self,
        event: &RollEvent,
        calendar: &TradingCalendar,
        spot: f64,
        years: f64,
        candidates: &[CandidateStrike],
    ) -> f64 {
        let cfg = self.config;
        let estimate = match cfg.volatility_source {
            VolatilitySource::Fixed => return cfg.volatility,
            VolatilitySource::Historical { window_days } => self.historical(event, calendar, window_days),
            VolatilitySource::Implied => self.implied(event, spot, years, candidates),
        };
        match estimate {
            Some(volatility) => {
                debug!(roll_date = %event.roll_date, source = ?cfg.volatility_source, volatility, "Estimated volatility");
                volatility
            }
            None => {
                warn!(
                    roll_date = %event.roll_date,
                    source = ?cfg.volatility_source,
                    fallback = cfg.volatility,
                    "Volatility estimate unavailable, using fixed volatility"
                );
                cfg.volatility
            }
        }
    }

    /// Underlying closes over the `window_days` trading days ending on the roll date.
    fn historical(&self, event: &RollEvent, calendar: &TradingCalendar, window_days: usize) -> Option<f64> {
        let root = self.config.underlying_root.as_str();
        let days = calendar.between(calendar.range().start, event.roll_date);
        let window = &days[days.len().saturating_sub(window_days)..];
        let closes: Vec<Decimal> = window
            .iter()
            .filter_map(|day| self.quotes.quote(root, *day).ok())
            .collect();
        historical_volatility(&closes)
    }

    /// Implied from the roll-date settlement of the listed call nearest the money.
    fn implied(&self, event: &RollEvent, spot: f64, years: f64, candidates: &[CandidateStrike]) -> Option<f64> {
        let history = self.history?;
        let cfg = self.config;
        let atm = candidates
            .iter()
            .filter(|c| c.available)
            .filter_map(|c| c.strike.to_f64().map(|k| (c.strike, k)))
            .min_by(|a, b| (a.1 - spot).abs().total_cmp(&(b.1 - spot).abs()))?;
        let symbol = OptionSymbol::call(&cfg.option_root, event.target_month, atm.0).ok()?;
        let day = DateRange::new(event.roll_date, event.roll_date).ok()?;
        let price = history.history(&symbol, day).ok()?.get(&event.roll_date)?.to_f64()?;
        match implied_volatility(price, spot, atm.1, years, cfg.risk_free_rate) {
            Ok(volatility) => Some(volatility),
            Err(e) => {
                debug!(symbol = %symbol, price, error = %e, "Implied volatility not solvable");
                None
            }
        }
    }

    fn resolve_inner(&self, event: &RollEvent, calendar: &TradingCalendar, contract: &str) -> RollResult<RollOutcome> {
        let cfg = self.config;
        let root = cfg.underlying_root.as_str();

        let spot = match self.quotes.quote(root, event.roll_date) {
            Ok(price) => price,
            Err(DataError::NotAvailable { .. }) => {
                return Ok(RollOutcome::gap(event, contract.to_string(), GapReason::MissingUnderlyingQuote));
            }
            Err(e) => {
                return Ok(RollOutcome::gap(
                    event,
                    contract.to_string(),
                    GapReason::ProviderFailure { message: e.to_string() },
                ));
            }
        };

        let spot_f = spot.to_f64().ok_or_else(|| InputError::Invalid {
            message: format!("underlying quote {spot} is not representable"),
        })?;
        let expiry_date = expiry_for(event.target_month, calendar)?;
        let years = years_to_expiry(event.roll_date, expiry_date, calendar)?;

        let chain = match self.chains.chain(root, event.target_month, event.roll_date) {
            Ok(chain) => chain,
            Err(DataError::NotAvailable { .. }) => Vec::new(),
            Err(e) => {
                return Ok(RollOutcome::gap(
                    event,
                    contract.to_string(),
                    GapReason::ProviderFailure { message: e.to_string() },
                ));
            }
        };
        let candidates: Vec<CandidateStrike> = chain.into_iter().map(CandidateStrike::from).collect();

        let volatility = self.roll_volatility(event, calendar, spot_f, years, &candidates);
        let selection = select_strike(
            spot_f,
            &candidates,
            years,
            volatility,
            cfg.risk_free_rate,
            cfg.target_delta,
            cfg.delta_tolerance,
        )?;

        let Some(selection) = selection else {
            let err = SelectionError::NoCandidates {
                root: root.to_string(),
                contract: contract.to_string(),
                date: event.roll_date,
            };
            debug!(listed = candidates.len(), "{err}");
            return Ok(RollOutcome::gap(event, contract.to_string(), GapReason::NoCandidates));
        };

        let option = OptionContract::new(
            OptionSymbol::call(&cfg.option_root, event.target_month, selection.strike)?,
            expiry_date,
        );
        let symbol = &option.symbol;
        let accepted = cfg.tolerance_action == ToleranceAction::Accept;
        let breach = match selection.breach() {
            Some(SelectionError::OutOfTolerance {
                strike,
                delta,
                distance,
                target,
                tolerance,
            }) => Some(ToleranceBreach {
                roll_date: event.roll_date,
                symbol: symbol.to_string(),
                strike,
                delta,
                distance,
                target,
                tolerance,
                accepted,
            }),
            _ => None,
        };

        if breach.is_some() && !accepted {
            return Ok(RollOutcome::Gap {
                gap: RollGap {
                    roll_date: event.roll_date,
                    target_contract: contract.to_string(),
                    reason: GapReason::OutOfToleranceRejected,
                },
                breach,
            });
        }

        debug!(
            roll_date = %event.roll_date,
            symbol = %symbol,
            delta = selection.delta,
            spot = %spot,
            years_to_expiry = years,
            "Resolved roll"
        );

        Ok(RollOutcome::Resolved {
            instrument: ResolvedInstrument {
                within_tolerance: selection.is_within_tolerance(),
                contract: option,
                delta: selection.delta,
                underlying_price: spot,
                volatility: selection.volatility,
                years_to_expiry: years,
                trace: selection.trace,
            },
            breach,
        })
    }
}

impl InstrumentResolver for DeltaTargetResolver<'_> {
    fn resolve(&self, event: &RollEvent, calendar: &TradingCalendar) -> RollResult<RollOutcome> {
        let contract = event.target_contract(&self.config.option_root);
        self.resolve_inner(event, calendar, &contract)
            .map_err(|e| e.in_roll(event.roll_date, contract))
    }
}

/// Resolve every event, in parallel when asked, returning outcomes in
/// ordinal order. The first fatal error aborts the whole batch.
pub fn resolve_all(
    resolver: &dyn InstrumentResolver,
    events: &[RollEvent],
    calendar: &TradingCalendar,
    parallel: bool,
) -> RollResult<Vec<(RollEvent, RollOutcome)>> {
    let resolve_one = |event: &RollEvent| -> RollResult<(RollEvent, RollOutcome)> {
        let outcome = resolver.resolve(event, calendar)?;
        Ok((*event, outcome))
    };

    let mut outcomes = if parallel {
        events.par_iter().map(resolve_one).collect::<RollResult<Vec<_>>>()?
    } else {
        events.iter().map(resolve_one).collect::<RollResult<Vec<_>>>()?
    };
    outcomes.sort_by_key(|(event, _)| event.ordinal);

    let gaps = outcomes.iter().filter(|(_, o)| matches!(o, RollOutcome::Gap { .. })).count();
    if gaps == outcomes.len() && !outcomes.is_empty() {
        warn!(events = outcomes.len(), "No roll event resolved to an instrument");
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_data::{build_calendar, ChainEntry, InMemoryMarketData, WeekdayCalendar};
    use dr_options::{black_scholes_call, PricingInput};
    use dr_types::{ContractMonth, RollError};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn calendar() -> TradingCalendar {
        let range = DateRange::new(date(2022, 1, 1), date(2022, 6, 30)).unwrap();
        build_calendar(&WeekdayCalendar, range).unwrap()
    }

    fn event(roll_date: NaiveDate, ordinal: usize) -> RollEvent {
        let current = ContractMonth::of(roll_date);
        RollEvent {
            ordinal,
            roll_date,
            current_month: current,
            target_month: current.add_months(2),
            months_ahead: 2,
        }
    }

    fn chain(strikes: &[Decimal]) -> Vec<ChainEntry> {
        strikes.iter().map(|k| ChainEntry::new(*k)).collect()
    }

    fn market() -> InMemoryMarketData {
        let mar = ContractMonth::new(2022, 3).unwrap();
        InMemoryMarketData::new()
            .with_quote("HO", date(2022, 1, 3), dec!(2.50))
            .with_chain(
                "HO",
                mar,
                date(2022, 1, 3),
                chain(&[dec!(2.00), dec!(2.25), dec!(2.50), dec!(2.75), dec!(3.00), dec!(3.25), dec!(3.50)]),
            )
    }

    #[test]
    fn test_resolves_closest_delta_strike() {
        let data = market();
        let config = RollConfig::default();
        let resolver = DeltaTargetResolver::new(&config, &data, &data);

        let outcome = resolver.resolve(&event(date(2022, 1, 3), 0), &calendar()).unwrap();
        match outcome {
            RollOutcome::Resolved { instrument, breach } => {
                // Mar contract expires Feb 28; 41 trading days from Jan 3
                assert_eq!(instrument.contract.expiry_date, date(2022, 2, 28));
                assert!((instrument.years_to_expiry - 41.0 / 252.0).abs() < 1e-12);
                assert_eq!(instrument.contract.symbol.root, "OH");
                assert_eq!(instrument.contract.symbol.expiration, ContractMonth::new(2022, 3).unwrap());
                assert_eq!(instrument.contract.underlying_contract, "OHH2");
                assert_eq!(instrument.volatility, 0.30);
                assert!(instrument.delta > 0.0 && instrument.delta < 0.5);
                assert_eq!(instrument.trace.len(), 7);
                assert_eq!(instrument.within_tolerance, breach.is_none());
            }
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_quote_is_gap() {
        let data = market();
        let config = RollConfig::default();
        let resolver = DeltaTargetResolver::new(&config, &data, &data);

        let outcome = resolver.resolve(&event(date(2022, 1, 4), 0), &calendar()).unwrap();
        assert!(matches!(
            outcome,
            RollOutcome::Gap { gap: RollGap { reason: GapReason::MissingUnderlyingQuote, .. }, .. }
        ));
    }

    #[test]
    fn test_empty_chain_is_no_candidates_gap() {
        let data = market().with_quote("HO", date(2022, 2, 1), dec!(2.60));
        let config = RollConfig::default();
        let resolver = DeltaTargetResolver::new(&config, &data, &data);

        let outcome = resolver.resolve(&event(date(2022, 2, 1), 1), &calendar()).unwrap();
        match outcome {
            RollOutcome::Gap { gap, .. } => {
                assert_eq!(gap.reason, GapReason::NoCandidates);
                assert_eq!(gap.target_contract, "OHJ2");
            }
            other => panic!("expected gap, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_tolerance_policy() {
        let mar = ContractMonth::new(2022, 3).unwrap();
        // only deep ITM strikes: best delta far above 0.15
        let data = InMemoryMarketData::new()
            .with_quote("HO", date(2022, 1, 3), dec!(2.50))
            .with_chain("HO", mar, date(2022, 1, 3), chain(&[dec!(1.50), dec!(1.75)]));

        let accept = RollConfig::default();
        let outcome = DeltaTargetResolver::new(&accept, &data, &data)
            .resolve(&event(date(2022, 1, 3), 0), &calendar())
            .unwrap();
        match outcome {
            RollOutcome::Resolved { instrument, breach } => {
                assert!(!instrument.within_tolerance);
                let breach = breach.unwrap();
                assert!(breach.accepted);
                assert_eq!(breach.strike, dec!(1.75));
            }
            other => panic!("expected accepted resolution, got {other:?}"),
        }

        let reject = RollConfig::default().with_tolerance_action(ToleranceAction::Reject);
        let outcome = DeltaTargetResolver::new(&reject, &data, &data)
            .resolve(&event(date(2022, 1, 3), 0), &calendar())
            .unwrap();
        match outcome {
            RollOutcome::Gap { gap, breach } => {
                assert_eq!(gap.reason, GapReason::OutOfToleranceRejected);
                assert!(!breach.unwrap().accepted);
            }
            other => panic!("expected rejected gap, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_volatility_is_fatal_with_context() {
        let data = market();
        let mut config = RollConfig::default();
        config.volatility = 0.0;
        let resolver = DeltaTargetResolver::new(&config, &data, &data);

        let err = resolver.resolve(&event(date(2022, 1, 3), 0), &calendar()).unwrap_err();
        assert!(err.is_fatal());
        match err {
            RollError::Roll { roll_date, contract, source } => {
                assert_eq!(roll_date, date(2022, 1, 3));
                assert_eq!(contract, "OHH2");
                assert!(matches!(
                    *source,
                    RollError::InvalidInput(InputError::NonPositive { parameter: "volatility", .. })
                ));
            }
            other => panic!("expected roll context, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_all_keeps_ordinal_order() {
        let data = market();
        let config = RollConfig::default();
        let resolver = DeltaTargetResolver::new(&config, &data, &data);
        let events = vec![
            event(date(2022, 1, 3), 0),
            event(date(2022, 2, 1), 1),
            event(date(2022, 3, 1), 2),
        ];

        let sequential = resolve_all(&resolver, &events, &calendar(), false).unwrap();
        let parallel = resolve_all(&resolver, &events, &calendar(), true).unwrap();
        assert_eq!(sequential, parallel);
        let ordinals: Vec<_> = parallel.iter().map(|(e, _)| e.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert!(matches!(parallel[0].1, RollOutcome::Resolved { .. }));
    }

    fn resolved(outcome: RollOutcome) -> ResolvedInstrument {
        match outcome {
            RollOutcome::Resolved { instrument, .. } => instrument,
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn test_historical_volatility_source() {
        let cal = calendar();
        let roll = date(2022, 2, 1);
        let apr = ContractMonth::new(2022, 4).unwrap();
        let days = cal.between(date(2022, 1, 3), roll);
        let closes: Vec<Decimal> = (0..days.len())
            .map(|i| if i % 3 == 0 { dec!(2.50) } else { dec!(2.53) + Decimal::new(i as i64, 3) })
            .collect();
        let mut data = InMemoryMarketData::new().with_chain(
            "HO",
            apr,
            roll,
            chain(&[dec!(2.50), dec!(2.75), dec!(3.00), dec!(3.25), dec!(3.50)]),
        );
        for (day, close) in days.iter().zip(&closes) {
            data.insert_quote("HO", *day, *close);
        }

        let config = RollConfig::default().with_volatility_source(VolatilitySource::Historical { window_days: 10 });
        let resolver = DeltaTargetResolver::new(&config, &data, &data);
        let instrument = resolved(resolver.resolve(&event(roll, 0), &cal).unwrap());

        let expected = historical_volatility(&closes[closes.len() - 10..]).unwrap();
        assert!((instrument.volatility - expected).abs() < 1e-12);
        assert_ne!(instrument.volatility, 0.30);
        assert!(instrument.trace.iter().all(|t| t.volatility == expected));
    }

    #[test]
    fn test_historical_volatility_falls_back_without_quotes() {
        // only the roll-date quote exists
        let data = market();
        let config = RollConfig::default().with_volatility_source(VolatilitySource::Historical { window_days: 30 });
        let resolver = DeltaTargetResolver::new(&config, &data, &data);
        let instrument = resolved(resolver.resolve(&event(date(2022, 1, 3), 0), &calendar()).unwrap());
        assert_eq!(instrument.volatility, 0.30);
    }

    #[test]
    fn test_implied_volatility_source() {
        let mar = ContractMonth::new(2022, 3).unwrap();
        let roll = date(2022, 1, 3);
        let atm = OptionSymbol::call("OH", mar, dec!(2.50)).unwrap();
        let settlement = black_scholes_call(
            dec!(2.50),
            &PricingInput {
                spot: 2.50,
                risk_free_rate: 0.05,
                volatility: 0.45,
                time_to_expiry: 41.0 / 252.0,
            },
        )
        .unwrap()
        .price;
        let data = market().with_price(&atm, roll, settlement);
        let config = RollConfig::default().with_volatility_source(VolatilitySource::Implied);

        let instrument = resolved(
            DeltaTargetResolver::new(&config, &data, &data)
                .with_history(&data)
                .resolve(&event(roll, 0), &calendar())
                .unwrap(),
        );
        assert!((instrument.volatility - 0.45).abs() < 1e-6, "vol = {}", instrument.volatility);

        // no settlement source: fixed volatility
        let instrument = resolved(
            DeltaTargetResolver::new(&config, &data, &data)
                .resolve(&event(roll, 0), &calendar())
                .unwrap(),
        );
        assert_eq!(instrument.volatility, 0.30);
    }
}
