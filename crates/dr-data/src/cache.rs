use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use dr_types::{ContractMonth, DataError, DataResult, DateRange, OptionSymbol};

use crate::providers::{CalendarProvider, ChainEntry, ChainProvider, HistoryProvider, QuoteProvider};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuoteKey {
    root: String,
    date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChainKey {
    root: String,
    expiration: ContractMonth,
    date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HistoryKey {
    symbol: String,
    range: DateRange,
}

/// Memoizing wrapper around a market data source.
///
/// Answers and `NotAvailable` outcomes are cached; provider failures are not,
/// so a later call can still succeed.
#[derive(Debug)]
pub struct CachedMarketData<P> {
    inner: P,
    quotes: DashMap<QuoteKey, Option<Decimal>>,
    chains: DashMap<ChainKey, Vec<ChainEntry>>,
    histories: DashMap<HistoryKey, BTreeMap<NaiveDate, Decimal>>,
    stats: RwLock<CacheStats>,
}

impl<P> CachedMarketData<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            quotes: DashMap::new(),
            chains: DashMap::new(),
            histories: DashMap::new(),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn clear(&self) {
        self.quotes.clear();
        self.chains.clear();
        self.histories.clear();

        // Reset stats
        {
            let mut stats = self.stats.write();
            *stats = CacheStats::default();
        }
    }

    pub fn get_stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    pub fn len(&self) -> usize {
        self.quotes.len() + self.chains.len() + self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hit(&self) {
        self.stats.write().hits += 1;
    }

    fn miss(&self) {
        self.stats.write().misses += 1;
    }

    fn stored(&self) {
        self.stats.write().stores += 1;
    }
}

impl<P: CalendarProvider> CalendarProvider for CachedMarketData<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> DataResult<Vec<NaiveDate>> {
        self.inner.trading_days_between(start, end)
    }
}

impl<P: QuoteProvider> QuoteProvider for CachedMarketData<P> {
    fn quote(&self, root: &str, date: NaiveDate) -> DataResult<Decimal> {
        let key = QuoteKey {
            root: root.to_string(),
            date,
        };
        if let Some(entry) = self.quotes.get(&key) {
            self.hit();
            return (*entry.value()).ok_or_else(|| DataError::not_available(format!("{root} quote on {date}")));
        }

        self.miss();
        let fetched = match self.inner.quote(root, date) {
            Ok(price) => Some(price),
            Err(DataError::NotAvailable { .. }) => None,
            Err(e) => return Err(e),
        };
        self.quotes.insert(key, fetched);
        self.stored();
        fetched.ok_or_else(|| DataError::not_available(format!("{root} quote on {date}")))
    }
}

impl<P: ChainProvider> ChainProvider for CachedMarketData<P> {
    fn chain(&self, root: &str, expiration: ContractMonth, date: NaiveDate) -> DataResult<Vec<ChainEntry>> {
        let key = ChainKey {
            root: root.to_string(),
            expiration,
            date,
        };
        if let Some(entry) = self.chains.get(&key) {
            self.hit();
            return Ok(entry.value().clone());
        }

        self.miss();
        let chain = self.inner.chain(root, expiration, date)?;
        self.chains.insert(key, chain.clone());
        self.stored();
        Ok(chain)
    }
}

impl<P: HistoryProvider> HistoryProvider for CachedMarketData<P> {
    fn history(&self, symbol: &OptionSymbol, range: DateRange) -> DataResult<BTreeMap<NaiveDate, Decimal>> {
        let key = HistoryKey {
            symbol: symbol.to_string(),
            range,
        };
        if let Some(entry) = self.histories.get(&key) {
            self.hit();
            return Ok(entry.value().clone());
        }

        self.miss();
        let history = self.inner.history(symbol, range)?;
        {
            let mut stats = self.stats.write();
            stats.stores += 1;
            stats.total_prices_cached += history.len() as u64;
        }
        self.histories.insert(key, history.clone());
        Ok(history)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub total_prices_cached: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
