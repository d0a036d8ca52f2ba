use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use dr_options::CandidateStrike;
use dr_types::{ContractMonth, DataError, DataResult, DateRange, OptionSymbol, RollResult, UnderlyingQuote};

/// Source of trading days (exchange calendar).
pub trait CalendarProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Trading days in `[start, end]`, ascending.
    fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> DataResult<Vec<NaiveDate>>;
}

/// Source of front-month underlying settlement prices.
pub trait QuoteProvider: Send + Sync + fmt::Debug {
    /// Price for `root` on `date`, or [`DataError::NotAvailable`].
    fn quote(&self, root: &str, date: NaiveDate) -> DataResult<Decimal>;
}

/// Source of listed call strikes.
pub trait ChainProvider: Send + Sync + fmt::Debug {
    /// Strikes listed for the `expiration` series of `root` on `date`.
    ///
    /// An empty vector means nothing was listed.
    fn chain(&self, root: &str, expiration: ContractMonth, date: NaiveDate) -> DataResult<Vec<ChainEntry>>;
}

/// Source of daily option settlement prices.
pub trait HistoryProvider: Send + Sync + fmt::Debug {
    /// Prices for `symbol` on the dates in `range` where it traded.
    fn history(&self, symbol: &OptionSymbol, range: DateRange) -> DataResult<BTreeMap<NaiveDate, Decimal>>;
}

/// One strike of a listed chain as reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub strike: Decimal,
    /// Whether the series traded on the requested date.
    #[serde(default = "default_traded")]
    pub traded: bool,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
}

fn default_traded() -> bool {
    true
}

impl ChainEntry {
    pub fn new(strike: Decimal) -> Self {
        Self {
            strike,
            traded: true,
            implied_volatility: None,
        }
    }

    pub fn with_implied_volatility(mut self, volatility: f64) -> Self {
        self.implied_volatility = Some(volatility);
        self
    }

    pub fn not_traded(mut self) -> Self {
        self.traded = false;
        self
    }
}

impl From<ChainEntry> for CandidateStrike {
    fn from(entry: ChainEntry) -> Self {
        CandidateStrike {
            strike: entry.strike,
            available: entry.traded,
            implied_volatility: entry.implied_volatility,
        }
    }
}

/// The four collaborators a run needs, shared across worker threads.
#[derive(Debug, Clone)]
pub struct MarketDataProviders {
    pub calendar: Arc<dyn CalendarProvider>,
    pub quotes: Arc<dyn QuoteProvider>,
    pub chains: Arc<dyn ChainProvider>,
    pub history: Arc<dyn HistoryProvider>,
}

impl MarketDataProviders {
    /// Use one source for everything.
    pub fn from_source<P>(source: Arc<P>) -> Self
    where
        P: CalendarProvider + QuoteProvider + ChainProvider + HistoryProvider + 'static,
    {
        Self {
            calendar: source.clone(),
            quotes: source.clone(),
            chains: source.clone(),
            history: source,
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarProvider>) -> Self {
        self.calendar = calendar;
        self
    }
}

// ---------- JSON document ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuoteRecord {
    root: String,
    date: NaiveDate,
    price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainRecord {
    root: String,
    expiration: ContractMonth,
    date: NaiveDate,
    strikes: Vec<ChainEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PriceRecord {
    symbol: String,
    date: NaiveDate,
    price: Decimal,
}

/// On-disk layout accepted by [`InMemoryMarketData::from_json_file`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct MarketDataDocument {
    holidays: Vec<NaiveDate>,
    quotes: Vec<QuoteRecord>,
    chains: Vec<ChainRecord>,
    prices: Vec<PriceRecord>,
}

// ---------- in-memory provider ----------

type ChainKey = (String, ContractMonth, NaiveDate);

/// Market data held in memory, populated by builder calls or a JSON file.
///
/// Its calendar is every weekday except the registered holidays.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    holidays: BTreeSet<NaiveDate>,
    quotes: HashMap<String, BTreeMap<NaiveDate, Decimal>>,
    chains: HashMap<ChainKey, Vec<ChainEntry>>,
    prices: HashMap<String, BTreeMap<NaiveDate, Decimal>>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a document of `holidays`, `quotes`, `chains` and `prices`.
    ///
    /// Option symbols are validated against the symbol grammar.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> RollResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::SourceNotFound(path.to_string_lossy().to_string()).into());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> RollResult<Self> {
        let doc: MarketDataDocument = serde_json::from_str(contents).map_err(|e| DataError::ParseError {
            message: format!("market data document: {e}"),
        })?;

        let mut data = Self::new();
        for day in doc.holidays {
            data.insert_holiday(day);
        }
        for q in doc.quotes {
            data.insert_quote(&q.root, q.date, q.price);
        }
        for c in doc.chains {
            data.insert_chain(&c.root, c.expiration, c.date, c.strikes);
        }
        for p in doc.prices {
            let symbol = OptionSymbol::parse(&p.symbol, p.date.year())?;
            data.insert_price(&symbol, p.date, p.price);
        }
        Ok(data)
    }

    pub fn insert_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn insert_quote(&mut self, root: &str, date: NaiveDate, price: Decimal) {
        self.quotes.entry(root.to_string()).or_default().insert(date, price);
    }

    pub fn insert_chain(&mut self, root: &str, expiration: ContractMonth, date: NaiveDate, strikes: Vec<ChainEntry>) {
        self.chains.insert((root.to_string(), expiration, date), strikes);
    }

    pub fn insert_price(&mut self, symbol: &OptionSymbol, date: NaiveDate, price: Decimal) {
        self.prices.entry(symbol.to_string()).or_default().insert(date, price);
    }

    pub fn with_holiday(mut self, date: NaiveDate) -> Self {
        self.insert_holiday(date);
        self
    }

    pub fn with_quote(mut self, root: &str, date: NaiveDate, price: Decimal) -> Self {
        self.insert_quote(root, date, price);
        self
    }

    pub fn with_quotes<I>(mut self, root: &str, quotes: I) -> Self
    where
        I: IntoIterator<Item = UnderlyingQuote>,
    {
        for quote in quotes {
            self.insert_quote(root, quote.date, quote.price);
        }
        self
    }

    pub fn with_chain(mut self, root: &str, expiration: ContractMonth, date: NaiveDate, strikes: Vec<ChainEntry>) -> Self {
        self.insert_chain(root, expiration, date, strikes);
        self
    }

    pub fn with_price(mut self, symbol: &OptionSymbol, date: NaiveDate, price: Decimal) -> Self {
        self.insert_price(symbol, date, price);
        self
    }

    /// Number of (symbol, date) option prices held.
    pub fn price_count(&self) -> usize {
        self.prices.values().map(BTreeMap::len).sum()
    }
}

impl CalendarProvider for InMemoryMarketData {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> DataResult<Vec<NaiveDate>> {
        Ok(start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .filter(|d| !self.holidays.contains(d))
            .collect())
    }
}

impl QuoteProvider for InMemoryMarketData {
    fn quote(&self, root: &str, date: NaiveDate) -> DataResult<Decimal> {
        self.quotes
            .get(root)
            .and_then(|series| series.get(&date))
            .copied()
            .ok_or_else(|| DataError::not_available(format!("{root} quote on {date}")))
    }
}

impl ChainProvider for InMemoryMarketData {
    fn chain(&self, root: &str, expiration: ContractMonth, date: NaiveDate) -> DataResult<Vec<ChainEntry>> {
        Ok(self
            .chains
            .get(&(root.to_string(), expiration, date))
            .cloned()
            .unwrap_or_default())
    }
}

impl HistoryProvider for InMemoryMarketData {
    fn history(&self, symbol: &OptionSymbol, range: DateRange) -> DataResult<BTreeMap<NaiveDate, Decimal>> {
        Ok(self
            .prices
            .get(&symbol.to_string())
            .map(|series| {
                series
                    .range(range.start..=range.end)
                    .map(|(d, p)| (*d, *p))
                    .collect()
            })
            .unwrap_or_default())
    }
}
