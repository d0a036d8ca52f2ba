use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for the DeltaRoll system
#[derive(Error, Debug)]
pub enum RollError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Roll on {roll_date} targeting {contract} failed: {source}")]
    Roll {
        roll_date: NaiveDate,
        contract: String,
        #[source]
        source: Box<RollError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RollError {
    /// Wrap an error with the roll it happened on.
    pub fn in_roll(self, roll_date: NaiveDate, contract: impl Into<String>) -> Self {
        RollError::Roll {
            roll_date,
            contract: contract.into(),
            source: Box::new(self),
        }
    }

    /// Fatal errors abort a run; everything else is recoverable per roll month.
    pub fn is_fatal(&self) -> bool {
        match self {
            RollError::InvalidInput(_)
            | RollError::Config(_)
            | RollError::Internal(_)
            | RollError::Io(_)
            | RollError::Serialization(_) => true,
            RollError::Data(_) | RollError::Selection(_) => false,
            RollError::Roll { source, .. } => source.is_fatal(),
        }
    }
}

/// Malformed or out-of-domain inputs. Always fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("{parameter} must be positive, got {value}")]
    NonPositive { parameter: &'static str, value: f64 },

    #[error("{parameter} = {value} outside [{min}, {max}]")]
    OutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Malformed symbol {symbol:?}: {reason}")]
    MalformedSymbol { symbol: String, reason: String },

    #[error("Invalid month: {month}")]
    InvalidMonth { month: u32 },

    #[error("Calendar error: {message}")]
    Calendar { message: String },

    #[error("{message}")]
    Invalid { message: String },
}

/// Data-related errors raised by market data collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Data not available: {what}")]
    NotAvailable { what: String },

    #[error("Data source not found: {0}")]
    SourceNotFound(String),

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },
}

impl DataError {
    pub fn not_available(what: impl Into<String>) -> Self {
        DataError::NotAvailable { what: what.into() }
    }
}

/// Strike-selection outcomes that are reported rather than fatal
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("No candidate strikes for {root} {contract} on {date}")]
    NoCandidates {
        root: String,
        contract: String,
        date: NaiveDate,
    },

    #[error(
        "Best delta {delta:.4} at strike {strike} is {distance:.4} from target {target:.2} (tolerance {tolerance:.4})"
    )]
    OutOfTolerance {
        strike: rust_decimal::Decimal,
        delta: f64,
        distance: f64,
        target: f64,
        tolerance: f64,
    },
}

/// Result type alias for DeltaRoll operations
pub type RollResult<T> = Result<T, RollError>;

/// Result type alias for market data collaborators
pub type DataResult<T> = Result<T, DataError>;

/// Macro for creating invalid-input errors
#[macro_export]
macro_rules! invalid_input {
    ($($arg:tt)*) => {
        $crate::RollError::InvalidInput($crate::InputError::Invalid {
            message: format!($($arg)*),
        })
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::RollError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::RollError::Config(format!($($arg)*))
    };
}
