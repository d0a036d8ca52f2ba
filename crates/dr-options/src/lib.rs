pub mod chain;
pub mod contract;
pub mod pricing;
pub mod volatility;

pub use chain::*;
pub use contract::*;
pub use pricing::*;
pub use volatility::*;
