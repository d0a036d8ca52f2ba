pub mod calendar;
pub mod config;
pub mod errors;
pub mod market;
pub mod roll;

pub use calendar::*;
pub use config::*;
pub use errors::*;
pub use market::*;
pub use roll::*;
