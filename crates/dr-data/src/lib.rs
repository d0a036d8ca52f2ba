pub mod cache;
pub mod calendar;
pub mod providers;
pub mod sample;

pub use cache::*;
pub use calendar::*;
pub use providers::*;
pub use sample::*;
