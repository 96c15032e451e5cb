pub mod esis;
pub mod executor;

pub use esis::*;
pub use executor::*;
