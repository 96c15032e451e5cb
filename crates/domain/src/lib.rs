pub mod entities;
pub mod ports;
pub mod repositories;
pub mod value_objects;

pub use broker_core::{BrokerError, BrokerResult};
pub use entities::*;
pub use ports::*;
pub use repositories::*;
pub use value_objects::*;
