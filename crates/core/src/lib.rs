pub mod alert;
pub mod config;
pub mod device;
pub mod error;
pub mod rule;
pub mod schedule;
pub mod store;

pub use alert::*;
pub use config::Config;
pub use device::*;
pub use error::*;
pub use rule::*;
pub use schedule::*;
pub use store::*;
