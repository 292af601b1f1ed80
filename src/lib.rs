pub mod config;
pub mod error;
pub mod fetch;
pub mod insurance;
pub mod logging;
pub mod migration;
pub mod storms;

pub use config::Config;
pub use error::{Dropped, NormalizeError, Normalized};
