pub mod chrome;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod harvest;
pub mod output;
pub mod run_log;
pub mod timeouts;
pub mod utils;

pub use config::Config;
pub use error::HarvestError;

pub type Result<T> = std::result::Result<T, HarvestError>;
