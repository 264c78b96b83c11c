pub mod capture;
pub mod cli;
pub mod collab;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod processor;
pub mod strategy;
pub mod zones;

pub use config::Config;
pub use error::{Error, Result};
pub use processor::{PhasedProcessor, RunOutcome};
