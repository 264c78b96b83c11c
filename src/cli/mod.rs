//! CLI command implementations

pub mod clean;
pub mod ingest;
pub mod process;
pub mod stats;
pub mod zone;
