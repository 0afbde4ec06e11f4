pub mod beid;
pub mod config;
pub mod error;
pub mod telemetry;
