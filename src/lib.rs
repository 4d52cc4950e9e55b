//! Souq Locator: adaptive location acquisition and address resolution
//! for the Souq marketplace front end.

pub mod config;
pub mod error;
pub mod location;
pub mod server;
pub mod telemetry;
