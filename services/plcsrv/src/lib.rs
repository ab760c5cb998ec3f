//! Curing press acquisition service
//!
//! Keeps the Modbus link to the press controller up and posts one reading
//! per acquisition period to the backend.

pub mod bootstrap;
pub mod config;
pub mod ingest;

pub use config::PlcsrvConfig;
pub use ingest::HttpReadingSink;
