//! Curing recipe scheduler service
//!
//! Activates scheduled recipes when they fall due and offers manual
//! activation and audit history for operational tooling.

pub mod bootstrap;
pub mod config;
pub mod runtime;

pub use config::RecipesrvConfig;
pub use runtime::Runtime;
