//! Shared domain types for the Marketplace Platform
//!
//! This crate contains the domain vocabulary used across the backend:
//! order lifecycle enums, the status-history value object, frozen
//! purchase-time snapshots, and validation helpers.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
