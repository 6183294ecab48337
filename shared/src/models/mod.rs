//! Domain models for the Marketplace Platform

pub mod delivery;
pub mod notification;
pub mod order;

pub use delivery::*;
pub use notification::*;
pub use order::*;
