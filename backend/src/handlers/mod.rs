//! HTTP handlers for the Marketplace Platform

use axum::Json;
use serde::Serialize;

pub mod courier;
pub mod delivery;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod payments;

pub use courier::*;
pub use delivery::*;
pub use health::*;
pub use notifications::*;
pub use orders::*;
pub use payments::*;

/// Success envelope: `{success: true, data, message?}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            message: None,
        })
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            message: Some(message.into()),
        })
    }
}
