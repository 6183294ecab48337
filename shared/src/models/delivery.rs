//! Delivery agent models

use serde::{Deserialize, Serialize};

/// Working status of a delivery agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    OnDelivery,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Available => "available",
            AgentStatus::OnDelivery => "on_delivery",
            AgentStatus::Offline => "offline",
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(AgentStatus::Available),
            "on_delivery" => Ok(AgentStatus::OnDelivery),
            "offline" => Ok(AgentStatus::Offline),
            _ => Err("unknown agent status"),
        }
    }
}
