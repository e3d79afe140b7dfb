use serde::{Deserialize, Serialize};

/// Failover order for a country. Lower `priority` is preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPriority {
    pub country_id: i64,
    pub gateway_name: String,
    pub priority: i32,
    pub is_active: bool,
}
