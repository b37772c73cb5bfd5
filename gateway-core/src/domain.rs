//! Core entities persisted by the gateway: [`Provider`], [`Route`],
//! [`RouteNode`], and the [`SchedulingKey`] the routing engine uses to pick
//! a fair rotation point. See `gateway-core::store` for persistence and
//! `gateway-core::routing` for selection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Unknown,
    Online,
    Degraded,
    Timeout,
    Unreachable,
    Error,
}

/// One upstream account (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Encrypted blob, see `crate::crypto`.
    pub api_key_opaque: String,
    pub models: Vec<String>,
    pub is_active: bool,
    pub status: ProviderStatus,
    pub latency_ms: Option<i64>,
    pub last_tested_at: Option<chrono::DateTime<chrono::Utc>>,
    pub consecutive_failures: i64,
    pub is_healthy: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Provider {
    /// Trailing-slash-normalised base URL (§4.G).
    pub fn normalised_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    Auto,
    Specific,
    Multi,
}

/// A named policy for selecting a provider+model (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub name: String,
    pub mode: RouteMode,
    pub is_active: bool,
    /// Recognised keys: `providerMode` (`"all"` | `"provider_<id>"`),
    /// `selectedModels` (sequence of model identifiers).
    pub config: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Route {
    pub fn selected_models(&self) -> Vec<String> {
        self.config
            .get("selectedModels")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn provider_mode(&self) -> String {
        self.config
            .get("providerMode")
            .and_then(|v| v.as_str())
            .unwrap_or("all")
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStrategy {
    RoundRobin,
    Failover,
}

/// One member of a route (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteNode {
    pub id: String,
    pub route_id: String,
    pub api_id: String,
    /// Empty means "inherit provider's models".
    pub models: Vec<String>,
    pub strategy: NodeStrategy,
    pub priority: i32,
    pub metadata: serde_json::Value,
}

/// A route with its nodes resolved to their providers, fetched in one
/// round trip (§4.B).
#[derive(Debug, Clone)]
pub struct RouteWithNodes {
    pub route: Route,
    pub nodes: Vec<(RouteNode, Provider)>,
}

/// Key into the round-robin cursor map. `"providers"` is the secondary
/// provider-level rotation `auto` + `providerMode=all` applies on top of
/// node-level rotation (§4.E).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchedulingKey(pub String, pub &'static str);

impl SchedulingKey {
    pub fn nodes(route_id: &str) -> Self {
        Self(route_id.to_string(), "nodes")
    }

    pub fn providers(route_id: &str) -> Self {
        Self(route_id.to_string(), "providers")
    }
}
