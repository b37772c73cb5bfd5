//! Routing engine (§4.E): resolves a route into a concrete
//! `(Provider, model)` pair, rotating fairly across candidates with a
//! process-wide cursor map.

use crate::domain::{Provider, RouteMode, RouteWithNodes, SchedulingKey};
use crate::error::GatewayError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct RoutingEngine {
    cursors: DashMap<SchedulingKey, AtomicUsize>,
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingEngine {
    pub fn new() -> Self {
        Self {
            cursors: DashMap::new(),
        }
    }

    /// Advances the cursor at `key` and returns an index into a candidate
    /// set of size `len` (§4.E round-robin semantics).
    fn next_index(&self, key: SchedulingKey, len: usize) -> usize {
        let cursor = self
            .cursors
            .entry(key)
            .or_insert_with(|| AtomicUsize::new(0));
        cursor.fetch_add(1, Ordering::SeqCst) % len
    }

    /// Drops all cursors belonging to a deleted route.
    pub fn clear_route(&self, route_id: &str) {
        self.cursors.retain(|k, _| k.0 != route_id);
    }

    /// Snapshots the scheduling cursors belonging to one route, keyed by
    /// scheduling-key kind (`"nodes"` / `"providers"`) — used by the
    /// `/api/model-routes/{id}/state` observability endpoint (§6).
    pub fn state_for_route(&self, route_id: &str) -> std::collections::HashMap<String, usize> {
        self.cursors
            .iter()
            .filter(|entry| entry.key().0 == route_id)
            .map(|entry| (entry.key().1.to_string(), entry.value().load(Ordering::SeqCst)))
            .collect()
    }

    pub fn select(
        &self,
        rwn: &RouteWithNodes,
        all_providers: &[Provider],
        model_hint: Option<&str>,
    ) -> Result<(Provider, String), GatewayError> {
        if !rwn.route.is_active {
            return Err(GatewayError::RouteInactive {
                route: rwn.route.name.clone(),
            });
        }
        match rwn.route.mode {
            RouteMode::Auto => self.select_auto(rwn, all_providers, model_hint),
            RouteMode::Specific => self.select_specific(rwn, model_hint),
            RouteMode::Multi => self.select_multi(rwn, model_hint),
        }
    }

    fn select_auto(
        &self,
        rwn: &RouteWithNodes,
        all_providers: &[Provider],
        model_hint: Option<&str>,
    ) -> Result<(Provider, String), GatewayError> {
        let selected_models = rwn.route.selected_models();

        if !selected_models.is_empty() {
            return self.select_auto_with_config(rwn, all_providers, &selected_models, model_hint);
        }

        if rwn.nodes.is_empty() {
            return Err(GatewayError::RouteServiceError {
                message: format!(
                    "route '{}' has no configured nodes and no models in config",
                    rwn.route.name
                ),
            });
        }

        let active_nodes: Vec<_> = rwn
            .nodes
            .iter()
            .filter(|(_, p)| p.is_active && p.is_healthy)
            .collect();
        if active_nodes.is_empty() {
            return Err(GatewayError::NoActiveProvider {
                route: rwn.route.name.clone(),
            });
        }

        let idx = self.next_index(SchedulingKey::nodes(&rwn.route.id), active_nodes.len());
        let (node, provider) = active_nodes[idx];
        pick_model_from_node(node, provider, model_hint)
    }

    fn select_auto_with_config(
        &self,
        rwn: &RouteWithNodes,
        all_providers: &[Provider],
        selected_models: &[String],
        model_hint: Option<&str>,
    ) -> Result<(Provider, String), GatewayError> {
        let provider_mode = rwn.route.provider_mode();

        let selected = if provider_mode == "all" {
            let active: Vec<&Provider> = all_providers
                .iter()
                .filter(|p| p.is_active && p.is_healthy)
                .collect();
            if active.is_empty() {
                return Err(GatewayError::NoActiveProvider {
                    route: rwn.route.name.clone(),
                });
            }
            let idx = self.next_index(SchedulingKey::providers(&rwn.route.id), active.len());
            active[idx].clone()
        } else {
            let provider_id = provider_mode
                .strip_prefix("provider_")
                .unwrap_or(&provider_mode);
            let provider = all_providers.iter().find(|p| p.id == provider_id);
            match provider {
                Some(p) if p.is_active && p.is_healthy => p.clone(),
                _ => {
                    return Err(GatewayError::RouteServiceError {
                        message: format!(
                            "provider {provider_id} is not active or healthy in route '{}'",
                            rwn.route.name
                        ),
                    })
                }
            }
        };

        if selected.models.is_empty() && selected_models.is_empty() {
            return Err(GatewayError::NoModelsAvailable {
                route: rwn.route.name.clone(),
            });
        }

        // §4.E step 4: a hint outside the candidate set is ignored, not an
        // error — fall back to the configured/first model instead.
        let model = match model_hint {
            Some(hint) if selected.models.iter().any(|m| m == hint) => hint.to_string(),
            _ => selected_models
                .first()
                .cloned()
                .unwrap_or_else(|| selected.models[0].clone()),
        };

        Ok((selected, model))
    }

    fn select_specific(
        &self,
        rwn: &RouteWithNodes,
        model_hint: Option<&str>,
    ) -> Result<(Provider, String), GatewayError> {
        let Some((node, provider)) = rwn.nodes.first() else {
            return Err(GatewayError::RouteServiceError {
                message: format!("route '{}' has no configured nodes", rwn.route.name),
            });
        };

        if !(provider.is_active && provider.is_healthy) {
            return Err(GatewayError::RouteServiceError {
                message: format!(
                    "provider for route '{}' is not active or healthy",
                    rwn.route.name
                ),
            });
        }

        let mut candidates = if !node.models.is_empty() {
            node.models.clone()
        } else {
            provider.models.clone()
        };

        let selected_models = rwn.route.selected_models();
        if !selected_models.is_empty() {
            candidates.retain(|m| selected_models.contains(m));
        }

        if candidates.is_empty() {
            return Err(GatewayError::NoModelsAvailable {
                route: rwn.route.name.clone(),
            });
        }

        let model = match model_hint {
            Some(hint) if candidates.iter().any(|m| m == hint) => hint.to_string(),
            _ => candidates[0].clone(),
        };

        Ok((provider.clone(), model))
    }

    fn select_multi(
        &self,
        rwn: &RouteWithNodes,
        model_hint: Option<&str>,
    ) -> Result<(Provider, String), GatewayError> {
        let mut active_nodes: Vec<_> = rwn
            .nodes
            .iter()
            .filter(|(_, p)| p.is_active && p.is_healthy)
            .collect();
        active_nodes.sort_by(|(a, _), (b, _)| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

        if active_nodes.is_empty() {
            return Err(GatewayError::NoActiveProvider {
                route: rwn.route.name.clone(),
            });
        }

        for (node, provider) in &active_nodes {
            let own_candidates = if !node.models.is_empty() {
                node.models.clone()
            } else {
                provider.models.clone()
            };

            if let Some(hint) = model_hint {
                let union_has_hint = node
                    .models
                    .iter()
                    .chain(provider.models.iter())
                    .any(|m| m == hint);
                if !union_has_hint {
                    continue;
                }
            }

            use crate::domain::NodeStrategy;
            if matches!(node.strategy, NodeStrategy::RoundRobin) {
                // Single-element candidate set: this only advances the
                // cursor for fairness bookkeeping, the outcome is fixed.
                self.next_index(SchedulingKey::nodes(&rwn.route.id), 1);
            }

            if own_candidates.is_empty() {
                continue;
            }

            let model = match model_hint {
                Some(hint) if own_candidates.iter().any(|m| m == hint) => hint.to_string(),
                Some(_) => own_candidates[0].clone(),
                None => own_candidates[0].clone(),
            };
            return Ok(((*provider).clone(), model));
        }

        if let Some(hint) = model_hint {
            Err(GatewayError::ModelNotFound {
                route: rwn.route.name.clone(),
                model: hint.to_string(),
            })
        } else {
            Err(GatewayError::NoActiveProvider {
                route: rwn.route.name.clone(),
            })
        }
    }
}

fn pick_model_from_node(
    node: &crate::domain::RouteNode,
    provider: &Provider,
    model_hint: Option<&str>,
) -> Result<(Provider, String), GatewayError> {
    let candidates = if !node.models.is_empty() {
        &node.models
    } else {
        &provider.models
    };

    if candidates.is_empty() {
        return Err(GatewayError::NoModelsAvailable {
            route: node.route_id.clone(),
        });
    }

    let model = match model_hint {
        Some(hint) if candidates.iter().any(|m| m == hint) => hint.to_string(),
        _ => candidates[0].clone(),
    };

    Ok((provider.clone(), model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeStrategy, Route, RouteNode};
    use chrono::Utc;

    fn provider(id: &str, healthy: bool, models: &[&str]) -> Provider {
        Provider {
            id: id.to_string(),
            name: format!("provider-{id}"),
            base_url: "https://api.example.com".to_string(),
            api_key_opaque: "token".to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            is_active: true,
            status: crate::domain::ProviderStatus::Online,
            latency_ms: Some(10),
            last_tested_at: Some(Utc::now()),
            consecutive_failures: 0,
            is_healthy: healthy,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn node(id: &str, route_id: &str, priority: i32, strategy: NodeStrategy) -> RouteNode {
        RouteNode {
            id: id.to_string(),
            route_id: route_id.to_string(),
            api_id: id.to_string(),
            models: vec![],
            strategy,
            priority,
            metadata: serde_json::json!({}),
        }
    }

    fn route(mode: RouteMode, config: serde_json::Value) -> Route {
        Route {
            id: "route-1".to_string(),
            name: "chat".to_string(),
            mode,
            is_active: true,
            config,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn auto_mode_round_robins_across_active_healthy_nodes() {
        let engine = RoutingEngine::new();
        let p1 = provider("1", true, &["gpt-a"]);
        let p2 = provider("2", true, &["gpt-b"]);
        let rwn = RouteWithNodes {
            route: route(RouteMode::Auto, serde_json::json!({})),
            nodes: vec![
                (node("n1", "route-1", 0, NodeStrategy::RoundRobin), p1.clone()),
                (node("n2", "route-1", 0, NodeStrategy::RoundRobin), p2.clone()),
            ],
        };

        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let (p, _) = engine.select(&rwn, &[], None).unwrap();
            seen.insert(p.id);
        }
        assert_eq!(seen.len(), 2, "round robin must visit both distinct nodes");
    }

    #[test]
    fn auto_mode_skips_unhealthy_providers() {
        let engine = RoutingEngine::new();
        let healthy = provider("1", true, &["gpt-a"]);
        let unhealthy = provider("2", false, &["gpt-b"]);
        let rwn = RouteWithNodes {
            route: route(RouteMode::Auto, serde_json::json!({})),
            nodes: vec![
                (node("n1", "route-1", 0, NodeStrategy::RoundRobin), healthy),
                (node("n2", "route-1", 0, NodeStrategy::RoundRobin), unhealthy),
            ],
        };

        for _ in 0..3 {
            let (p, _) = engine.select(&rwn, &[], None).unwrap();
            assert_eq!(p.id, "1");
        }
    }

    #[test]
    fn auto_mode_with_no_active_provider_errors() {
        let engine = RoutingEngine::new();
        let unhealthy = provider("1", false, &["gpt-a"]);
        let rwn = RouteWithNodes {
            route: route(RouteMode::Auto, serde_json::json!({})),
            nodes: vec![(node("n1", "route-1", 0, NodeStrategy::RoundRobin), unhealthy)],
        };
        assert!(matches!(
            engine.select(&rwn, &[], None),
            Err(GatewayError::NoActiveProvider { .. })
        ));
    }

    #[test]
    fn specific_mode_uses_first_node_and_honours_model_hint() {
        let engine = RoutingEngine::new();
        let p = provider("1", true, &["gpt-a", "gpt-b"]);
        let rwn = RouteWithNodes {
            route: route(RouteMode::Specific, serde_json::json!({})),
            nodes: vec![(node("n1", "route-1", 0, NodeStrategy::Failover), p)],
        };
        let (_, model) = engine.select(&rwn, &[], Some("gpt-b")).unwrap();
        assert_eq!(model, "gpt-b");
    }

    #[test]
    fn specific_mode_falls_back_to_first_candidate_on_unknown_hint() {
        let engine = RoutingEngine::new();
        let p = provider("1", true, &["gpt-a"]);
        let rwn = RouteWithNodes {
            route: route(RouteMode::Specific, serde_json::json!({})),
            nodes: vec![(node("n1", "route-1", 0, NodeStrategy::Failover), p)],
        };
        let (_, model) = engine.select(&rwn, &[], Some("unknown-model")).unwrap();
        assert_eq!(model, "gpt-a");
    }

    #[test]
    fn multi_mode_prefers_lowest_priority_node() {
        let engine = RoutingEngine::new();
        let p1 = provider("1", true, &["gpt-a"]);
        let p2 = provider("2", true, &["gpt-b"]);
        let rwn = RouteWithNodes {
            route: route(RouteMode::Multi, serde_json::json!({})),
            nodes: vec![
                (node("n2", "route-1", 5, NodeStrategy::Failover), p2),
                (node("n1", "route-1", 1, NodeStrategy::Failover), p1),
            ],
        };
        let (provider, _) = engine.select(&rwn, &[], None).unwrap();
        assert_eq!(provider.id, "1");
    }

    #[test]
    fn route_inactive_is_rejected_before_mode_dispatch() {
        let engine = RoutingEngine::new();
        let mut r = route(RouteMode::Auto, serde_json::json!({}));
        r.is_active = false;
        let rwn = RouteWithNodes {
            route: r,
            nodes: vec![],
        };
        assert!(matches!(
            engine.select(&rwn, &[], None),
            Err(GatewayError::RouteInactive { .. })
        ));
    }
}
