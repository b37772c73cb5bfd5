//! Atomic JSON snapshot write and idempotent restore (§4.C).
//!
//! The snapshot embeds route nodes by provider **name**, not id, so it
//! survives a restore into a store whose providers were assigned different
//! ids. Restore upserts by name and always finishes by writing a fresh
//! backup of the post-restore state.

use crate::domain::{NodeStrategy, Provider, ProviderStatus, RouteMode};
use crate::error::GatewayError;
use crate::store::{ProviderAttrs, RouteAttrs, RouteNodeAttrs, Store};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub providers: Vec<ProviderSnapshot>,
    pub routes: Vec<RouteSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub name: String,
    pub base_url: String,
    pub api_key_encrypted: String,
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

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteNodeSnapshot {
    pub api_name: String,
    pub models: Vec<String>,
    pub strategy: NodeStrategy,
    pub priority: i32,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub name: String,
    pub mode: RouteMode,
    pub config: serde_json::Value,
    pub is_active: bool,
    pub nodes: Vec<RouteNodeSnapshot>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RestoreSummary {
    pub providers: usize,
    pub routes: usize,
}

impl From<&Provider> for ProviderSnapshot {
    fn from(p: &Provider) -> Self {
        Self {
            name: p.name.clone(),
            base_url: p.base_url.clone(),
            api_key_encrypted: p.api_key_opaque.clone(),
            models: p.models.clone(),
            is_active: p.is_active,
            status: p.status,
            latency_ms: p.latency_ms,
            last_tested_at: p.last_tested_at,
            consecutive_failures: p.consecutive_failures,
            is_healthy: p.is_healthy,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Writes a snapshot of the current store state to `path` atomically:
/// serialise to a sibling `.tmp` file, then rename over the target.
pub async fn write_backup(store: &Store, path: &Path) -> Result<(), GatewayError> {
    let providers = store.list_providers().await?;
    let mut routes_out = Vec::new();
    for route in store.list_routes().await? {
        let rwn = store.get_route_with_nodes_by_name(&route.name).await?;
        routes_out.push(RouteSnapshot {
            name: rwn.route.name.clone(),
            mode: rwn.route.mode,
            config: rwn.route.config.clone(),
            is_active: rwn.route.is_active,
            nodes: rwn
                .nodes
                .iter()
                .map(|(node, provider)| RouteNodeSnapshot {
                    api_name: provider.name.clone(),
                    models: node.models.clone(),
                    strategy: node.strategy,
                    priority: node.priority,
                    metadata: node.metadata.clone(),
                })
                .collect(),
            created_at: rwn.route.created_at,
            updated_at: rwn.route.updated_at,
        });
    }

    let snapshot = BackupSnapshot {
        generated_at: chrono::Utc::now(),
        providers: providers.iter().map(ProviderSnapshot::from).collect(),
        routes: routes_out,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    let body = serde_json::to_string_pretty(&snapshot)?;
    tokio::fs::write(&tmp_path, body).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Restores `path` into `store`. Providers and routes are upserted by
/// name; a route update deletes and re-inserts its nodes. `created_at`/
/// `updated_at` are taken from the snapshot rather than the moment of
/// restore. Nodes whose `api_name` doesn't resolve to a provider in this
/// snapshot are skipped. Commits once, then writes a fresh backup of the
/// resulting state.
pub async fn restore_from_backup(store: &Store, path: &Path) -> Result<RestoreSummary, GatewayError> {
    if !path.exists() {
        return Err(GatewayError::BackupMissing {
            path: path.display().to_string(),
        });
    }
    let body = tokio::fs::read_to_string(path).await?;
    let snapshot: BackupSnapshot = serde_json::from_str(&body)?;

    let mut provider_ids: HashMap<String, String> = HashMap::new();
    let mut providers_restored = 0usize;

    for item in &snapshot.providers {
        let attrs = ProviderAttrs {
            name: item.name.clone(),
            base_url: item.base_url.clone(),
            api_key_opaque: item.api_key_encrypted.clone(),
            models: item.models.clone(),
            is_active: item.is_active,
        };

        let provider = match store.get_provider_by_name(&item.name).await {
            Ok(existing) => store.update_provider(&existing.id, attrs).await?,
            Err(GatewayError::NotFound { .. }) => store.create_provider(attrs).await?,
            Err(other) => return Err(other),
        };

        store
            .set_provider_health(
                &provider.id,
                item.status,
                item.latency_ms,
                item.consecutive_failures,
                item.is_healthy,
            )
            .await?;
        store
            .set_provider_timestamps(&provider.id, item.created_at, item.updated_at)
            .await?;

        provider_ids.insert(item.name.clone(), provider.id.clone());
        providers_restored += 1;
    }

    let mut routes_restored = 0usize;
    for item in &snapshot.routes {
        let attrs = RouteAttrs {
            name: item.name.clone(),
            mode: item.mode,
            is_active: item.is_active,
            config: item.config.clone(),
        };

        let route = match store.get_route_by_name(&item.name).await {
            Ok(existing) => store.update_route(&existing.id, attrs).await?,
            Err(GatewayError::NotFound { .. }) => store.create_route(attrs).await?,
            Err(other) => return Err(other),
        };
        store
            .set_route_timestamps(&route.id, item.created_at, item.updated_at)
            .await?;

        let node_attrs: Vec<RouteNodeAttrs> = item
            .nodes
            .iter()
            .filter_map(|node| {
                provider_ids.get(&node.api_name).map(|api_id| RouteNodeAttrs {
                    api_id: api_id.clone(),
                    models: node.models.clone(),
                    strategy: node.strategy,
                    priority: node.priority,
                    metadata: node.metadata.clone(),
                })
            })
            .collect();
        store.replace_route_nodes(&route.id, node_attrs).await?;
        routes_restored += 1;
    }

    write_backup(store, path).await?;

    Ok(RestoreSummary {
        providers: providers_restored,
        routes: routes_restored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeStrategy;
    use crate::store::{ProviderAttrs, RouteAttrs, RouteNodeAttrs};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::from_pool(pool);
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn write_then_restore_is_idempotent() {
        let store = memory_store().await;
        let provider = store
            .create_provider(ProviderAttrs {
                name: "openai".to_string(),
                base_url: "https://api.openai.com".to_string(),
                api_key_opaque: "enc:token".to_string(),
                models: vec!["gpt-4o".to_string()],
                is_active: true,
            })
            .await
            .unwrap();
        let route = store
            .create_route(RouteAttrs {
                name: "chat".to_string(),
                mode: RouteMode::Specific,
                is_active: true,
                config: serde_json::json!({}),
            })
            .await
            .unwrap();
        store
            .add_route_node(
                &route.id,
                RouteNodeAttrs {
                    api_id: provider.id,
                    models: vec![],
                    strategy: NodeStrategy::Failover,
                    priority: 0,
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        let dir = std::env::temp_dir().join(format!("gateway-backup-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("backup.json");
        write_backup(&store, &path).await.unwrap();

        let first = restore_from_backup(&store, &path).await.unwrap();
        assert_eq!(first.providers, 1);
        assert_eq!(first.routes, 1);

        let second = restore_from_backup(&store, &path).await.unwrap();
        assert_eq!(second.providers, 1);
        assert_eq!(second.routes, 1);

        let providers = store.list_providers().await.unwrap();
        assert_eq!(providers.len(), 1, "restore must not duplicate providers");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn restore_preserves_snapshot_timestamps() {
        let store = memory_store().await;
        let provider = store
            .create_provider(ProviderAttrs {
                name: "openai".to_string(),
                base_url: "https://api.openai.com".to_string(),
                api_key_opaque: "enc:token".to_string(),
                models: vec!["gpt-4o".to_string()],
                is_active: true,
            })
            .await
            .unwrap();
        let route = store
            .create_route(RouteAttrs {
                name: "chat".to_string(),
                mode: RouteMode::Specific,
                is_active: true,
                config: serde_json::json!({}),
            })
            .await
            .unwrap();

        let backdated = "2020-01-01T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap();
        store.set_provider_timestamps(&provider.id, backdated, backdated).await.unwrap();
        store.set_route_timestamps(&route.id, backdated, backdated).await.unwrap();

        let dir = std::env::temp_dir().join(format!("gateway-backup-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("backup.json");
        write_backup(&store, &path).await.unwrap();

        // Restoring into the same store must not overwrite the backdated
        // timestamps with the moment of restore.
        restore_from_backup(&store, &path).await.unwrap();

        let restored_provider = store.get_provider(&provider.id).await.unwrap();
        let restored_route = store.get_route(&route.id).await.unwrap();
        assert_eq!(restored_provider.created_at, backdated);
        assert_eq!(restored_provider.updated_at, backdated);
        assert_eq!(restored_route.created_at, backdated);
        assert_eq!(restored_route.updated_at, backdated);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn restore_skips_nodes_with_unknown_provider_name() {
        let store = memory_store().await;
        let snapshot = BackupSnapshot {
            generated_at: chrono::Utc::now(),
            providers: vec![],
            routes: vec![RouteSnapshot {
                name: "chat".to_string(),
                mode: RouteMode::Specific,
                config: serde_json::json!({}),
                is_active: true,
                nodes: vec![RouteNodeSnapshot {
                    api_name: "ghost".to_string(),
                    models: vec![],
                    strategy: NodeStrategy::Failover,
                    priority: 0,
                    metadata: serde_json::json!({}),
                }],
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            }],
        };
        let dir = std::env::temp_dir().join(format!("gateway-backup-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("backup.json");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(&path, serde_json::to_string(&snapshot).unwrap())
            .await
            .unwrap();

        let summary = restore_from_backup(&store, &path).await.unwrap();
        assert_eq!(summary.routes, 1);
        let rwn = store.get_route_with_nodes_by_name("chat").await.unwrap();
        assert!(rwn.nodes.is_empty(), "node with unresolvable provider must be skipped");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn missing_backup_file_errors() {
        let store = memory_store().await;
        let path = std::env::temp_dir().join(format!("does-not-exist-{}.json", uuid::Uuid::new_v4()));
        let err = restore_from_backup(&store, &path).await.unwrap_err();
        assert!(matches!(err, GatewayError::BackupMissing { .. }));
    }
}
