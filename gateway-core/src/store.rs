//! SQLite-backed persistence for [`Provider`], [`Route`], and [`RouteNode`]
//! (§4.B). Each public method is one unit of work: it either fully commits
//! or leaves the store untouched. Row shapes are hand-mapped rather than
//! derived, since `models`/`config`/`metadata` are stored as JSON text
//! columns.

use crate::domain::{NodeStrategy, Provider, ProviderStatus, Route, RouteMode, RouteNode, RouteWithNodes};
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS providers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    base_url TEXT NOT NULL,
    api_key_opaque TEXT NOT NULL,
    models TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'unknown',
    latency_ms INTEGER,
    last_tested_at TEXT,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    is_healthy INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS routes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    mode TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    config TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS route_nodes (
    id TEXT PRIMARY KEY,
    route_id TEXT NOT NULL REFERENCES routes(id) ON DELETE CASCADE,
    api_id TEXT NOT NULL REFERENCES providers(id),
    models TEXT NOT NULL DEFAULT '[]',
    strategy TEXT NOT NULL DEFAULT 'round-robin',
    priority INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS route_nodes_route_id_idx ON route_nodes(route_id);
"#;

/// Attributes needed to create or overwrite a [`Provider`]; timestamps and
/// health/status fields are assigned by the store.
#[derive(Debug, Clone)]
pub struct ProviderAttrs {
    pub name: String,
    pub base_url: String,
    pub api_key_opaque: String,
    pub models: Vec<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct RouteAttrs {
    pub name: String,
    pub mode: RouteMode,
    pub is_active: bool,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RouteNodeAttrs {
    pub api_id: String,
    pub models: Vec<String>,
    pub strategy: NodeStrategy,
    pub priority: i32,
    pub metadata: serde_json::Value,
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, GatewayError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), GatewayError> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -- Providers ---------------------------------------------------

    pub async fn create_provider(&self, attrs: ProviderAttrs) -> Result<Provider, GatewayError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let models_json = serde_json::to_string(&attrs.models)?;

        sqlx::query(
            "INSERT INTO providers
             (id, name, base_url, api_key_opaque, models, is_active, status,
              latency_ms, last_tested_at, consecutive_failures, is_healthy,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 'unknown', NULL, NULL, 0, 1, ?, ?)",
        )
        .bind(&id)
        .bind(&attrs.name)
        .bind(&attrs.base_url)
        .bind(&attrs.api_key_opaque)
        .bind(&models_json)
        .bind(attrs.is_active)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "provider", &attrs.name))?;

        self.get_provider(&id).await
    }

    pub async fn get_provider(&self, id: &str) -> Result<Provider, GatewayError> {
        let row = sqlx::query("SELECT * FROM providers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GatewayError::NotFound {
                resource: "provider".to_string(),
                id: id.to_string(),
            })?;
        provider_from_row(&row)
    }

    pub async fn get_provider_by_name(&self, name: &str) -> Result<Provider, GatewayError> {
        let row = sqlx::query("SELECT * FROM providers WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GatewayError::NotFound {
                resource: "provider".to_string(),
                id: name.to_string(),
            })?;
        provider_from_row(&row)
    }

    pub async fn list_providers(&self) -> Result<Vec<Provider>, GatewayError> {
        let rows = sqlx::query("SELECT * FROM providers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(provider_from_row).collect()
    }

    pub async fn update_provider(
        &self,
        id: &str,
        attrs: ProviderAttrs,
    ) -> Result<Provider, GatewayError> {
        let models_json = serde_json::to_string(&attrs.models)?;
        let result = sqlx::query(
            "UPDATE providers SET name = ?, base_url = ?, api_key_opaque = ?, models = ?,
             is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&attrs.name)
        .bind(&attrs.base_url)
        .bind(&attrs.api_key_opaque)
        .bind(&models_json)
        .bind(attrs.is_active)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "provider", &attrs.name))?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound {
                resource: "provider".to_string(),
                id: id.to_string(),
            });
        }
        self.get_provider(id).await
    }

    /// Updates the health-tracking columns only (§4.G), leaving operator
    /// intent fields untouched.
    pub async fn set_provider_health(
        &self,
        id: &str,
        status: ProviderStatus,
        latency_ms: Option<i64>,
        consecutive_failures: i64,
        is_healthy: bool,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "UPDATE providers SET status = ?, latency_ms = ?, last_tested_at = ?,
             consecutive_failures = ?, is_healthy = ?, updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_value(status)?.as_str().unwrap_or("unknown"))
        .bind(latency_ms)
        .bind(Utc::now().to_rfc3339())
        .bind(consecutive_failures)
        .bind(is_healthy)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrites the timestamp columns directly; used by restore (§4.C) to
    /// preserve a snapshot's `created_at`/`updated_at` instead of stamping
    /// the moment of restore.
    pub async fn set_provider_timestamps(
        &self,
        id: &str,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        sqlx::query("UPDATE providers SET created_at = ?, updated_at = ? WHERE id = ?")
            .bind(created_at.to_rfc3339())
            .bind(updated_at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_provider(&self, id: &str) -> Result<(), GatewayError> {
        let result = sqlx::query("DELETE FROM providers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound {
                resource: "provider".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // -- Routes ------------------------------------------------------

    pub async fn create_route(&self, attrs: RouteAttrs) -> Result<Route, GatewayError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO routes (id, name, mode, is_active, config, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&attrs.name)
        .bind(mode_str(attrs.mode))
        .bind(attrs.is_active)
        .bind(attrs.config.to_string())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "route", &attrs.name))?;

        self.get_route(&id).await
    }

    pub async fn get_route(&self, id: &str) -> Result<Route, GatewayError> {
        let row = sqlx::query("SELECT * FROM routes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GatewayError::NotFound {
                resource: "route".to_string(),
                id: id.to_string(),
            })?;
        route_from_row(&row)
    }

    pub async fn get_route_by_name(&self, name: &str) -> Result<Route, GatewayError> {
        let row = sqlx::query("SELECT * FROM routes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GatewayError::NotFound {
                resource: "route".to_string(),
                id: name.to_string(),
            })?;
        route_from_row(&row)
    }

    pub async fn list_routes(&self) -> Result<Vec<Route>, GatewayError> {
        let rows = sqlx::query("SELECT * FROM routes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(route_from_row).collect()
    }

    /// Fetches a route with its nodes and each node's provider resolved in
    /// a single round trip (§4.B) via a `route_nodes JOIN providers`.
    pub async fn get_route_with_nodes_by_name(
        &self,
        name: &str,
    ) -> Result<RouteWithNodes, GatewayError> {
        let route = self.get_route_by_name(name).await?;
        let nodes = self.fetch_nodes(&route.id).await?;
        Ok(RouteWithNodes { route, nodes })
    }

    /// As [`Self::get_route_with_nodes_by_name`], keyed by id instead of
    /// name (the admin `/select` and `/state` endpoints address routes by
    /// id).
    pub async fn get_route_with_nodes(&self, id: &str) -> Result<RouteWithNodes, GatewayError> {
        let route = self.get_route(id).await?;
        let nodes = self.fetch_nodes(&route.id).await?;
        Ok(RouteWithNodes { route, nodes })
    }

    async fn fetch_nodes(&self, route_id: &str) -> Result<Vec<(RouteNode, Provider)>, GatewayError> {
        // `route_nodes` and `providers` both have an `id` and a `models`
        // column; SQLite returns bare column names from a `*` expansion, so
        // an unaliased join makes those ambiguous and `try_get` by name
        // silently picks one side for both. Alias the node's copies so each
        // `*_from_row` reads its own columns.
        let rows = sqlx::query(
            "SELECT route_nodes.id AS node_id, route_nodes.route_id, route_nodes.api_id,
                    route_nodes.models AS node_models, route_nodes.strategy,
                    route_nodes.priority, route_nodes.metadata, providers.*
             FROM route_nodes
             JOIN providers ON providers.id = route_nodes.api_id
             WHERE route_nodes.route_id = ?
             ORDER BY route_nodes.priority, route_nodes.id",
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((route_node_from_row(row)?, provider_from_row(row)?)))
            .collect()
    }

    pub async fn update_route(&self, id: &str, attrs: RouteAttrs) -> Result<Route, GatewayError> {
        let result = sqlx::query(
            "UPDATE routes SET name = ?, mode = ?, is_active = ?, config = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&attrs.name)
        .bind(mode_str(attrs.mode))
        .bind(attrs.is_active)
        .bind(attrs.config.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "route", &attrs.name))?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound {
                resource: "route".to_string(),
                id: id.to_string(),
            });
        }
        self.get_route(id).await
    }

    /// As [`Self::set_provider_timestamps`], for routes.
    pub async fn set_route_timestamps(
        &self,
        id: &str,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        sqlx::query("UPDATE routes SET created_at = ?, updated_at = ? WHERE id = ?")
            .bind(created_at.to_rfc3339())
            .bind(updated_at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Cascades to the route's nodes (§4.B).
    pub async fn delete_route(&self, id: &str) -> Result<(), GatewayError> {
        let result = sqlx::query("DELETE FROM routes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound {
                resource: "route".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn add_route_node(
        &self,
        route_id: &str,
        attrs: RouteNodeAttrs,
    ) -> Result<(), GatewayError> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO route_nodes (id, route_id, api_id, models, strategy, priority, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(route_id)
        .bind(&attrs.api_id)
        .bind(serde_json::to_string(&attrs.models)?)
        .bind(strategy_str(attrs.strategy))
        .bind(attrs.priority)
        .bind(attrs.metadata.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes and re-inserts a route's nodes, used for both admin updates
    /// and restore (§4.C).
    pub async fn replace_route_nodes(
        &self,
        route_id: &str,
        nodes: Vec<RouteNodeAttrs>,
    ) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM route_nodes WHERE route_id = ?")
            .bind(route_id)
            .execute(&mut *tx)
            .await?;
        for attrs in nodes {
            let id = uuid::Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO route_nodes (id, route_id, api_id, models, strategy, priority, metadata)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(route_id)
            .bind(&attrs.api_id)
            .bind(serde_json::to_string(&attrs.models)?)
            .bind(strategy_str(attrs.strategy))
            .bind(attrs.priority)
            .bind(attrs.metadata.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn conflict_or(error: sqlx::Error, resource: &str, name: &str) -> GatewayError {
    if let sqlx::Error::Database(ref db_err) = error {
        if db_err.is_unique_violation() {
            return GatewayError::Conflict {
                resource: resource.to_string(),
                name: name.to_string(),
            };
        }
    }
    GatewayError::Database(error)
}

fn mode_str(mode: RouteMode) -> &'static str {
    match mode {
        RouteMode::Auto => "auto",
        RouteMode::Specific => "specific",
        RouteMode::Multi => "multi",
    }
}

fn strategy_str(strategy: NodeStrategy) -> &'static str {
    match strategy {
        NodeStrategy::RoundRobin => "round-robin",
        NodeStrategy::Failover => "failover",
    }
}

fn parse_status(s: &str) -> ProviderStatus {
    match s {
        "online" => ProviderStatus::Online,
        "degraded" => ProviderStatus::Degraded,
        "timeout" => ProviderStatus::Timeout,
        "unreachable" => ProviderStatus::Unreachable,
        "error" => ProviderStatus::Error,
        _ => ProviderStatus::Unknown,
    }
}

fn parse_mode(s: &str) -> Result<RouteMode, GatewayError> {
    match s {
        "auto" => Ok(RouteMode::Auto),
        "specific" => Ok(RouteMode::Specific),
        "multi" => Ok(RouteMode::Multi),
        other => Err(GatewayError::ValidationError {
            field: "mode".to_string(),
            message: format!("unrecognised route mode '{other}'"),
        }),
    }
}

fn parse_strategy(s: &str) -> NodeStrategy {
    match s {
        "failover" => NodeStrategy::Failover,
        _ => NodeStrategy::RoundRobin,
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn provider_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Provider, GatewayError> {
    let models: Vec<String> = serde_json::from_str(row.try_get::<String, _>("models")?.as_str())?;
    Ok(Provider {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        base_url: row.try_get("base_url")?,
        api_key_opaque: row.try_get("api_key_opaque")?,
        models,
        is_active: row.try_get("is_active")?,
        status: parse_status(row.try_get::<String, _>("status")?.as_str()),
        latency_ms: row.try_get("latency_ms")?,
        last_tested_at: row
            .try_get::<Option<String>, _>("last_tested_at")?
            .map(|s| parse_timestamp(&s)),
        consecutive_failures: row.try_get("consecutive_failures")?,
        is_healthy: row.try_get("is_healthy")?,
        created_at: parse_timestamp(row.try_get::<String, _>("created_at")?.as_str()),
        updated_at: parse_timestamp(row.try_get::<String, _>("updated_at")?.as_str()),
    })
}

fn route_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Route, GatewayError> {
    let config: serde_json::Value = serde_json::from_str(row.try_get::<String, _>("config")?.as_str())?;
    Ok(Route {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        mode: parse_mode(row.try_get::<String, _>("mode")?.as_str())?,
        is_active: row.try_get("is_active")?,
        config,
        created_at: parse_timestamp(row.try_get::<String, _>("created_at")?.as_str()),
        updated_at: parse_timestamp(row.try_get::<String, _>("updated_at")?.as_str()),
    })
}

/// Reads the `route_nodes`-side columns from a `fetch_nodes` row; the node's
/// `id`/`models` are read from their `node_id`/`node_models` aliases so they
/// don't collide with the joined provider's own `id`/`models` columns.
fn route_node_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RouteNode, GatewayError> {
    let models: Vec<String> =
        serde_json::from_str(row.try_get::<String, _>("node_models")?.as_str())?;
    let metadata: serde_json::Value =
        serde_json::from_str(row.try_get::<String, _>("metadata")?.as_str())?;
    Ok(RouteNode {
        id: row.try_get("node_id")?,
        route_id: row.try_get("route_id")?,
        api_id: row.try_get("api_id")?,
        models,
        strategy: parse_strategy(row.try_get::<String, _>("strategy")?.as_str()),
        priority: row.try_get("priority")?,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn provider_attrs(name: &str) -> ProviderAttrs {
        ProviderAttrs {
            name: name.to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_opaque: "enc:token".to_string(),
            models: vec!["gpt-4o".to_string()],
            is_active: true,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_provider_round_trips() {
        let store = memory_store().await;
        let created = store.create_provider(provider_attrs("openai")).await.unwrap();
        let fetched = store.get_provider(&created.id).await.unwrap();
        assert_eq!(fetched.name, "openai");
        assert_eq!(fetched.models, vec!["gpt-4o".to_string()]);
        assert_eq!(fetched.status, ProviderStatus::Unknown);
    }

    #[tokio::test]
    async fn duplicate_provider_name_is_conflict() {
        let store = memory_store().await;
        store.create_provider(provider_attrs("openai")).await.unwrap();
        let err = store.create_provider(provider_attrs("openai")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict { .. }));
    }

    #[tokio::test]
    async fn route_with_nodes_fetches_in_one_round_trip() {
        let store = memory_store().await;
        let provider = store.create_provider(provider_attrs("openai")).await.unwrap();
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
                    api_id: provider.id.clone(),
                    models: vec![],
                    strategy: NodeStrategy::Failover,
                    priority: 0,
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        let rwn = store.get_route_with_nodes_by_name("chat").await.unwrap();
        assert_eq!(rwn.nodes.len(), 1);
        assert_eq!(rwn.nodes[0].1.name, "openai");
    }

    #[tokio::test]
    async fn node_model_subset_is_not_confused_with_provider_models() {
        let store = memory_store().await;
        let provider = store
            .create_provider(ProviderAttrs {
                models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string(), "o1".to_string()],
                ..provider_attrs("openai")
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
                    api_id: provider.id.clone(),
                    models: vec!["gpt-4o-mini".to_string()],
                    strategy: NodeStrategy::RoundRobin,
                    priority: 0,
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        let rwn = store.get_route_with_nodes_by_name("chat").await.unwrap();
        let (node, fetched_provider) = &rwn.nodes[0];
        assert_eq!(node.models, vec!["gpt-4o-mini".to_string()]);
        assert_eq!(fetched_provider.id, provider.id);
        assert_eq!(
            fetched_provider.models,
            vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string(), "o1".to_string()]
        );
        assert_ne!(node.id, fetched_provider.id);
    }

    #[tokio::test]
    async fn deleting_route_cascades_to_nodes() {
        let store = memory_store().await;
        let provider = store.create_provider(provider_attrs("openai")).await.unwrap();
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
                    strategy: NodeStrategy::RoundRobin,
                    priority: 0,
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        store.delete_route(&route.id).await.unwrap();
        let nodes = store.fetch_nodes(&route.id).await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn not_found_surfaces_for_missing_provider() {
        let store = memory_store().await;
        let err = store.get_provider("missing").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }
}
