//! # gateway-core
//!
//! The routing, provider-protocol, persistence, and health-checking core of
//! an OpenAI-compatible chat-completion gateway. A thin HTTP façade (see the
//! `gateway-server` crate) is the only expected caller: this crate owns no
//! transport-level concerns of its own beyond the outbound calls it makes to
//! upstream providers.
//!
//! - [`models`] — the canonical OpenAI-shaped request/response/chunk types.
//! - [`domain`] — `Provider`, `Route`, `RouteNode`, and the scheduling key.
//! - [`store`] — SQLite-backed CRUD over the domain entities.
//! - [`backup`] — atomic snapshot write and idempotent restore.
//! - [`crypto`] — symmetric encryption of provider API keys at rest.
//! - [`routing`] — `auto`/`specific`/`multi` provider+model selection.
//! - [`providers`] — per-dialect request/response translation.
//! - [`pipeline`] — selection → adapter call → retry/failover orchestration.
//! - [`health`] — background provider probing and status transitions.

pub mod backup;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod health;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod routing;
pub mod store;

pub use domain::{NodeStrategy, Provider, ProviderStatus, Route, RouteMode, RouteNode, RouteWithNodes};
pub use error::{GatewayError, ProviderError};
pub use models::{ChatRequest, ChatResponse, Message, Role, StreamChunk};
pub use pipeline::{ChatPipeline, RouteSelector};
pub use routing::RoutingEngine;
pub use store::Store;
