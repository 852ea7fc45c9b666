//! # Laddertrack Core
//!
//! Resilient client layer between the ladder tracker and its external data providers.
//!
//! ## Overview
//!
//! - **Provider clients** with per-attempt timeouts, retries and empty-response handling
//! - **Health monitoring** folded on a schedule and persisted to the variable store
//! - **Batching** of key sets into provider-sized requests with bounded concurrency
//! - **Season resolution** that falls back to locally known seasons
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Batch planning and bounded-concurrency execution |
//! | [`classify`] | Response status classification |
//! | [`client`] | Generic provider client and fetch operations |
//! | [`config`] | Per-provider configuration and environment overrides |
//! | [`error`] | Client, store and validation errors |
//! | [`health`] | Health monitors and registry |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`provider`] | Provider identifiers |
//! | [`retry`] | Retry policy and backoff |
//! | [`season`] | Season types and resolution with fallback |
//! | [`throttling`] | Provider rate limits |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use laddertrack_core::{HealthRegistry, ProviderClient, ProviderId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = HealthRegistry::in_memory();
//!     let client = ProviderClient::from_env(ProviderId::Aligulac, &registry)?;
//!
//!     match client.fetch_one::<serde_json::Value>("player/485/").await? {
//!         Some(player) => println!("{player}"),
//!         None => println!("no such player"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Caller         │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Provider Client │────▶│ Retry Policy     │
//! │ (fetch ops)     │     └──────────────────┘
//! └────────┬────────┘
//!          │                ┌──────────────────┐
//!          ├───────────────▶│ Health Monitor   │──▶ variable store
//!          │                └──────────────────┘
//!          ▼
//! ┌─────────────────┐
//! │ HTTP Client     │
//! │ (reqwest/fake)  │
//! └─────────────────┘
//! ```
//!
//! ## Outcomes
//!
//! Fetch operations return `Ok(Some(value))`, `Ok(None)` for a confirmed-absent
//! resource, or a [`ClientError`] once retries are exhausted:
//!
//! ```rust
//! use laddertrack_core::ClientError;
//!
//! fn describe(error: &ClientError) -> &'static str {
//!     if error.retryable() {
//!         "provider unavailable"
//!     } else {
//!         "request rejected"
//!     }
//! }
//! ```

pub mod batch;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod http_client;
pub mod provider;
pub mod retry;
pub mod season;
pub mod store;
pub mod throttling;

// Batching
pub use batch::{execute_batched, BatchErrorMode, BatchFailure, BatchOutcome, BatchPlan};

// Classification
pub use classify::{classify_status, EmptyStatusSet, ResponseClass};

// Provider client
pub use client::{with_deadline, Provider, ProviderClient};

// Configuration
pub use config::ProviderConfig;

// Error types
pub use error::{ClientError, StoreError, ValidationError};

// Health
pub use health::{
    HealthMonitor, HealthRegistry, HealthScore, HealthState, InMemoryVariableStore,
    VariableStore,
};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient, ScriptedHttpClient,
};

// Provider identifiers
pub use provider::ProviderId;

// Retry
pub use retry::{AttemptOutcome, Backoff, RetryDecision, RetryPolicy};

// Seasons
pub use season::{
    BattleNetSeasonSource, InMemorySeasonStore, Region, Season, SeasonResolution,
    SeasonResolver, SeasonSource, SeasonStore,
};

// Throttling
pub use throttling::{RateLimit, Throttle};

// Warehouse (re-exported from laddertrack-warehouse)
pub use laddertrack_warehouse::{Warehouse, WarehouseConfig, WarehouseError};
