//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! The in-memory [`ParcelStore`] is authoritative at runtime. When a
//! Postgres pool is configured, writes go through to the database and the
//! store is hydrated from it on startup.

use std::collections::HashMap;
use std::sync::Arc;

use parcel_core::{ParcelId, TrackingId};
use parcel_state::Parcel;
use parking_lot::RwLock;
use sqlx::PgPool;
use thiserror::Error;

// -- Parcel Store ---------------------------------------------------------------

/// Failures reported by [`ParcelStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No parcel with this id.
    #[error("parcel {0} not found")]
    NotFound(ParcelId),

    /// Another parcel already holds this tracking code.
    #[error("tracking id {0} is already in use")]
    DuplicateTrackingId(TrackingId),

    /// A parcel with this id already exists.
    #[error("parcel {0} already exists")]
    DuplicateId(ParcelId),

    /// The stored version moved on since the caller's read.
    #[error("parcel {id} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        id: ParcelId,
        expected: u64,
        actual: u64,
    },
}

#[derive(Debug, Default)]
struct StoreInner {
    by_id: HashMap<ParcelId, Parcel>,
    by_tracking_id: HashMap<TrackingId, ParcelId>,
}

/// Thread-safe, cloneable parcel store with a unique tracking-code index
/// and version-checked saves.
///
/// The lock is `parking_lot` and never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct ParcelStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl ParcelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new parcel. Both the id and the tracking code must be unused.
    pub fn insert(&self, parcel: Parcel) -> Result<(), StoreError> {
        let mut guard = self.inner.write();
        if guard.by_id.contains_key(&parcel.id()) {
            return Err(StoreError::DuplicateId(parcel.id()));
        }
        if guard.by_tracking_id.contains_key(parcel.tracking_id()) {
            return Err(StoreError::DuplicateTrackingId(parcel.tracking_id().clone()));
        }
        guard
            .by_tracking_id
            .insert(parcel.tracking_id().clone(), parcel.id());
        guard.by_id.insert(parcel.id(), parcel);
        Ok(())
    }

    /// Retrieve a parcel by id.
    pub fn get(&self, id: &ParcelId) -> Option<Parcel> {
        self.inner.read().by_id.get(id).cloned()
    }

    /// Retrieve a parcel by tracking code.
    pub fn get_by_tracking_id(&self, code: &TrackingId) -> Option<Parcel> {
        let guard = self.inner.read();
        guard
            .by_tracking_id
            .get(code)
            .and_then(|id| guard.by_id.get(id))
            .cloned()
    }

    /// Replace a parcel if the stored version still equals `expected_version`.
    ///
    /// The stored copy gets `expected_version + 1`; the saved parcel is
    /// returned. The check and the write happen under one write lock.
    pub fn save(&self, mut parcel: Parcel, expected_version: u64) -> Result<Parcel, StoreError> {
        let mut guard = self.inner.write();
        let stored = guard
            .by_id
            .get_mut(&parcel.id())
            .ok_or(StoreError::NotFound(parcel.id()))?;
        if stored.version() != expected_version {
            return Err(StoreError::VersionConflict {
                id: parcel.id(),
                expected: expected_version,
                actual: stored.version(),
            });
        }
        parcel.set_version(expected_version + 1);
        *stored = parcel.clone();
        Ok(parcel)
    }

    /// Undo an insert whose database write failed.
    pub fn remove(&self, id: &ParcelId) -> Option<Parcel> {
        let mut guard = self.inner.write();
        let removed = guard.by_id.remove(id)?;
        guard.by_tracking_id.remove(removed.tracking_id());
        Some(removed)
    }

    /// All parcels, in no particular order.
    pub fn list(&self) -> Vec<Parcel> {
        self.inner.read().by_id.values().cloned().collect()
    }

    /// Parcels matching a predicate.
    pub fn filter(&self, pred: impl Fn(&Parcel) -> bool) -> Vec<Parcel> {
        self.inner
            .read()
            .by_id
            .values()
            .filter(|p| pred(p))
            .cloned()
            .collect()
    }

    /// Return the number of parcels.
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the store lock can be taken right now.
    pub fn is_accessible(&self) -> bool {
        self.inner.try_read().is_some()
    }
}

// -- Configuration ----------------------------------------------------------------

/// Application configuration, read from the environment.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. If `None`, identities are still parsed from
    /// the header but the secret segment is not checked.
    pub auth_token: Option<String>,
    /// Postgres connection string. If `None`, the service is in-memory only.
    pub database_url: Option<String>,
    /// Whether `/metrics` and the metrics middleware are mounted.
    pub metrics_enabled: bool,
    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,
}

impl AppConfig {
    /// Build configuration from `PORT`, `AUTH_TOKEN`, `DATABASE_URL`,
    /// `PARCEL_METRICS_ENABLED` and `LOG_FORMAT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: get("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            auth_token: get("AUTH_TOKEN").filter(|t| !t.is_empty()),
            database_url: get("DATABASE_URL").filter(|u| !u.is_empty()),
            metrics_enabled: get("PARCEL_METRICS_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(defaults.metrics_enabled),
            json_logs: get("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json_logs),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("metrics_enabled", &self.metrics_enabled)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            metrics_enabled: true,
            json_logs: false,
        }
    }
}

// -- AppState -------------------------------------------------------------------

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub parcels: ParcelStore,
    pub config: AppConfig,
    /// When `Some`, parcel writes are persisted to Postgres as well.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// State with the given configuration and optional database pool.
    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        Self {
            parcels: ParcelStore::new(),
            config,
            db_pool,
        }
    }

    /// Load persisted parcels into the in-memory store.
    ///
    /// No-op without a database pool.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let parcels = crate::db::parcels::load_all(pool)
            .await
            .map_err(|e| format!("failed to load parcels: {e}"))?;
        let count = parcels.len();
        for parcel in parcels {
            self.parcels
                .insert(parcel)
                .map_err(|e| format!("failed to hydrate parcel store: {e}"))?;
        }

        tracing::info!(parcels = count, "hydrated in-memory store from database");
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
