//! Temporal Lock Engine - scheduler and contract engine for capsule locks
//!
//! The engine owns every lock, runs deadline checks from a min-heap on a
//! fixed tick, matches incoming events against registered conditions and
//! executes the follow-up actions locks carry. Compliance is a pure read
//! over current lock state.
//!
//! ## Components
//!
//! - [`LockStore`]: locks, per-capsule index and history; enforces the
//!   lifecycle table and policy bounds
//! - [`EventMatcher`]: event-type index of pending listeners
//! - [`ScheduleQueue`]: lazily-cancelled heap of deadline checks and
//!   scheduled operations
//! - [`OperationExecutor`]: lock, unlock, escalate and de-escalate effects
//! - [`ComplianceVerifier`]: per-capsule verdicts
//! - [`TemporalLockEngine`]: the facade serializing all of the above
//!   behind one mutex, plus the background loop
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use temporal_lock_engine::{EngineConfig, TemporalLockEngine};
//! use temporal_lock_types::{LockAction, TimeBoundLockRequest};
//!
//! # async fn demo() -> temporal_lock_types::LockResult<()> {
//! let engine = Arc::new(TemporalLockEngine::new(EngineConfig::from_env()?)?);
//! engine.start().await?;
//!
//! let lock = engine
//!     .create_time_bound_lock(
//!         TimeBoundLockRequest::new("capsule-42", 3600)
//!             .with_expiration_action(LockAction::unlock()),
//!     )
//!     .await?;
//! engine.activate(&lock.lock_id).await?;
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod clock;
pub mod compliance;
pub mod config;
pub mod engine;
pub mod executor;
pub mod matcher;
pub mod notify;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compliance::{classify, ComplianceVerifier};
pub use config::{EngineConfig, ENV_PREFIX};
pub use engine::TemporalLockEngine;
pub use executor::OperationExecutor;
pub use matcher::{evaluate, matches_condition, EventMatcher};
pub use notify::Notifier;
pub use scheduler::{ScheduleQueue, TickReport};
pub use store::{LockBounds, LockStore};
