//! Temporal Lock Types - data model for the capsule contract engine
//!
//! A **lock** is a temporal or event contract attached to an opaque capsule.
//! This crate holds only the shapes the engine works with; it performs no
//! scheduling, matching or I/O.
//!
//! ## Key Concepts
//!
//! - **Lock**: a time-bound, event-bound or hybrid contract on a capsule,
//!   carrying its own lifecycle status
//! - **EventCondition**: an event type plus dot-path criteria that an
//!   incoming event must satisfy
//! - **LockAction**: follow-up effect run on expiration or trigger
//! - **ScheduledOperation**: a time-keyed entry in the scheduler heap
//! - **HistoryRecord**: append-only audit entry per lock
//! - **ComplianceReport**: derived verdict over a capsule's locks
//!
//! ## Lifecycle
//!
//! ```text
//!                 activate
//!  Pending ◀──────────────────▶ Active
//!     │       deactivate          │
//!     │                           │
//!     ├── deadline ──▶ Expired ◀──┤ deadline
//!     ├── event ─────▶ Triggered ◀┤ event
//!     └── cancel ────▶ Canceled ◀─┘ cancel
//! ```
//!
//! `Expired`, `Triggered` and `Canceled` are terminal.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod action;
pub mod compliance;
pub mod condition;
pub mod errors;
pub mod event;
pub mod history;
pub mod ids;
pub mod lock;
pub mod notification;
pub mod operation;

pub use action::{ActionType, LockAction};
pub use compliance::{ComplianceReport, ComplianceStatus, LockCompliance};
pub use condition::{Criterion, EventCondition, Operator};
pub use errors::{LockError, LockResult};
pub use event::LockEvent;
pub use history::{HistoryOperation, HistoryRecord};
pub use ids::{LockId, OperationId};
pub use lock::{
    EventBoundLockRequest, EventBoundTerms, HybridLockRequest, HybridTerms, Lock, LockFilter,
    LockKind, LockStatistics, LockStatus, LockTerms, LockTimestamps, TimeBoundLockRequest,
    TimeBoundTerms,
};
pub use notification::{LockNotification, NotificationKind};
pub use operation::{
    privileges_from_parameters, privileges_parameters, DeadlineKind, LockOperation, Parameters,
    ScheduledOperation, ScheduledOperationHandle, ScheduledOperationKind, PRIVILEGES_KEY,
};
