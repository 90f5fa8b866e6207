//! Parley Core - Market Foundation
//!
//! This crate provides the foundational types for the Parley prediction
//! market: identifiers, the persisted world-state model, static validation
//! rule tables, the unified error type, and the effect interfaces (clock,
//! notifier) every higher layer is injected with.
//!
//! # Architecture Layers
//!
//! - Pure data: [`model`], [`idents`]
//! - Pure rules: [`validate`], [`passwords`]
//! - Effect interfaces (no implementations beyond the trivial ones):
//!   [`time`], [`notify`]
//!
//! Higher layers (`parley-store`, `parley-ledger`, `parley-maintenance`)
//! consume these; nothing here performs I/O besides the system clock.

#![forbid(unsafe_code)]

/// Username, prediction, and invitation identifiers
pub mod idents;

/// Persisted world-state model
pub mod model;

/// Unified error handling
pub mod errors;

/// Salted scrypt hashing for passwords and verification codes
pub mod passwords;

/// Static validation rule tables
pub mod validate;

/// Clock effect interface for deterministic time
pub mod time;

/// Notification effect interface (email fan-out boundary)
pub mod notify;

pub use errors::{MarketError, MarketResult};
pub use idents::{InvitationId, PredictionId, Username};
pub use model::{
    Cents, Certainty, EmailFlowState, Invitation, LoginMethod, Prediction, Relationship,
    ReminderAttempt, ReminderHistory, Resolution, ResolutionEvent, Trade, TradeState, UserRecord,
    WorldState, MAX_LEGAL_STAKE_CENTS,
};
pub use notify::{Notifier, NullNotifier, Violation, ViolationKind};
pub use passwords::{check_password, hash_password, PasswordHash};
pub use time::{Clock, ManualClock, SystemClock};
