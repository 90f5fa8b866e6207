//! Parley Ledger - the business-rule layer
//!
//! Every user-facing operation lives here: registration and login,
//! prediction creation, stake pricing and acceptance, the resolution
//! lifecycle, trust and settings management, and invitations. The ledger
//! consumes the world-state store, issues credentials through the token
//! mint, and dispatches notifications through the injected notifier,
//! always after its transaction has committed, never under the write lock.
//!
//! # Operation shape
//!
//! Each operation takes an optional bearer token plus typed arguments and
//! returns `MarketResult<T>`: an explicit ok/error tagged union. The single
//! distinguished condition is [`parley_core::MarketError::ForgottenToken`]
//! (a cryptographically valid token whose owner is absent from current
//! state), which the transport boundary is expected to translate into a
//! response that also clears the client's credential.

#![forbid(unsafe_code)]

mod ledger;
mod pricing;
mod view;

pub use ledger::{AuthSuccess, CreatedInvitation, Ledger, NewPrediction};
pub use pricing::creator_stake_cents;
pub use view::{view_prediction, PredictionView, UserView};
