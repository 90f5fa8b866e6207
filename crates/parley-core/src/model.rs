//! The persisted world-state model.
//!
//! One root aggregate ([`WorldState`]) owns everything: users (with their
//! trust edges and invitations embedded) and predictions (with their trades,
//! resolution history, and reminder history embedded). The store layer
//! serializes the whole aggregate as a single blob; nothing in here is
//! shared by reference across the persistence boundary.

use crate::idents::{PredictionId, Username};
use crate::passwords::PasswordHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Money is integer cents throughout.
pub type Cents = u64;

/// Hard ceiling on a single bettor's same-side exposure in one market, and
/// on a prediction's declared maximum stake: $5,000.00.
pub const MAX_LEGAL_STAKE_CENTS: Cents = 5_000_00;

/// The root aggregate. The store hands out independent copies of this and
/// commits mutations all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub users: BTreeMap<Username, UserRecord>,
    pub predictions: BTreeMap<PredictionId, Prediction>,
}

impl WorldState {
    pub fn user(&self, name: &Username) -> Option<&UserRecord> {
        self.users.get(name)
    }

    pub fn user_exists(&self, name: &Username) -> bool {
        self.users.contains_key(name)
    }

    /// Directed trust: does `a` trust `b`? Every user trusts themselves;
    /// otherwise the stored edge decides, defaulting to false.
    pub fn trusts(&self, a: &Username, b: &Username) -> bool {
        if a == b {
            return true;
        }
        self.users
            .get(a)
            .and_then(|info| info.relationships.get(b))
            .map(|rel| rel.trusted)
            .unwrap_or(false)
    }
}

/// Everything we persist about one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub login: LoginMethod,
    pub email: EmailFlowState,
    pub email_reminders_to_resolve: bool,
    pub email_resolution_notifications: bool,
    pub relationships: BTreeMap<Username, Relationship>,
    pub invitations: BTreeMap<String, Invitation>,
}

impl UserRecord {
    pub fn with_password(password: PasswordHash) -> Self {
        Self {
            login: LoginMethod::Password(password),
            email: EmailFlowState::Unstarted,
            email_reminders_to_resolve: false,
            email_resolution_notifications: false,
            relationships: BTreeMap::new(),
            invitations: BTreeMap::new(),
        }
    }

    /// The address resolution emails may be sent to, if the user both opted
    /// in and finished verification.
    pub fn notification_address(&self) -> Option<&str> {
        match (&self.email, self.email_resolution_notifications) {
            (EmailFlowState::Verified(addr), true) => Some(addr),
            _ => None,
        }
    }

    /// The address resolution reminders may be sent to, if the user both
    /// opted in and finished verification.
    pub fn reminder_address(&self) -> Option<&str> {
        match (&self.email, self.email_reminders_to_resolve) {
            (EmailFlowState::Verified(addr), true) => Some(addr),
            _ => None,
        }
    }
}

/// How a user proves who they are at login. An enum rather than a bare
/// hash so alternative login methods can be added without migrating state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoginMethod {
    Password(PasswordHash),
}

/// One directed trust edge. No history; last write wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub trusted: bool,
}

/// The email-verification state machine.
///
/// `Unstarted` -> `CodeSent` on a non-empty `set_email`; `CodeSent` ->
/// `Verified` on exact code match; any state -> `Unstarted` on dissociation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum EmailFlowState {
    #[default]
    Unstarted,
    CodeSent { email: String, code: PasswordHash },
    Verified(String),
}

/// One prediction market. Fields up through `creator` are immutable after
/// creation; `trades` and `resolutions` are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub statement: String,
    pub certainty: Certainty,
    pub maximum_stake_cents: Cents,
    pub created_unixtime: i64,
    pub closes_unixtime: i64,
    pub resolves_at_unixtime: i64,
    pub special_rules: String,
    pub creator: Username,
    pub trades: Vec<Trade>,
    pub resolutions: Vec<ResolutionEvent>,
    pub reminders: ReminderHistory,
}

impl Prediction {
    /// Sum of the creator's committed exposure on one side.
    pub fn creator_exposure_cents(&self, versus_skeptics: bool) -> Cents {
        self.trades
            .iter()
            .filter(|t| t.bettor_is_a_skeptic == versus_skeptics)
            .fold(0, |acc, t| acc.saturating_add(t.creator_stake_cents))
    }

    /// Sum of one bettor's committed stake on one side.
    pub fn bettor_exposure_cents(&self, bettor: &Username, is_skeptic: bool) -> Cents {
        self.trades
            .iter()
            .filter(|t| t.bettor == *bettor && t.bettor_is_a_skeptic == is_skeptic)
            .fold(0, |acc, t| acc.saturating_add(t.bettor_stake_cents))
    }

    /// The latest resolution event is authoritative.
    pub fn latest_resolution(&self) -> Resolution {
        self.resolutions
            .last()
            .map(|event| event.resolution)
            .unwrap_or(Resolution::NoneYet)
    }

    pub fn is_resolved(&self) -> bool {
        self.latest_resolution() != Resolution::NoneYet
    }

    /// Everyone with money in this market: the creator plus each distinct
    /// bettor.
    pub fn stakeholders(&self) -> Vec<Username> {
        let mut out = vec![self.creator.clone()];
        for trade in &self.trades {
            if !out.contains(&trade.bettor) {
                out.push(trade.bettor.clone());
            }
        }
        out
    }
}

/// The creator's declared probability band, `0 < low <= high <= 1`.
///
/// The creator is willing to take skeptics' money at `low` and believers'
/// money at `high`; stakes are priced at exactly those edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Certainty {
    pub low: f64,
    pub high: f64,
}

/// An executed stake. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub bettor: Username,
    pub bettor_is_a_skeptic: bool,
    pub bettor_stake_cents: Cents,
    pub creator_stake_cents: Cents,
    pub transacted_unixtime: i64,
    pub state: TradeState,
}

/// Lifecycle of a trade. Only `Active` exists today; the enum is the seam
/// for a future cancellation flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    #[default]
    Active,
}

/// Terminal and non-terminal outcomes a creator can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Yes,
    No,
    Invalid,
    NoneYet,
}

/// One entry in a prediction's append-only resolution history. A later
/// event may correct an earlier one; history is never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionEvent {
    pub unixtime: i64,
    pub resolution: Resolution,
    pub notes: String,
}

/// Record of our attempts to remind the creator to resolve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderHistory {
    /// Set when the creator has no usable address, so we stop trying.
    pub skipped: bool,
    pub attempts: Vec<ReminderAttempt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReminderAttempt {
    pub unixtime: i64,
    pub succeeded: bool,
}

/// A single-use trust-bootstrapping token, stored under the inviter's
/// record keyed by nonce. Open while `accepted_by` is `None`; closes
/// permanently on first acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub created_unixtime: i64,
    pub notes: String,
    pub accepted_by: Option<Username>,
    pub accepted_unixtime: Option<i64>,
}

impl Invitation {
    pub fn is_open(&self) -> bool {
        self.accepted_by.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction() -> Prediction {
        Prediction {
            statement: "it will rain tomorrow".to_owned(),
            certainty: Certainty { low: 0.8, high: 0.9 },
            maximum_stake_cents: 10_000,
            created_unixtime: 1000,
            closes_unixtime: 2000,
            resolves_at_unixtime: 3000,
            special_rules: String::new(),
            creator: Username::from("alice"),
            trades: vec![],
            resolutions: vec![],
            reminders: ReminderHistory::default(),
        }
    }

    #[test]
    fn trust_is_reflexive_and_defaults_false() {
        let mut ws = WorldState::default();
        let alice = Username::from("alice");
        let bob = Username::from("bob");
        ws.users.insert(
            alice.clone(),
            UserRecord::with_password(PasswordHash::default()),
        );
        assert!(ws.trusts(&alice, &alice));
        assert!(!ws.trusts(&alice, &bob));
        ws.users
            .get_mut(&alice)
            .unwrap()
            .relationships
            .insert(bob.clone(), Relationship { trusted: true });
        assert!(ws.trusts(&alice, &bob));
        // Not symmetric.
        assert!(!ws.trusts(&bob, &alice));
    }

    #[test]
    fn exposure_sums_are_per_side() {
        let mut p = prediction();
        let bob = Username::from("bob");
        p.trades.push(Trade {
            bettor: bob.clone(),
            bettor_is_a_skeptic: true,
            bettor_stake_cents: 100,
            creator_stake_cents: 400,
            transacted_unixtime: 1500,
            state: TradeState::Active,
        });
        p.trades.push(Trade {
            bettor: bob.clone(),
            bettor_is_a_skeptic: false,
            bettor_stake_cents: 900,
            creator_stake_cents: 100,
            transacted_unixtime: 1501,
            state: TradeState::Active,
        });
        assert_eq!(p.creator_exposure_cents(true), 400);
        assert_eq!(p.creator_exposure_cents(false), 100);
        assert_eq!(p.bettor_exposure_cents(&bob, true), 100);
        assert_eq!(p.bettor_exposure_cents(&bob, false), 900);
    }

    #[test]
    fn latest_resolution_wins() {
        let mut p = prediction();
        assert_eq!(p.latest_resolution(), Resolution::NoneYet);
        assert!(!p.is_resolved());
        p.resolutions.push(ResolutionEvent {
            unixtime: 3000,
            resolution: Resolution::Yes,
            notes: String::new(),
        });
        p.resolutions.push(ResolutionEvent {
            unixtime: 3100,
            resolution: Resolution::No,
            notes: "misread the forecast".to_owned(),
        });
        assert_eq!(p.latest_resolution(), Resolution::No);
        assert!(p.is_resolved());
    }

    #[test]
    fn stakeholders_are_deduplicated() {
        let mut p = prediction();
        let bob = Username::from("bob");
        for _ in 0..2 {
            p.trades.push(Trade {
                bettor: bob.clone(),
                bettor_is_a_skeptic: true,
                bettor_stake_cents: 10,
                creator_stake_cents: 40,
                transacted_unixtime: 1500,
                state: TradeState::Active,
            });
        }
        assert_eq!(p.stakeholders(), vec![Username::from("alice"), bob]);
    }
}
