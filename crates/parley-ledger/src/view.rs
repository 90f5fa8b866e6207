//! Viewer-scoped projections of predictions and users.
//!
//! A [`PredictionView`] is what a given viewer is entitled to see: the
//! immutable market terms, the creator's remaining per-side capacity, the
//! full resolution history, and only their own trades (the creator sees
//! every trade).

use parley_core::{Cents, Certainty, Prediction, ResolutionEvent, Trade, Username, WorldState};
use serde::{Deserialize, Serialize};

/// How one user looks to another: the name plus both trust directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub username: Username,
    /// Does the viewer trust them?
    pub is_trusted: bool,
    /// Do they trust the viewer?
    pub trusts_you: bool,
}

impl UserView {
    pub fn of(ws: &WorldState, viewer: Option<&Username>, who: &Username) -> Self {
        Self {
            username: who.clone(),
            is_trusted: viewer.map(|v| ws.trusts(v, who)).unwrap_or(false),
            trusts_you: viewer.map(|v| ws.trusts(who, v)).unwrap_or(false),
        }
    }
}

/// A prediction as a particular viewer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionView {
    pub statement: String,
    pub certainty: Certainty,
    pub maximum_stake_cents: Cents,
    pub remaining_stake_cents_vs_believers: Cents,
    pub remaining_stake_cents_vs_skeptics: Cents,
    pub created_unixtime: i64,
    pub closes_unixtime: i64,
    pub resolves_at_unixtime: i64,
    pub special_rules: String,
    pub creator: UserView,
    pub resolutions: Vec<ResolutionEvent>,
    /// The viewer's trades, or every trade when the viewer is the creator.
    pub your_trades: Vec<Trade>,
}

/// Project a prediction for `viewer` (None = logged out).
pub fn view_prediction(
    ws: &WorldState,
    viewer: Option<&Username>,
    prediction: &Prediction,
) -> PredictionView {
    let creator_is_viewer = viewer == Some(&prediction.creator);
    PredictionView {
        statement: prediction.statement.clone(),
        certainty: prediction.certainty,
        maximum_stake_cents: prediction.maximum_stake_cents,
        remaining_stake_cents_vs_believers: prediction
            .maximum_stake_cents
            .saturating_sub(prediction.creator_exposure_cents(false)),
        remaining_stake_cents_vs_skeptics: prediction
            .maximum_stake_cents
            .saturating_sub(prediction.creator_exposure_cents(true)),
        created_unixtime: prediction.created_unixtime,
        closes_unixtime: prediction.closes_unixtime,
        resolves_at_unixtime: prediction.resolves_at_unixtime,
        special_rules: prediction.special_rules.clone(),
        creator: UserView::of(ws, viewer, &prediction.creator),
        resolutions: prediction.resolutions.clone(),
        your_trades: prediction
            .trades
            .iter()
            .filter(|t| creator_is_viewer || Some(&t.bettor) == viewer)
            .cloned()
            .collect(),
    }
}
