//! The ledger itself: one method per use case.
//!
//! Every method follows the same spine: check the token with the mint,
//! translate "valid token, vanished owner" into the distinguished
//! forgotten-token error, enter a tracing span carrying the action and
//! actor, then either read a snapshot or run one all-or-nothing
//! transaction. Side-effect notifications are dispatched after commit.

use crate::pricing::creator_stake_cents;
use crate::view::{view_prediction, PredictionView, UserView};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use parley_core::time::Clock;
use parley_core::validate;
use parley_core::{
    check_password, hash_password, Cents, Certainty, EmailFlowState, Invitation, InvitationId,
    LoginMethod, MarketError, MarketResult, Notifier, Prediction, PredictionId, Relationship,
    ReminderHistory, Resolution, ResolutionEvent, Trade, TradeState, UserRecord, Username,
    WorldState, MAX_LEGAL_STAKE_CENTS,
};
use parley_store::WorldStore;
use parley_token::{AuthToken, TokenMint};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Registration hands out a week; login hands out a day.
const REGISTER_TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24 * 7;
const LOGIN_TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24;

/// Bytes of entropy behind invitation nonces and verification codes.
const NONCE_BYTES: usize = 16;

/// A fresh credential plus the owner's record, returned by registration
/// and login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSuccess {
    pub token: AuthToken,
    pub user: UserRecord,
}

/// Arguments for `create_prediction`. The close time is derived:
/// `created + open_seconds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrediction {
    pub statement: String,
    pub certainty: Certainty,
    pub maximum_stake_cents: Cents,
    pub open_seconds: i64,
    pub resolves_at_unixtime: i64,
    pub special_rules: String,
}

/// What `create_invitation` hands back: the shareable id and the stored
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedInvitation {
    pub id: InvitationId,
    pub invitation: Invitation,
}

/// The market ledger. Generic over the store backend; everything else is
/// injected as a trait object.
pub struct Ledger<S> {
    store: S,
    mint: TokenMint,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    id_rng: Mutex<ChaCha20Rng>,
}

impl<S: WorldStore> Ledger<S> {
    pub fn new(store: S, mint: TokenMint, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            mint,
            notifier,
            clock,
            id_rng: Mutex::new(ChaCha20Rng::from_entropy()),
        }
    }

    /// Deterministic prediction ids, for tests.
    pub fn with_id_seed(mut self, seed: u64) -> Self {
        self.id_rng = Mutex::new(ChaCha20Rng::seed_from_u64(seed));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // --- the common spine -------------------------------------------------

    /// Mint-check the optional token; a token that verifies but whose owner
    /// is gone from current state is the forgotten-token condition.
    fn authenticate(&self, token: Option<&AuthToken>) -> MarketResult<Option<AuthToken>> {
        let checked = self.mint.check(token);
        if let Some(ref t) = checked {
            if !self.store.read()?.user_exists(&t.owner) {
                return Err(MarketError::ForgottenToken {
                    owner: t.owner.clone(),
                });
            }
        }
        Ok(checked)
    }

    fn op_span(&self, action: &'static str, actor: Option<&Username>) -> tracing::Span {
        match actor {
            Some(actor) => tracing::info_span!("ledger_op", action, actor = %actor),
            None => tracing::info_span!("ledger_op", action, actor = tracing::field::Empty),
        }
    }

    fn now(&self) -> i64 {
        self.clock.now_unixtime()
    }

    /// Fire-and-forget: request latency must not depend on the email
    /// provider, so sends are spawned and never awaited.
    fn dispatch<F>(&self, what: &'static str, send: F)
    where
        F: Future<Output = MarketResult<()>> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = send.await {
                        tracing::warn!(%error, what, "notification send failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(what, "no async runtime; notification dropped");
            }
        }
    }

    /// Rejection-sample a fresh id from the full u32 space. At expected
    /// table sizes a collision is a ~1-in-a-million event and two in a row
    /// is astronomical; the loop not terminating would require the table to
    /// approach 2^32 predictions.
    fn fresh_prediction_id(&self, ws: &WorldState) -> PredictionId {
        let mut rng = self.id_rng.lock();
        loop {
            let candidate = PredictionId(rng.gen());
            if !ws.predictions.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn urlsafe_secret() -> String {
        let mut bytes = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    // --- identity ----------------------------------------------------------

    /// Echo back the verified credential, if any.
    pub fn whoami(&self, token: Option<&AuthToken>) -> MarketResult<Option<AuthToken>> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("whoami", auth.as_ref().map(|t| &t.owner)).entered();
        Ok(auth)
    }

    /// Routes the credential through the mint's revocation seam. Bearer
    /// tokens cannot actually be invalidated yet; the client forgets it.
    pub fn sign_out(&self, token: Option<&AuthToken>) -> MarketResult<()> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("sign_out", auth.as_ref().map(|t| &t.owner)).entered();
        if let Some(ref t) = auth {
            self.mint.revoke(t);
        }
        Ok(())
    }

    pub fn register_username(
        &self,
        token: Option<&AuthToken>,
        username: &str,
        password: &str,
    ) -> MarketResult<AuthSuccess> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("register_username", None).entered();
        if auth.is_some() {
            tracing::warn!(new_username = username, "logged-in user trying to register");
            return Err(MarketError::not_allowed(
                "already authenticated; first, log out",
            ));
        }
        validate::validate_username(username)?;
        validate::validate_password(password)?;

        // The slow hash happens before the write lock is taken.
        let hashed = hash_password(password)?;
        let owner = Username::new(username);

        let user = self.store.atomically(|ws| {
            if ws.user_exists(&owner) {
                tracing::info!(username, "username taken");
                return Err(MarketError::conflict("username taken"));
            }
            tracing::info!(username, "registering username");
            let record = UserRecord::with_password(hashed.clone());
            ws.users.insert(owner.clone(), record.clone());
            Ok(record)
        })?;

        Ok(AuthSuccess {
            token: self.mint.mint(owner, REGISTER_TOKEN_TTL_SECONDS)?,
            user,
        })
    }

    pub fn log_in_username(
        &self,
        token: Option<&AuthToken>,
        username: &str,
        password: &str,
    ) -> MarketResult<AuthSuccess> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("log_in_username", None).entered();
        if auth.is_some() {
            return Err(MarketError::not_allowed(
                "already authenticated; first, log out",
            ));
        }

        let owner = Username::new(username);
        let ws = self.store.read()?;
        let info = ws
            .user(&owner)
            .ok_or_else(|| MarketError::not_found("no such user"))?;
        let LoginMethod::Password(ref hashed) = info.login;
        if !check_password(password, hashed) {
            tracing::info!(username, possible_malice = true, "login attempt has bad password");
            return Err(MarketError::not_allowed("bad password"));
        }

        tracing::debug!(username, "username logged in");
        Ok(AuthSuccess {
            token: self.mint.mint(owner, LOGIN_TOKEN_TTL_SECONDS)?,
            user: info.clone(),
        })
    }

    // --- markets ------------------------------------------------------------

    pub fn create_prediction(
        &self,
        token: Option<&AuthToken>,
        request: NewPrediction,
    ) -> MarketResult<PredictionId> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("create_prediction", auth.as_ref().map(|t| &t.owner)).entered();
        let auth =
            auth.ok_or_else(|| MarketError::not_allowed("must log in to create predictions"))?;

        let now = self.now();
        validate::validate_new_prediction(
            &request.statement,
            &request.certainty,
            request.maximum_stake_cents,
            request.open_seconds,
            request.resolves_at_unixtime,
            now,
        )?;

        self.store.atomically(|ws| {
            let id = self.fresh_prediction_id(ws);
            let prediction = Prediction {
                statement: request.statement.clone(),
                certainty: request.certainty,
                maximum_stake_cents: request.maximum_stake_cents,
                created_unixtime: now,
                closes_unixtime: now.saturating_add(request.open_seconds),
                resolves_at_unixtime: request.resolves_at_unixtime,
                special_rules: request.special_rules.clone(),
                creator: auth.owner.clone(),
                trades: Vec::new(),
                resolutions: Vec::new(),
                reminders: ReminderHistory::default(),
            };
            tracing::debug!(prediction_id = %id, "creating prediction");
            ws.predictions.insert(id, prediction);
            Ok(id)
        })
    }

    pub fn get_prediction(
        &self,
        token: Option<&AuthToken>,
        prediction_id: PredictionId,
    ) -> MarketResult<PredictionView> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("get_prediction", auth.as_ref().map(|t| &t.owner)).entered();
        let ws = self.store.read()?;
        let prediction = ws.predictions.get(&prediction_id).ok_or_else(|| {
            tracing::info!(%prediction_id, "trying to get nonexistent prediction");
            MarketError::not_found("no such prediction")
        })?;
        Ok(view_prediction(
            &ws,
            auth.as_ref().map(|t| &t.owner),
            prediction,
        ))
    }

    /// Every market the viewer has money in, as creator or bettor. Logged
    /// out viewers get an empty map rather than an error.
    pub fn list_my_stakes(
        &self,
        token: Option<&AuthToken>,
    ) -> MarketResult<BTreeMap<PredictionId, PredictionView>> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("list_my_stakes", auth.as_ref().map(|t| &t.owner)).entered();
        let Some(auth) = auth else {
            return Ok(BTreeMap::new());
        };

        let ws = self.store.read()?;
        let me = &auth.owner;
        Ok(ws
            .predictions
            .iter()
            .filter(|(_, p)| p.creator == *me || p.trades.iter().any(|t| t.bettor == *me))
            .map(|(id, p)| (*id, view_prediction(&ws, Some(me), p)))
            .collect())
    }

    /// All of one creator's markets (defaulting to the viewer's own).
    /// Requires the creator to trust the viewer.
    pub fn list_predictions(
        &self,
        token: Option<&AuthToken>,
        creator: Option<&Username>,
    ) -> MarketResult<BTreeMap<PredictionId, PredictionView>> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("list_predictions", auth.as_ref().map(|t| &t.owner)).entered();
        let Some(auth) = auth else {
            return Ok(BTreeMap::new());
        };
        let creator = creator.unwrap_or(&auth.owner);

        let ws = self.store.read()?;
        if !ws.trusts(creator, &auth.owner) {
            tracing::info!(%creator, "listing predictions of an untrusting creator");
            return Err(MarketError::not_allowed("creator doesn't trust you"));
        }
        Ok(ws
            .predictions
            .iter()
            .filter(|(_, p)| p.creator == *creator)
            .map(|(id, p)| (*id, view_prediction(&ws, Some(&auth.owner), p)))
            .collect())
    }

    /// Place a stake against a prediction's creator. The gates, in order:
    /// logged in; prediction exists; not self-betting; mutual trust; the
    /// market is open; the market is unresolved; neither the creator's
    /// per-side cap nor the bettor's legal per-market cap would be
    /// exceeded. A trade that would breach a cap is rejected outright,
    /// never partially filled.
    pub fn stake(
        &self,
        token: Option<&AuthToken>,
        prediction_id: PredictionId,
        bettor_is_a_skeptic: bool,
        bettor_stake_cents: Cents,
    ) -> MarketResult<PredictionView> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("stake", auth.as_ref().map(|t| &t.owner)).entered();
        let auth = auth.ok_or_else(|| MarketError::not_allowed("must log in to bet"))?;
        if bettor_stake_cents == 0 {
            return Err(MarketError::invalid("stake must be positive"));
        }

        let bettor = auth.owner.clone();
        self.store.atomically(|ws| {
            let prediction = ws
                .predictions
                .get(&prediction_id)
                .ok_or_else(|| MarketError::not_found("no such prediction"))?;
            if prediction.creator == bettor {
                return Err(MarketError::not_allowed("can't bet against yourself"));
            }
            let creator = prediction.creator.clone();
            if !ws.trusts(&creator, &bettor) {
                tracing::warn!(%prediction_id, possible_malice = true, "bet against untrusting creator");
                return Err(MarketError::not_allowed("creator doesn't trust you"));
            }
            if !ws.trusts(&bettor, &creator) {
                return Err(MarketError::not_allowed("you don't trust the creator"));
            }

            let prediction = ws
                .predictions
                .get_mut(&prediction_id)
                .ok_or_else(|| MarketError::not_found("no such prediction"))?;
            let now = self.now();
            if !(prediction.created_unixtime <= now && now <= prediction.closes_unixtime) {
                return Err(MarketError::conflict(
                    "prediction is no longer open for betting",
                ));
            }
            if prediction.is_resolved() {
                tracing::warn!(%prediction_id, "bet on a resolved prediction");
                return Err(MarketError::conflict("prediction has already resolved"));
            }

            let creator_cents = creator_stake_cents(
                &prediction.certainty,
                bettor_is_a_skeptic,
                bettor_stake_cents,
            );
            let existing_exposure = prediction.creator_exposure_cents(bettor_is_a_skeptic);
            if existing_exposure.saturating_add(creator_cents) > prediction.maximum_stake_cents {
                tracing::warn!(%prediction_id, "bet would exceed creator tolerance");
                return Err(MarketError::conflict(format!(
                    "bet would exceed creator tolerance ({existing_exposure} existing + {creator_cents} new stake > {} max)",
                    prediction.maximum_stake_cents
                )));
            }
            let bettor_exposure = prediction.bettor_exposure_cents(&bettor, bettor_is_a_skeptic);
            if bettor_exposure.saturating_add(bettor_stake_cents) > MAX_LEGAL_STAKE_CENTS {
                tracing::warn!(%prediction_id, "bet would exceed the per-market stake limit");
                return Err(MarketError::conflict(format!(
                    "your existing stake of ~${} plus your new stake ~${} would put you over the limit of ${} staked in a single prediction",
                    bettor_exposure / 100,
                    bettor_stake_cents / 100,
                    MAX_LEGAL_STAKE_CENTS / 100
                )));
            }

            prediction.trades.push(Trade {
                bettor: bettor.clone(),
                bettor_is_a_skeptic,
                bettor_stake_cents,
                creator_stake_cents: creator_cents,
                transacted_unixtime: now,
                state: TradeState::Active,
            });
            tracing::info!(%prediction_id, bettor_stake_cents, creator_cents, "trade executed");

            let ws: &WorldState = ws;
            let prediction = ws
                .predictions
                .get(&prediction_id)
                .ok_or_else(|| MarketError::internal("prediction vanished mid-transaction"))?;
            Ok(view_prediction(ws, Some(&bettor), prediction))
        })
    }

    /// Append a resolution event. Creator-only; history is append-only so
    /// corrections are new events, and the latest event is authoritative.
    /// After commit, opted-in verified stakeholders are notified.
    pub fn resolve(
        &self,
        token: Option<&AuthToken>,
        prediction_id: PredictionId,
        resolution: Resolution,
        notes: &str,
    ) -> MarketResult<PredictionView> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("resolve", auth.as_ref().map(|t| &t.owner)).entered();
        let auth =
            auth.ok_or_else(|| MarketError::not_allowed("must log in to resolve a prediction"))?;
        validate::validate_resolution_notes(notes)?;

        let me = auth.owner.clone();
        let (view, resolved, bccs) = self.store.atomically(|ws| {
            let prediction = ws
                .predictions
                .get_mut(&prediction_id)
                .ok_or_else(|| MarketError::not_found("no such prediction"))?;
            if prediction.creator != me {
                tracing::warn!(%prediction_id, creator = %prediction.creator, possible_malice = true,
                    "non-creator trying to resolve");
                return Err(MarketError::not_allowed("you are not the creator"));
            }
            prediction.resolutions.push(ResolutionEvent {
                unixtime: self.now(),
                resolution,
                notes: notes.to_owned(),
            });
            tracing::info!(%prediction_id, ?resolution, "prediction resolved");

            let ws: &WorldState = ws;
            let prediction = ws
                .predictions
                .get(&prediction_id)
                .ok_or_else(|| MarketError::internal("prediction vanished mid-transaction"))?;
            let bccs: Vec<String> = prediction
                .stakeholders()
                .iter()
                .filter_map(|who| match ws.user(who) {
                    Some(info) => info.notification_address().map(str::to_owned),
                    None => {
                        tracing::error!(%prediction_id, user = %who,
                            "prediction references nonexistent user");
                        None
                    }
                })
                .collect();
            Ok((
                view_prediction(ws, Some(&me), prediction),
                prediction.clone(),
                bccs,
            ))
        })?;

        if !bccs.is_empty() {
            tracing::info!(%prediction_id, recipients = bccs.len(), "sending resolution emails");
        }
        let notifier = self.notifier.clone();
        self.dispatch("resolution notifications", async move {
            notifier
                .send_resolution_notifications(bccs, prediction_id, resolved)
                .await
        });
        Ok(view)
    }

    // --- trust ----------------------------------------------------------------

    pub fn set_trusted(
        &self,
        token: Option<&AuthToken>,
        who: &Username,
        trusted: bool,
    ) -> MarketResult<UserRecord> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("set_trusted", auth.as_ref().map(|t| &t.owner)).entered();
        let auth = auth.ok_or_else(|| MarketError::not_allowed("must log in to trust folks"))?;

        let me = auth.owner.clone();
        self.store.atomically(|ws| {
            if !ws.user_exists(who) {
                tracing::warn!(%who, "setting trust for nonexistent user");
                return Err(MarketError::not_found("no such user"));
            }
            let info = ws
                .users
                .get_mut(&me)
                .ok_or_else(|| MarketError::ForgottenToken { owner: me.clone() })?;
            tracing::info!(%who, trusted, "setting user trust");
            info.relationships
                .entry(who.clone())
                .or_insert_with(Relationship::default)
                .trusted = trusted;
            Ok(info.clone())
        })
    }

    pub fn get_user(
        &self,
        token: Option<&AuthToken>,
        who: &Username,
    ) -> MarketResult<UserView> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("get_user", auth.as_ref().map(|t| &t.owner)).entered();
        let ws = self.store.read()?;
        if !ws.user_exists(who) {
            tracing::info!(%who, "viewing nonexistent user");
            return Err(MarketError::not_found("no such user"));
        }
        Ok(UserView::of(&ws, auth.as_ref().map(|t| &t.owner), who))
    }

    // --- account settings ---------------------------------------------------

    pub fn change_password(
        &self,
        token: Option<&AuthToken>,
        old_password: &str,
        new_password: &str,
    ) -> MarketResult<()> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("change_password", auth.as_ref().map(|t| &t.owner)).entered();
        let auth =
            auth.ok_or_else(|| MarketError::not_allowed("must log in to change your password"))?;
        validate::validate_password(new_password)?;

        let rehashed = hash_password(new_password)?;
        let me = auth.owner.clone();
        self.store.atomically(|ws| {
            let info = ws
                .users
                .get_mut(&me)
                .ok_or_else(|| MarketError::ForgottenToken { owner: me.clone() })?;
            let LoginMethod::Password(ref hashed) = info.login;
            if !check_password(old_password, hashed) {
                tracing::warn!(possible_malice = true, "password change with wrong old password");
                return Err(MarketError::not_allowed("wrong old password"));
            }
            info.login = LoginMethod::Password(rehashed.clone());
            tracing::info!(who = %me, "changing password");
            Ok(())
        })
    }

    /// A non-empty address starts (or restarts) the verification flow and
    /// emails out a fresh code; an empty address dissociates.
    pub fn set_email(
        &self,
        token: Option<&AuthToken>,
        email: &str,
    ) -> MarketResult<EmailFlowState> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("set_email", auth.as_ref().map(|t| &t.owner)).entered();
        let auth = auth.ok_or_else(|| MarketError::not_allowed("must log in to set an email"))?;
        validate::validate_email(email)?;

        let me = auth.owner.clone();
        let code = if email.is_empty() {
            None
        } else {
            Some(Self::urlsafe_secret())
        };
        let code_hash = match &code {
            Some(code) => Some(hash_password(code)?),
            None => None,
        };

        let state = self.store.atomically(|ws| {
            let info = ws
                .users
                .get_mut(&me)
                .ok_or_else(|| MarketError::ForgottenToken { owner: me.clone() })?;
            info.email = match &code_hash {
                Some(hash) => {
                    tracing::info!(who = %me, address = email, "set email address");
                    EmailFlowState::CodeSent {
                        email: email.to_owned(),
                        code: hash.clone(),
                    }
                }
                None => {
                    tracing::info!(who = %me, "dissociated email address");
                    EmailFlowState::Unstarted
                }
            };
            Ok(info.email.clone())
        })?;

        if let Some(code) = code {
            let notifier = self.notifier.clone();
            let to = email.to_owned();
            self.dispatch("email verification", async move {
                notifier.send_email_verification(to, code).await
            });
        }
        Ok(state)
    }

    /// `CodeSent` -> `Verified` on exact code match; anything else fails
    /// without touching state.
    pub fn verify_email(
        &self,
        token: Option<&AuthToken>,
        code: &str,
    ) -> MarketResult<EmailFlowState> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("verify_email", auth.as_ref().map(|t| &t.owner)).entered();
        let auth =
            auth.ok_or_else(|| MarketError::not_allowed("must log in to verify an email"))?;

        let me = auth.owner.clone();
        self.store.atomically(|ws| {
            let info = ws
                .users
                .get_mut(&me)
                .ok_or_else(|| MarketError::ForgottenToken { owner: me.clone() })?;
            let (address, stored) = match &info.email {
                EmailFlowState::CodeSent { email, code } => (email.clone(), code.clone()),
                _ => {
                    tracing::warn!(possible_malice = true, "no email verification outstanding");
                    return Err(MarketError::conflict(
                        "you have no pending email-verification flow",
                    ));
                }
            };
            if !check_password(code, &stored) {
                tracing::warn!(address, possible_malice = true, "bad email-verification code");
                return Err(MarketError::not_allowed("bad code"));
            }
            tracing::info!(who = %me, address, "verified email address");
            info.email = EmailFlowState::Verified(address);
            Ok(info.email.clone())
        })
    }

    pub fn get_settings(&self, token: Option<&AuthToken>) -> MarketResult<UserRecord> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("get_settings", auth.as_ref().map(|t| &t.owner)).entered();
        let auth =
            auth.ok_or_else(|| MarketError::not_allowed("must log in to see your settings"))?;
        let ws = self.store.read()?;
        ws.user(&auth.owner)
            .cloned()
            .ok_or(MarketError::ForgottenToken { owner: auth.owner })
    }

    /// Last-write-wins update of the notification booleans. Absent fields
    /// are left alone.
    pub fn update_settings(
        &self,
        token: Option<&AuthToken>,
        email_reminders_to_resolve: Option<bool>,
        email_resolution_notifications: Option<bool>,
    ) -> MarketResult<UserRecord> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("update_settings", auth.as_ref().map(|t| &t.owner)).entered();
        let auth =
            auth.ok_or_else(|| MarketError::not_allowed("must log in to update your settings"))?;

        let me = auth.owner.clone();
        self.store.atomically(|ws| {
            let info = ws
                .users
                .get_mut(&me)
                .ok_or_else(|| MarketError::ForgottenToken { owner: me.clone() })?;
            if let Some(value) = email_reminders_to_resolve {
                info.email_reminders_to_resolve = value;
            }
            if let Some(value) = email_resolution_notifications {
                info.email_resolution_notifications = value;
            }
            tracing::info!(who = %me, "updated settings");
            Ok(info.clone())
        })
    }

    // --- invitations ----------------------------------------------------------

    pub fn create_invitation(
        &self,
        token: Option<&AuthToken>,
        notes: &str,
    ) -> MarketResult<CreatedInvitation> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("create_invitation", auth.as_ref().map(|t| &t.owner)).entered();
        let auth =
            auth.ok_or_else(|| MarketError::not_allowed("must log in to create an invitation"))?;

        let me = auth.owner.clone();
        let nonce = Self::urlsafe_secret();
        let now = self.now();
        self.store.atomically(|ws| {
            let info = ws
                .users
                .get_mut(&me)
                .ok_or_else(|| MarketError::ForgottenToken { owner: me.clone() })?;
            let invitation = Invitation {
                created_unixtime: now,
                notes: notes.to_owned(),
                accepted_by: None,
                accepted_unixtime: None,
            };
            info.invitations.insert(nonce.clone(), invitation.clone());
            Ok(CreatedInvitation {
                id: InvitationId {
                    inviter: me.clone(),
                    nonce: nonce.clone(),
                },
                invitation,
            })
        })
    }

    /// Open to unauthenticated callers; reveals only open/closed, never
    /// the invitation's contents.
    pub fn check_invitation(
        &self,
        token: Option<&AuthToken>,
        id: &InvitationId,
    ) -> MarketResult<bool> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("check_invitation", auth.as_ref().map(|t| &t.owner)).entered();
        if id.inviter.as_str().is_empty() {
            return Err(MarketError::invalid("malformed invitation"));
        }

        let ws = self.store.read()?;
        Ok(ws
            .user(&id.inviter)
            .and_then(|info| info.invitations.get(&id.nonce))
            .map(Invitation::is_open)
            .unwrap_or(false))
    }

    /// Strict one-shot: the first acceptance closes the invitation forever
    /// and sets trust in both directions atomically.
    pub fn accept_invitation(
        &self,
        token: Option<&AuthToken>,
        id: &InvitationId,
    ) -> MarketResult<UserRecord> {
        let auth = self.authenticate(token)?;
        let _span = self.op_span("accept_invitation", auth.as_ref().map(|t| &t.owner)).entered();
        let auth =
            auth.ok_or_else(|| MarketError::not_allowed("must log in to accept an invitation"))?;
        validate::validate_invitation_nonce(&id.nonce)?;
        if id.inviter.as_str().is_empty() {
            return Err(MarketError::invalid("malformed invitation"));
        }

        let me = auth.owner.clone();
        let now = self.now();
        self.store.atomically(|ws| {
            if !ws.user_exists(&me) {
                return Err(MarketError::ForgottenToken { owner: me.clone() });
            }
            let inviter_info = ws.users.get_mut(&id.inviter).ok_or_else(|| {
                MarketError::conflict("invitation is non-existent or already used")
            })?;
            let invitation = inviter_info.invitations.get_mut(&id.nonce).ok_or_else(|| {
                tracing::warn!(possible_malice = true, "accepting nonexistent invitation");
                MarketError::conflict("invitation is non-existent or already used")
            })?;
            if !invitation.is_open() {
                tracing::info!("attempt to re-accept invitation");
                return Err(MarketError::conflict(
                    "invitation is non-existent or already used",
                ));
            }
            invitation.accepted_by = Some(me.clone());
            invitation.accepted_unixtime = Some(now);
            inviter_info
                .relationships
                .entry(me.clone())
                .or_insert_with(Relationship::default)
                .trusted = true;

            let accepter_info = ws
                .users
                .get_mut(&me)
                .ok_or_else(|| MarketError::ForgottenToken { owner: me.clone() })?;
            accepter_info
                .relationships
                .entry(id.inviter.clone())
                .or_insert_with(Relationship::default)
                .trusted = true;
            tracing::info!(whose = %id.inviter, "accepted invitation");
            Ok(accepter_info.clone())
        })
    }
}
