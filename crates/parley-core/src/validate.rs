//! Static validation rule tables.
//!
//! Each function checks every rule and joins the broken ones into a single
//! human-readable message, so a caller who got three things wrong learns
//! all three at once.

use crate::errors::{MarketError, MarketResult};
use crate::model::{Cents, Certainty, MAX_LEGAL_STAKE_CENTS};

const MAX_USERNAME_CHARS: usize = 64;
const MAX_PASSWORD_CHARS: usize = 256;
pub const MAX_RESOLUTION_NOTES_CHARS: usize = 1024;

fn problems_to_result(problems: Vec<&'static str>) -> MarketResult<()> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(MarketError::invalid(problems.join("; ")))
    }
}

pub fn validate_username(username: &str) -> MarketResult<()> {
    let mut problems = Vec::new();
    if username.is_empty() {
        problems.push("username must be non-empty");
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        problems.push("username must be no more than 64 characters");
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric()) && !username.is_empty() {
        problems.push("username must be alphanumeric");
    }
    problems_to_result(problems)
}

pub fn validate_password(password: &str) -> MarketResult<()> {
    let mut problems = Vec::new();
    if password.is_empty() {
        problems.push("password must be non-empty");
    }
    if password.chars().count() > MAX_PASSWORD_CHARS {
        problems.push("password must not exceed 256 characters, good lord");
    }
    problems_to_result(problems)
}

/// Rules for a new prediction. `now` is the creation instant; the close
/// time is `now + open_seconds` and resolution must come after the close.
pub fn validate_new_prediction(
    statement: &str,
    certainty: &Certainty,
    maximum_stake_cents: Cents,
    open_seconds: i64,
    resolves_at_unixtime: i64,
    now: i64,
) -> MarketResult<()> {
    let mut problems = Vec::new();
    if statement.is_empty() {
        problems.push("must have a prediction statement");
    }
    if !(certainty.low > 0.0 && certainty.low <= certainty.high && certainty.high <= 1.0) {
        problems.push("must have 0 < lowProb <= highProb <= 1");
    }
    if maximum_stake_cents == 0 {
        problems.push("stake must be positive");
    }
    if maximum_stake_cents > MAX_LEGAL_STAKE_CENTS {
        problems.push("stake must not exceed $5000");
    }
    if open_seconds <= 0 {
        problems.push("prediction must be open for a positive number of seconds");
    }
    if resolves_at_unixtime <= now.saturating_add(open_seconds) {
        problems.push("prediction must resolve after betting closes");
    }
    problems_to_result(problems)
}

/// A loose shape check, not RFC 5322. Empty is allowed: it means
/// "dissociate my address".
pub fn validate_email(email: &str) -> MarketResult<()> {
    if email.is_empty() {
        return Ok(());
    }
    let ok = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && local
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "_.+-".contains(c))
                && domain
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c))
        }
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(MarketError::invalid("invalid-looking email address"))
    }
}

pub fn validate_invitation_nonce(nonce: &str) -> MarketResult<()> {
    if nonce.is_empty() {
        Err(MarketError::invalid("no nonce given"))
    } else {
        Ok(())
    }
}

pub fn validate_resolution_notes(notes: &str) -> MarketResult<()> {
    if notes.chars().count() > MAX_RESOLUTION_NOTES_CHARS {
        Err(MarketError::invalid("unreasonably long notes"))
    } else {
        Ok(())
    }
}
