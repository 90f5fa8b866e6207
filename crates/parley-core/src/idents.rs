//! Identifier newtypes.
//!
//! Usernames are case-sensitive and validated at the boundary (see
//! [`crate::validate`]); the newtypes here carry no validation of their own
//! so that historical state always round-trips.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A registered user's name. Case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A prediction's id, drawn uniformly at random from the full `u32` space
/// with rejection of collisions. Probabilistically unique at expected scale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PredictionId(pub u32);

impl fmt::Display for PredictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addresses one invitation: the inviter plus the single-use nonce they
/// handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvitationId {
    pub inviter: Username,
    pub nonce: String,
}

impl fmt::Display for InvitationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.inviter, self.nonce)
    }
}
