//! Battle specification: the input contract for one choreography run.

use crate::battle::error::BattleError;
use crate::bot::account::to_user_id;

/// One side of a battle: a packed team and the candidate human accounts
/// that may claim it.
#[derive(Debug, Clone)]
pub struct SideSpec {
    /// Packed team payload, opaque to the engine.
    pub team: String,
    /// Candidate human accounts, in priority order; any one of them may
    /// claim the side.
    pub usernames: Vec<String>,
    confirmed: Option<String>,
}

impl SideSpec {
    pub fn new(team: impl Into<String>, usernames: Vec<String>) -> Self {
        Self {
            team: team.into(),
            usernames,
            confirmed: None,
        }
    }

    /// The username confirmed online for this side, once choreography has
    /// bound one.
    pub fn confirmed(&self) -> Option<&str> {
        self.confirmed.as_deref()
    }

    /// Bind a candidate to this side. Set-once: returns `false` and leaves
    /// the binding untouched if the side is already confirmed or the name
    /// is not a candidate.
    pub fn confirm(&mut self, username: &str) -> bool {
        if self.confirmed.is_some() || !self.is_candidate(username) {
            return false;
        }
        self.confirmed = Some(username.to_string());
        true
    }

    /// Whether the given name (in any casing/punctuation) is a candidate.
    pub fn is_candidate(&self, username: &str) -> bool {
        let id = to_user_id(username);
        self.usernames.iter().any(|u| to_user_id(u) == id)
    }

    fn validate(&self, label: &str) -> Result<(), BattleError> {
        if self.team.is_empty() {
            return Err(BattleError::InvalidSpec(format!("{label} has no team")));
        }
        if self.usernames.is_empty() {
            return Err(BattleError::InvalidSpec(format!(
                "{label} has no candidate usernames"
            )));
        }
        if self.usernames.iter().any(|u| to_user_id(u).is_empty()) {
            return Err(BattleError::InvalidSpec(format!(
                "{label} has a blank candidate username"
            )));
        }
        if self.confirmed.is_some() {
            return Err(BattleError::InvalidSpec(format!(
                "{label} is already confirmed"
            )));
        }
        Ok(())
    }
}

/// Input contract for one battle.
#[derive(Debug, Clone)]
pub struct BattleSpec {
    /// Human-readable message posted into the battle room.
    pub message: String,
    /// Challenge format string encoding ruleset and tier restrictions.
    pub chalcode: String,
    /// The two sides of the battle.
    pub sides: [SideSpec; 2],
}

impl BattleSpec {
    pub fn new(
        message: impl Into<String>,
        chalcode: impl Into<String>,
        first: SideSpec,
        second: SideSpec,
    ) -> Self {
        Self {
            message: message.into(),
            chalcode: chalcode.into(),
            sides: [first, second],
        }
    }

    /// Fail fast on malformed input, before any I/O.
    pub fn validate(&self) -> Result<(), BattleError> {
        if self.message.is_empty() {
            return Err(BattleError::InvalidSpec("message is required".into()));
        }
        if self.chalcode.is_empty() {
            return Err(BattleError::InvalidSpec("chalcode is required".into()));
        }
        self.sides[0].validate("first side")?;
        self.sides[1].validate("second side")?;
        Ok(())
    }
}
